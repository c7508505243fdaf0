//! Compiler backends for template-generated sources.
//!
//! This module provides:
//! - The [`CompilerBackend`] interface and the [`UnitCompiler`] driving it
//! - An external tool backend (forked processes or a serialized worker pool)
//! - An in-process backend over an injected compiler API
//! - Diagnostic translation back to template coordinates
//! - Jar manifest classpath expansion
//!
//! # Architecture
//!
//! ```text
//! CompilationUnit + TrackingMap
//!     │
//!     └── UnitCompiler ──► CompilerBackend
//!                              │
//!                              ├── ExternalToolBackend ──► BuildTask (javac process / WorkerPool)
//!                              │         └── captured log ──► tool_output parser
//!                              │
//!                              └── InProcessBackend ──► CompilerApi
//!                                        ├── MemoryFileManager ──► VirtualPackageMap
//!                                        └── structured diagnostics
//!                                                  │
//!                              DiagnosticTranslator ◄┘
//! ```

mod api;
mod backend;
mod classpath;
mod diagnostics;
mod external;
mod file_manager;
mod in_process;
mod pipeline;
mod source;
mod task;
mod tool_output;
mod toolchain;
mod types;

pub use api::{ApiDiagnostic, CompileTask, CompilerApi, DiagnosticListener, SourceInput};
pub use backend::{CompilerBackend, artifact_files};
pub use classpath::{expand_classpath, manifest_class_path, parse_manifest_class_path};
pub use diagnostics::{
    DiagnosticRecord, DiagnosticTranslator, Severity, TemplateLocation, TrackedRange, TrackingMap,
};
pub use external::ExternalToolBackend;
pub use file_manager::{
    FileKind, FileManager, FileObject, Location, MemoryFileManager, StandardFileManager,
};
pub use in_process::InProcessBackend;
pub use pipeline::{CompilationResult, UnitCompiler};
pub use source::{SourceSink, resolve_encoding};
pub use task::{BuildTask, LogLevel, LogLine, ProcessTask, TaskFailure, TaskLog, ToolInvocation};
pub use tool_output::{ParsedReport, parse_tool_output};
pub use toolchain::{COMPILER_ENV, Toolchain};
pub use types::{
    BytecodeArtifact, CompilationUnit, CompilerConfiguration, DEFAULT_GENERATED_PACKAGE,
    ExecutionMode, class_relative_path, derive_class_file, is_in_namespace, outer_class,
    package_of, simple_name,
};
