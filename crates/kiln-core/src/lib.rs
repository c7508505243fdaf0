//! Compiler backends for template-generated Java sources.
//!
//! This crate provides:
//! - A backend abstraction with an external tool and an in-process variant
//! - A worker pool for running build tasks on large-stack threads
//! - A shared in-memory store of compiled classes
//! - Translation of compiler diagnostics to template locations

pub mod compile;
pub mod error;
pub mod packages;
pub mod pool;

pub use compile::{
    CompilationResult, CompilationUnit, CompilerBackend, CompilerConfiguration, DiagnosticRecord,
    ExecutionMode, ExternalToolBackend, InProcessBackend, TrackingMap, UnitCompiler,
};
pub use error::{Error, Result};
pub use packages::VirtualPackageMap;
pub use pool::{Completion, PoolConfig, WorkerPool};
