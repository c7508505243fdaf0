//! The interface shared by all compiler backends.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::Result;

use super::diagnostics::{DiagnosticRecord, TrackingMap};
use super::source::SourceSink;
use super::types::{BytecodeArtifact, CompilerConfiguration, derive_class_file};

/// A strategy for turning generated source into compiled classes.
///
/// The expected call order for one unit is `configure`, `open_source`
/// (then writing the text), `compile`, `persist_artifacts` on success, and
/// finally `cleanup`.
///
/// Compile failures are not errors. `compile` returns them as diagnostics
/// and an empty list means success. `Err` is reserved for configuration
/// and I/O problems.
pub trait CompilerBackend: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Apply classpath, extdirs, versions and debug settings.
    fn configure(&mut self, config: &CompilerConfiguration) -> Result<()>;

    /// Open the sink the generated source is written to.
    fn open_source(&mut self, file: &Path, encoding: &str) -> Result<&mut SourceSink>;

    /// Compile the source written to the sink.
    fn compile(&mut self, class_name: &str, tracking: &TrackingMap)
    -> Result<Vec<DiagnosticRecord>>;

    /// Classes produced by the last successful compile.
    fn artifacts(&self) -> &[Arc<BytecodeArtifact>];

    /// Write the classes of the last compile next to the outer class file.
    ///
    /// Returns the files written.
    fn persist_artifacts(&mut self, class_name: &str, class_file: &Path) -> Result<Vec<PathBuf>>;

    /// When the compiled outer class was last produced.
    fn class_last_modified(&self, class_name: &str, class_file: &Path) -> Option<SystemTime>;

    /// Delete or keep the generated source and release per-unit state.
    fn cleanup(&mut self, keep_source: bool) -> Result<()>;
}

/// Target files for every artifact, derived from the outer class's file.
pub fn artifact_files(
    artifacts: &[Arc<BytecodeArtifact>],
    class_file: &Path,
) -> Vec<(Arc<BytecodeArtifact>, PathBuf)> {
    artifacts
        .iter()
        .map(|artifact| {
            let file = derive_class_file(class_file, &artifact.class_name);
            (Arc::clone(artifact), file)
        })
        .collect()
}
