//! Drives one compilation unit through a backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;

use super::backend::CompilerBackend;
use super::diagnostics::{DiagnosticRecord, TrackingMap};
use super::types::{BytecodeArtifact, CompilationUnit, CompilerConfiguration};

/// Result of compiling one unit.
#[derive(Debug, Clone)]
pub enum CompilationResult {
    /// The unit compiled and its classes were written out
    Success {
        artifacts: Vec<Arc<BytecodeArtifact>>,
        class_files: Vec<PathBuf>,
        compile_time_ms: u64,
    },

    /// The compiler rejected the unit
    Failed {
        class_name: String,
        diagnostics: Vec<DiagnosticRecord>,
    },
}

impl CompilationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Diagnostics of a failed unit; empty on success.
    pub fn diagnostics(&self) -> &[DiagnosticRecord] {
        match self {
            Self::Success { .. } => &[],
            Self::Failed { diagnostics, .. } => diagnostics,
        }
    }

    pub fn artifacts(&self) -> &[Arc<BytecodeArtifact>] {
        match self {
            Self::Success { artifacts, .. } => artifacts,
            Self::Failed { .. } => &[],
        }
    }
}

/// Compiles units with one backend under one configuration.
///
/// The backend is configured before the first unit and reused after that.
pub struct UnitCompiler {
    config: CompilerConfiguration,
    backend: Box<dyn CompilerBackend>,
    configured: bool,
}

impl UnitCompiler {
    pub fn new(config: CompilerConfiguration, backend: Box<dyn CompilerBackend>) -> Self {
        Self {
            config,
            backend,
            configured: false,
        }
    }

    pub fn config(&self) -> &CompilerConfiguration {
        &self.config
    }

    pub fn backend(&self) -> &dyn CompilerBackend {
        self.backend.as_ref()
    }

    /// Compile a unit, persisting its classes on success.
    ///
    /// The backend is cleaned up whatever the outcome.
    pub fn compile(
        &mut self,
        unit: &CompilationUnit,
        tracking: &TrackingMap,
    ) -> Result<CompilationResult> {
        let start = Instant::now();
        let result = self.run(unit, tracking, start);
        let cleaned = self.backend.cleanup(unit.keep_source);

        let result = result?;
        cleaned?;

        match &result {
            CompilationResult::Success {
                artifacts,
                compile_time_ms,
                ..
            } => tracing::info!(
                "Compiled {} ({} classes) with the {} backend in {}ms",
                unit.class_name,
                artifacts.len(),
                self.backend.name(),
                compile_time_ms
            ),
            CompilationResult::Failed { diagnostics, .. } => tracing::info!(
                "Compiling {} failed with {} diagnostics",
                unit.class_name,
                diagnostics.len()
            ),
        }
        Ok(result)
    }

    fn run(
        &mut self,
        unit: &CompilationUnit,
        tracking: &TrackingMap,
        start: Instant,
    ) -> Result<CompilationResult> {
        if !self.configured {
            self.backend.configure(&self.config)?;
            self.configured = true;
        }

        self.backend
            .open_source(&unit.source_file, &unit.encoding)?
            .push_str(&unit.source);

        let diagnostics = self.backend.compile(&unit.class_name, tracking)?;
        if !diagnostics.is_empty() {
            return Ok(CompilationResult::Failed {
                class_name: unit.class_name.clone(),
                diagnostics,
            });
        }

        let artifacts = self.backend.artifacts().to_vec();
        let class_files = self
            .backend
            .persist_artifacts(&unit.class_name, &unit.class_file)?;

        Ok(CompilationResult::Success {
            artifacts,
            class_files,
            compile_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}
