//! Backend calling a compiler API inside the current process.
//!
//! Sources stay in memory and compiled classes go straight into the shared
//! [`VirtualPackageMap`]; nothing touches the disk unless the caller asks to
//! keep the source or persist the classes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::packages::VirtualPackageMap;

use super::api::{ApiDiagnostic, CompileTask, CompilerApi, SourceInput};
use super::backend::{CompilerBackend, artifact_files};
use super::classpath::expand_classpath;
use super::diagnostics::{DiagnosticRecord, DiagnosticTranslator, Severity, TrackingMap};
use super::file_manager::MemoryFileManager;
use super::source::SourceSink;
use super::types::{BytecodeArtifact, CompilerConfiguration};

/// Compiles through an injected [`CompilerApi`].
pub struct InProcessBackend {
    api: Option<Arc<dyn CompilerApi>>,
    packages: Arc<VirtualPackageMap>,
    config: Option<CompilerConfiguration>,

    /// Configured classpath with manifest references expanded
    classpath: Vec<PathBuf>,

    options: Vec<String>,
    sink: Option<SourceSink>,
    artifacts: Vec<Arc<BytecodeArtifact>>,
}

impl InProcessBackend {
    /// Create a backend. Without an API, `configure` fails.
    pub fn new(api: Option<Arc<dyn CompilerApi>>, packages: Arc<VirtualPackageMap>) -> Self {
        Self {
            api,
            packages,
            config: None,
            classpath: Vec::new(),
            options: Vec::new(),
            sink: None,
            artifacts: Vec::new(),
        }
    }

    /// Options passed to the API for the current configuration.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Expanded classpath of the current configuration.
    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    pub fn packages(&self) -> &Arc<VirtualPackageMap> {
        &self.packages
    }
}

/// Compiler options for a configuration.
fn build_options(config: &CompilerConfiguration) -> Vec<String> {
    let mut options = vec!["-proc:none".to_string()];
    if let Some(extdirs) = &config.extdirs {
        options.push("-extdirs".to_string());
        options.push(extdirs.clone());
    }
    if let Some(source) = &config.source_version {
        options.push("-source".to_string());
        options.push(source.clone());
    }
    if let Some(target) = &config.target_version {
        options.push("-target".to_string());
        options.push(target.clone());
    }
    options.push(if config.debug { "-g" } else { "-g:none" }.to_string());
    options
}

impl CompilerBackend for InProcessBackend {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn configure(&mut self, config: &CompilerConfiguration) -> Result<()> {
        if self.api.is_none() {
            return Err(Error::ToolchainUnavailable(
                "no in-process compiler API is available".to_string(),
            ));
        }

        self.classpath = expand_classpath(&config.classpath);
        if self.classpath.len() > config.classpath.len() {
            tracing::debug!(
                "Expanded classpath from {} to {} entries",
                config.classpath.len(),
                self.classpath.len()
            );
        }
        self.options = build_options(config);
        self.config = Some(config.clone());
        Ok(())
    }

    fn open_source(&mut self, file: &Path, encoding: &str) -> Result<&mut SourceSink> {
        let sink = SourceSink::in_memory(file, encoding)?;
        Ok(self.sink.insert(sink))
    }

    fn compile(
        &mut self,
        class_name: &str,
        tracking: &TrackingMap,
    ) -> Result<Vec<DiagnosticRecord>> {
        let api = self
            .api
            .as_ref()
            .ok_or_else(|| Error::ToolchainUnavailable("no in-process compiler API".to_string()))?;
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| Error::NotConfigured("configure() was not called".to_string()))?;
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| Error::NotConfigured("no source was opened".to_string()))?;

        self.artifacts.clear();
        let delegate = api.standard_file_manager(&self.classpath)?;
        let file_manager = MemoryFileManager::new(
            delegate,
            Arc::clone(&self.packages),
            config.reserved_package.clone(),
        );
        let sources = [SourceInput::new(class_name, sink.text())];

        let mut reported: Vec<ApiDiagnostic> = Vec::new();
        let succeeded = api.compile(
            CompileTask {
                options: &self.options,
                sources: &sources,
                file_manager: &file_manager,
            },
            &mut reported,
        );
        let mut outputs = file_manager.take_outputs();

        let has_errors = reported.iter().any(|d| d.severity == Severity::Error);
        if succeeded && !has_errors {
            for warning in &reported {
                tracing::debug!("{}: {}: {}", class_name, warning.severity, warning.message);
            }
            // Outer class first
            outputs.sort_by(|a, b| {
                (a.class_name != class_name, &a.class_name)
                    .cmp(&(b.class_name != class_name, &b.class_name))
            });
            self.packages.commit(&outputs);
            self.artifacts = outputs;
            return Ok(Vec::new());
        }

        if !outputs.is_empty() {
            tracing::debug!(
                "Discarding {} classes of failed compile of {}",
                outputs.len(),
                class_name
            );
        }

        let translator = DiagnosticTranslator::new(tracking, Some(sink.path()));
        let mut diagnostics: Vec<DiagnosticRecord> = reported
            .into_iter()
            .map(|d| translator.translate(d.severity, d.line, d.message))
            .collect();
        if !diagnostics.iter().any(DiagnosticRecord::is_error) {
            diagnostics.push(DiagnosticRecord::unstructured(format!(
                "{} failed to compile {} without reporting an error",
                api.name(),
                class_name
            )));
        }
        Ok(diagnostics)
    }

    fn artifacts(&self) -> &[Arc<BytecodeArtifact>] {
        &self.artifacts
    }

    fn persist_artifacts(&mut self, _class_name: &str, class_file: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (artifact, target) in artifact_files(&self.artifacts, class_file) {
            if self.packages.save(&artifact.class_name, &target)? {
                written.push(target);
            }
        }
        Ok(written)
    }

    fn class_last_modified(&self, class_name: &str, _class_file: &Path) -> Option<SystemTime> {
        self.packages.birth_time(class_name)
    }

    fn cleanup(&mut self, keep_source: bool) -> Result<()> {
        self.artifacts.clear();
        match self.sink.take() {
            Some(mut sink) if keep_source => sink.flush(),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options() {
        let config = CompilerConfiguration {
            extdirs: Some("/ext".to_string()),
            target_version: Some("21".to_string()),
            ..CompilerConfiguration::production()
        };
        assert_eq!(
            build_options(&config),
            ["-proc:none", "-extdirs", "/ext", "-target", "21", "-g:none"]
        );
        assert_eq!(
            build_options(&CompilerConfiguration::development()),
            ["-proc:none", "-g"]
        );
    }

    #[test]
    fn test_missing_api_is_toolchain_error() {
        let mut backend = InProcessBackend::new(None, VirtualPackageMap::shared());
        let result = backend.configure(&CompilerConfiguration::development());
        assert!(matches!(result, Err(Error::ToolchainUnavailable(_))));
    }

    #[test]
    fn test_unsupported_encoding() {
        let mut backend = InProcessBackend::new(None, VirtualPackageMap::shared());
        let result = backend.open_source(Path::new("a/B.java"), "x-no-such-charset");
        assert!(matches!(result, Err(Error::UnsupportedEncoding(_))));
    }
}
