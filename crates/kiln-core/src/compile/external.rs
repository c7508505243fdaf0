//! Backend driving an external, task-oriented build tool.
//!
//! The generated source is written to disk and handed to a [`BuildTask`],
//! which writes class files into the output directory. Depending on the
//! configured [`ExecutionMode`] the task runs on the calling thread (forked:
//! the task spawns its own compiler process) or on an injected
//! [`WorkerPool`] (serialized).
//!
//! The tool only reports problems as text, so failures are reconstructed
//! from the captured output with [`parse_tool_output`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::pool::WorkerPool;

use super::backend::{CompilerBackend, artifact_files};
use super::diagnostics::{DiagnosticRecord, TrackingMap};
use super::source::SourceSink;
use super::task::{BuildTask, ProcessTask, TaskFailure, TaskLog, ToolInvocation};
use super::tool_output::parse_tool_output;
use super::toolchain::Toolchain;
use super::types::{
    BytecodeArtifact, CompilerConfiguration, ExecutionMode, class_relative_path, package_of,
    simple_name,
};

/// Compiles through an external build tool.
pub struct ExternalToolBackend {
    /// The tool
    task: Arc<dyn BuildTask>,

    /// Pool for serialized runs
    pool: Option<Arc<WorkerPool>>,

    /// Set by `configure`
    config: Option<CompilerConfiguration>,

    /// Generated source of the current unit
    sink: Option<SourceSink>,

    /// Encoding label as given by the caller
    encoding: String,

    /// Classes found after the last successful compile
    artifacts: Vec<Arc<BytecodeArtifact>>,
}

impl ExternalToolBackend {
    /// Create a backend for a task. Serialized mode requires a pool.
    pub fn new(task: Arc<dyn BuildTask>, pool: Option<Arc<WorkerPool>>) -> Self {
        Self {
            task,
            pool,
            config: None,
            sink: None,
            encoding: String::new(),
            artifacts: Vec::new(),
        }
    }

    /// Create a backend running the compiler selected by the configuration.
    pub fn javac(config: &CompilerConfiguration, pool: Option<Arc<WorkerPool>>) -> Result<Self> {
        let toolchain = Toolchain::detect(config.compiler.as_deref())?;
        tracing::debug!("Using compiler {}", toolchain.compiler_path().display());
        let task = ProcessTask::new(toolchain.compiler_path());
        Ok(Self::new(Arc::new(task), pool))
    }

    /// Execution mode of the current configuration.
    pub fn mode(&self) -> Option<ExecutionMode> {
        self.config.as_ref().map(|c| c.mode)
    }

    /// Run the task and return its outcome with everything it logged.
    fn run_task(
        &self,
        mode: ExecutionMode,
        invocation: &ToolInvocation,
    ) -> (std::result::Result<(), TaskFailure>, String) {
        match (mode, &self.pool) {
            (ExecutionMode::Forked, _) => {
                let log = TaskLog::new();
                let result = self.task.execute(invocation, &log);
                (result, log.report())
            }
            (ExecutionMode::Serialized, Some(pool)) => {
                let log = Arc::new(TaskLog::new());
                let task = Arc::clone(&self.task);
                let job_log = Arc::clone(&log);
                let job_invocation = invocation.clone();

                let result = pool
                    .run(self.task.name(), move || {
                        task.execute(&job_invocation, &job_log)
                    })
                    .unwrap_or_else(|e| Err(TaskFailure::Aborted(e.to_string())));
                (result, log.report())
            }
            (ExecutionMode::Serialized, None) => (
                Err(TaskFailure::Aborted(
                    "serialized mode needs a worker pool".to_string(),
                )),
                String::new(),
            ),
        }
    }
}

impl CompilerBackend for ExternalToolBackend {
    fn name(&self) -> &'static str {
        "external"
    }

    fn configure(&mut self, config: &CompilerConfiguration) -> Result<()> {
        if config.mode == ExecutionMode::Serialized && self.pool.is_none() {
            return Err(Error::NotConfigured(
                "serialized mode needs a worker pool".to_string(),
            ));
        }
        if config.mode == ExecutionMode::Serialized
            && let Some(pool) = &self.pool
            && !pool.is_running()
        {
            return Err(Error::PoolShutdown(pool.name().to_string()));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn open_source(&mut self, file: &Path, encoding: &str) -> Result<&mut SourceSink> {
        let sink = SourceSink::on_disk(file, encoding)?;
        self.encoding = encoding.to_string();
        Ok(self.sink.insert(sink))
    }

    fn compile(
        &mut self,
        class_name: &str,
        tracking: &TrackingMap,
    ) -> Result<Vec<DiagnosticRecord>> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| Error::NotConfigured("configure() was not called".to_string()))?;
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| Error::NotConfigured("no source was opened".to_string()))?;
        sink.flush()?;
        let source_file = sink.path().to_path_buf();

        let output_dir = config.output_dir().to_path_buf();
        fs::create_dir_all(&output_dir).map_err(|e| Error::io(&output_dir, e))?;

        self.artifacts.clear();
        remove_class_files(&output_dir, class_name)?;
        let invocation = ToolInvocation::new(&config, &source_file, &self.encoding);
        let (result, report) = self.run_task(config.mode, &invocation);

        match result {
            Ok(()) => {
                self.artifacts = collect_class_files(&output_dir, class_name)?;
                if self.artifacts.is_empty() {
                    tracing::warn!(
                        "Tool reported success but no class file for {} in {}",
                        class_name,
                        output_dir.display()
                    );
                }
                Ok(Vec::new())
            }
            Err(failure) => {
                match &failure {
                    TaskFailure::Aborted(reason) if !config.quiet => {
                        tracing::error!("Build tool failed to run: {}", reason);
                        tracing::error!("Compilation environment:\n{}", invocation.environment());
                    }
                    _ => tracing::debug!("Compiling {} failed: {}", class_name, failure),
                }
                let parsed = parse_tool_output(&report, &source_file, tracking);
                Ok(match failure {
                    TaskFailure::Aborted(reason) => parsed.into_aborted_diagnostics(&reason),
                    TaskFailure::CompileFailed => parsed.into_diagnostics(),
                })
            }
        }
    }

    fn artifacts(&self) -> &[Arc<BytecodeArtifact>] {
        &self.artifacts
    }

    fn persist_artifacts(&mut self, _class_name: &str, class_file: &Path) -> Result<Vec<PathBuf>> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| Error::NotConfigured("configure() was not called".to_string()))?;
        let output_dir = config.output_dir();

        let mut written = Vec::new();
        for (artifact, target) in artifact_files(&self.artifacts, class_file) {
            // The tool already wrote the class; copy only if asked elsewhere.
            let produced = output_dir.join(class_relative_path(&artifact.class_name, "class"));
            if produced != target {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
                }
                fs::write(&target, &artifact.bytes).map_err(|e| Error::io(&target, e))?;
            }
            written.push(target);
        }
        Ok(written)
    }

    fn class_last_modified(&self, _class_name: &str, class_file: &Path) -> Option<SystemTime> {
        fs::metadata(class_file).and_then(|m| m.modified()).ok()
    }

    fn cleanup(&mut self, keep_source: bool) -> Result<()> {
        if let Some(sink) = self.sink.take()
            && !keep_source
            && let Err(e) = fs::remove_file(sink.path())
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::debug!("Could not delete {}: {}", sink.path().display(), e);
        }
        self.artifacts.clear();
        Ok(())
    }
}

/// Class files of a class and its nested classes, with their binary names.
fn class_file_entries(output_dir: &Path, class_name: &str) -> Result<Vec<(PathBuf, String)>> {
    let package = package_of(class_name);
    let simple = simple_name(class_name);
    let dir = match output_dir.join(class_relative_path(class_name, "class")).parent() {
        Some(dir) => dir.to_path_buf(),
        None => output_dir.to_path_buf(),
    };

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(&dir, e)),
    };

    let nested_prefix = format!("{simple}$");
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(&dir, e))?;
        let file_name = entry.file_name();
        let Some(stem) = file_name.to_str().and_then(|n| n.strip_suffix(".class")) else {
            continue;
        };
        if stem != simple && !stem.starts_with(&nested_prefix) {
            continue;
        }
        let name = if package.is_empty() {
            stem.to_string()
        } else {
            format!("{package}.{stem}")
        };
        found.push((entry.path(), name));
    }
    Ok(found)
}

/// Delete class files left by an earlier compile of the same class.
///
/// A nested class dropped from the source would otherwise be read back as
/// part of the new result.
fn remove_class_files(output_dir: &Path, class_name: &str) -> Result<()> {
    for (path, _) in class_file_entries(output_dir, class_name)? {
        match fs::remove_file(&path) {
            Ok(()) => tracing::trace!("Removed stale {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&path, e)),
        }
    }
    Ok(())
}

/// Read the outer class and its nested classes from the output directory.
fn collect_class_files(output_dir: &Path, class_name: &str) -> Result<Vec<Arc<BytecodeArtifact>>> {
    let mut artifacts = Vec::new();
    for (path, name) in class_file_entries(output_dir, class_name)? {
        let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        artifacts.push(Arc::new(BytecodeArtifact::new(name, bytes)));
    }

    // Outer class first, nested classes by name
    artifacts.sort_by(|a, b| {
        (a.class_name != class_name, &a.class_name).cmp(&(b.class_name != class_name, &b.class_name))
    });
    Ok(artifacts)
}
