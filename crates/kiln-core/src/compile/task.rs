//! Build tasks driven by the external tool backend.
//!
//! A [`BuildTask`] runs one compiler invocation and writes everything the
//! tool says into the [`TaskLog`] it is handed. Each invocation gets its own
//! log, so concurrent runs never mix their output.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use parking_lot::Mutex;
use thiserror::Error;

use super::types::CompilerConfiguration;

/// Everything a build tool needs to compile one generated source.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Generated source file
    pub source_file: PathBuf,

    /// Root of the generated sources (`-sourcepath`)
    pub source_dir: PathBuf,

    /// Source file relative to `source_dir`
    pub include: PathBuf,

    /// Encoding label of the source file
    pub encoding: String,

    /// Class output directory (`-d`)
    pub output_dir: PathBuf,

    pub classpath: Vec<PathBuf>,
    pub extdirs: Option<String>,
    pub source_version: Option<String>,
    pub target_version: Option<String>,
    pub debug: bool,
    pub optimize: bool,

    /// Tool selector from the configuration
    pub compiler: Option<String>,
}

impl ToolInvocation {
    /// Describe compiling `source_file` under `config`.
    pub fn new(config: &CompilerConfiguration, source_file: &Path, encoding: &str) -> Self {
        let source_dir = config.scratch_dir.clone();
        let include = source_file
            .strip_prefix(&source_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| source_file.to_path_buf());
        Self {
            source_file: source_file.to_path_buf(),
            source_dir,
            include,
            encoding: encoding.to_string(),
            output_dir: config.output_dir().to_path_buf(),
            classpath: config.classpath.clone(),
            extdirs: config.extdirs.clone(),
            source_version: config.source_version.clone(),
            target_version: config.target_version.clone(),
            debug: config.debug,
            optimize: config.optimize(),
            compiler: config.compiler.clone(),
        }
    }

    /// javac-style command line arguments.
    pub fn arguments(&self) -> Result<Vec<OsString>, TaskFailure> {
        let mut args: Vec<OsString> = vec![
            "-d".into(),
            self.output_dir.clone().into(),
            "-encoding".into(),
            self.encoding.clone().into(),
            "-sourcepath".into(),
            self.source_dir.clone().into(),
        ];

        if !self.classpath.is_empty() {
            let joined = std::env::join_paths(&self.classpath)
                .map_err(|e| TaskFailure::Aborted(format!("invalid classpath entry: {e}")))?;
            args.push("-classpath".into());
            args.push(joined);
        }
        if let Some(extdirs) = &self.extdirs {
            args.push("-extdirs".into());
            args.push(extdirs.into());
        }
        if let Some(source) = &self.source_version {
            args.push("-source".into());
            args.push(source.into());
        }
        if let Some(target) = &self.target_version {
            args.push("-target".into());
            args.push(target.into());
        }
        let debug_flag = if self.debug { "-g" } else { "-g:none" };
        args.push(debug_flag.into());
        args.push(self.source_file.clone().into());

        Ok(args)
    }

    /// Human readable summary, logged when the tool aborts.
    pub fn environment(&self) -> String {
        let mut info = String::new();
        info.push_str(&format!("Compile: source={}\n", self.source_file.display()));
        info.push_str(&format!("    srcDir={}\n", self.source_dir.display()));
        info.push_str(&format!("    include={}\n", self.include.display()));
        info.push_str(&format!("    destDir={}\n", self.output_dir.display()));
        info.push_str(&format!("    encoding={}\n", self.encoding));
        for entry in &self.classpath {
            info.push_str(&format!("    cp={}\n", entry.display()));
        }
        if let Some(extdirs) = &self.extdirs {
            info.push_str(&format!("    extdirs={extdirs}\n"));
        }
        if let Some(source) = &self.source_version {
            info.push_str(&format!("    compilerSourceVM={source}\n"));
        }
        if let Some(target) = &self.target_version {
            info.push_str(&format!("    compilerTargetVM={target}\n"));
        }
        info
    }
}

/// Why a task did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskFailure {
    /// The tool ran and reported compile errors.
    #[error("compile failed; see the compiler error output for details")]
    CompileFailed,

    /// The tool could not run to completion.
    #[error("build tool aborted: {0}")]
    Aborted(String),
}

/// Verbosity of a log line, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Verbose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub text: String,
}

/// Buffer for a task's output.
///
/// Lines are kept instead of printed; anything more verbose than the
/// threshold is dropped.
pub struct TaskLog {
    threshold: LogLevel,
    lines: Mutex<Vec<LogLine>>,
}

impl Default for TaskLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskLog {
    pub fn new() -> Self {
        Self::with_threshold(LogLevel::Info)
    }

    pub fn with_threshold(threshold: LogLevel) -> Self {
        Self {
            threshold,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn log(&self, level: LogLevel, text: impl Into<String>) {
        if level > self.threshold {
            return;
        }
        let text = text.into();
        tracing::trace!("[tool] {}", text);
        self.lines.lock().push(LogLine { level, text });
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Take the buffered text, one line per entry.
    pub fn report(&self) -> String {
        let lines = std::mem::take(&mut *self.lines.lock());
        let mut report = String::new();
        for line in lines {
            report.push_str(&line.text);
            report.push('\n');
        }
        report
    }
}

/// A task-oriented build tool.
pub trait BuildTask: Send + Sync {
    /// Name used in logs and worker job names.
    fn name(&self) -> &str;

    /// Run one compilation, writing tool output to `log`.
    fn execute(&self, invocation: &ToolInvocation, log: &TaskLog) -> Result<(), TaskFailure>;
}

/// Runs a javac-compatible executable as a child process.
#[derive(Debug, Clone)]
pub struct ProcessTask {
    executable: PathBuf,
}

impl ProcessTask {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl BuildTask for ProcessTask {
    fn name(&self) -> &str {
        "javac"
    }

    fn execute(&self, invocation: &ToolInvocation, log: &TaskLog) -> Result<(), TaskFailure> {
        let args = invocation.arguments()?;
        tracing::debug!(
            "Running {} on {}",
            self.executable.display(),
            invocation.source_file.display()
        );

        let output = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                TaskFailure::Aborted(format!(
                    "failed to run {}: {}",
                    self.executable.display(),
                    e
                ))
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            log.log(LogLevel::Info, line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            log.log(LogLevel::Error, line);
        }

        // javac: 1 = compile errors, 2 = bad command line, 3/4 = system error
        match output.status.code() {
            Some(0) => Ok(()),
            Some(1) => Err(TaskFailure::CompileFailed),
            Some(code) => Err(TaskFailure::Aborted(format!(
                "{} exited with status {}",
                self.executable.display(),
                code
            ))),
            None => Err(TaskFailure::Aborted(format!(
                "{} was terminated by a signal",
                self.executable.display()
            ))),
        }
    }
}
