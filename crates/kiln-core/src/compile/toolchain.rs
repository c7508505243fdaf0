//! Toolchain discovery for the external compiler.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Environment variable naming the compiler executable.
pub const COMPILER_ENV: &str = "KILN_JAVAC";

const DEFAULT_COMPILER: &str = "javac";

/// A located compiler executable.
#[derive(Debug, Clone)]
pub struct Toolchain {
    /// Path to the compiler
    compiler_path: PathBuf,
}

impl Toolchain {
    /// Locate the compiler.
    ///
    /// Looks in the following order:
    /// 1. `KILN_JAVAC` environment variable
    /// 2. The selector, if it names an existing file
    /// 3. The selector (or `javac`) on the system PATH
    pub fn detect(selector: Option<&str>) -> Result<Self> {
        if let Ok(path) = std::env::var(COMPILER_ENV) {
            let path = PathBuf::from(path);
            if path.is_file() {
                return Ok(Self::at(path));
            }
            tracing::warn!(
                "{} points at {}, which does not exist",
                COMPILER_ENV,
                path.display()
            );
        }

        Self::from_selector(selector)
    }

    /// Locate the compiler from the selector only, ignoring the environment.
    pub fn from_selector(selector: Option<&str>) -> Result<Self> {
        let name = selector.unwrap_or(DEFAULT_COMPILER);
        let direct = Path::new(name);
        if direct.components().count() > 1 || direct.is_absolute() {
            if direct.is_file() {
                return Ok(Self::at(direct));
            }
            return Err(Error::ToolchainUnavailable(format!(
                "compiler {} does not exist",
                direct.display()
            )));
        }

        which::which(name)
            .map(Self::at)
            .map_err(|_| Error::ToolchainUnavailable(format!("{name} not found in PATH")))
    }

    /// Use a known compiler path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            compiler_path: path.into(),
        }
    }

    pub fn compiler_path(&self) -> &Path {
        &self.compiler_path
    }

    /// Version string reported by `<compiler> -version`.
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.compiler_path)
            .arg("-version")
            .output()
            .map_err(|e| {
                Error::ToolchainUnavailable(format!(
                    "failed to run {}: {}",
                    self.compiler_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(Error::ToolchainUnavailable(format!(
                "{} -version failed",
                self.compiler_path.display()
            )));
        }

        // Older compilers print the version on stderr
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !stdout.is_empty() {
            return Ok(stdout);
        }
        Ok(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}
