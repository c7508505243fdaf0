//! Common types for the compilation pipeline.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Package that generated units are placed in unless configured otherwise.
pub const DEFAULT_GENERATED_PACKAGE: &str = "kiln.generated";

/// How the external build tool is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Spawn an independent compiler process on the calling thread.
    Forked,
    /// Run the task on a worker pool thread and wait for it.
    #[default]
    Serialized,
}

/// Configuration shared by every unit compiled in one context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfiguration {
    /// Classpath entries (directories or jars).
    pub classpath: Vec<PathBuf>,

    /// Extension directories, as a platform path list.
    pub extdirs: Option<String>,

    /// Source language version (e.g. "17").
    pub source_version: Option<String>,

    /// Target VM version.
    pub target_version: Option<String>,

    /// Emit debug info (and skip optimization).
    pub debug: bool,

    /// Tool selector: executable name or path of the external compiler.
    pub compiler: Option<String>,

    /// Execution strategy for the external tool backend.
    pub mode: ExecutionMode,

    /// Directory holding generated sources (.kiln/scratch/)
    pub scratch_dir: PathBuf,

    /// Directory receiving class files. Defaults to the scratch directory.
    pub output_dir: Option<PathBuf>,

    /// Package namespace whose classes are served from the virtual package map.
    pub reserved_package: String,

    /// Suppress kiln's own error reports for this context.
    pub quiet: bool,
}

impl Default for CompilerConfiguration {
    fn default() -> Self {
        Self {
            classpath: Vec::new(),
            extdirs: None,
            source_version: None,
            target_version: None,
            debug: true,
            compiler: None,
            mode: ExecutionMode::Serialized,
            scratch_dir: PathBuf::from(".kiln/scratch"),
            output_dir: None,
            reserved_package: DEFAULT_GENERATED_PACKAGE.to_string(),
            quiet: false,
        }
    }
}

impl CompilerConfiguration {
    /// Config for interactive development: debug info, pooled tool runs.
    pub fn development() -> Self {
        Self::default()
    }

    /// Config for deployment builds: no debug info, isolated tool processes.
    pub fn production() -> Self {
        Self {
            debug: false,
            mode: ExecutionMode::Forked,
            ..Default::default()
        }
    }

    /// Create a development config rooted at a scratch directory.
    pub fn with_scratch_dir(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            ..Self::development()
        }
    }

    /// Directory that receives class files.
    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.scratch_dir)
    }

    /// Whether the tool should optimize. Always the inverse of `debug`.
    pub fn optimize(&self) -> bool {
        !self.debug
    }

    /// Returns true if the class belongs to the reserved namespace.
    pub fn is_reserved(&self, class_name: &str) -> bool {
        is_in_namespace(&package_of(class_name), &self.reserved_package)
    }
}

/// One generated source submitted for compilation.
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    /// Fully qualified class name of the outer class.
    pub class_name: String,

    /// Generated source text.
    pub source: String,

    /// Encoding label for the source file.
    pub encoding: String,

    /// Where the generated source lives (or would live) on disk.
    pub source_file: PathBuf,

    /// Target class file of the outer class.
    pub class_file: PathBuf,

    /// Keep the generated source on disk after compiling.
    pub keep_source: bool,
}

impl CompilationUnit {
    /// Create a unit laid out under the configuration's scratch and output dirs.
    pub fn for_config(
        config: &CompilerConfiguration,
        class_name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let class_name = class_name.into();
        let source_file = config
            .scratch_dir
            .join(class_relative_path(&class_name, "java"));
        let class_file = config
            .output_dir()
            .join(class_relative_path(&class_name, "class"));
        Self {
            class_name,
            source: source.into(),
            encoding: "UTF-8".to_string(),
            source_file,
            class_file,
            keep_source: false,
        }
    }

    /// Set the source encoding label.
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Keep the generated source after compilation.
    pub fn keep_source(mut self, keep: bool) -> Self {
        self.keep_source = keep;
        self
    }
}

/// Compiled bytes of one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeArtifact {
    /// Fully qualified (binary) class name, e.g. `a.b.Outer$Inner`.
    pub class_name: String,

    /// Owning package, empty for the default package.
    pub package: String,

    /// Raw class file bytes.
    pub bytes: Vec<u8>,

    /// When the bytes were produced.
    pub created: SystemTime,
}

impl BytecodeArtifact {
    /// Create an artifact, deriving the package from the class name.
    pub fn new(class_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let class_name = class_name.into();
        Self {
            package: package_of(&class_name),
            class_name,
            bytes,
            created: SystemTime::now(),
        }
    }

    /// Name after the last `.`, including any `$` nesting suffix.
    pub fn simple_name(&self) -> &str {
        simple_name(&self.class_name)
    }
}

/// Package part of a fully qualified class name.
pub fn package_of(class_name: &str) -> String {
    class_name
        .rfind('.')
        .map(|idx| class_name[..idx].to_string())
        .unwrap_or_default()
}

/// Simple part of a fully qualified class name.
pub fn simple_name(class_name: &str) -> &str {
    class_name
        .rfind('.')
        .map(|idx| &class_name[idx + 1..])
        .unwrap_or(class_name)
}

/// Outer class of a binary name (`a.B$C` -> `a.B`).
pub fn outer_class(class_name: &str) -> &str {
    let simple_start = class_name.rfind('.').map(|idx| idx + 1).unwrap_or(0);
    match class_name[simple_start..].find('$') {
        Some(idx) => &class_name[..simple_start + idx],
        None => class_name,
    }
}

/// Relative file path of a class (`a.b.C` -> `a/b/C.<ext>`).
pub fn class_relative_path(class_name: &str, extension: &str) -> PathBuf {
    let mut path: PathBuf = class_name.split('.').collect();
    path.set_extension(extension);
    path
}

/// Disk file for `class_name` given the outer class's target file.
///
/// The directory of the outer file is kept and the file name replaced with
/// `<simple name>.class`.
pub fn derive_class_file(outer_class_file: &Path, class_name: &str) -> PathBuf {
    let file_name = format!("{}.class", simple_name(class_name));
    match outer_class_file.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// True if `package` is `namespace` or one of its subpackages.
pub fn is_in_namespace(package: &str, namespace: &str) -> bool {
    if namespace.is_empty() {
        return false;
    }
    package == namespace
        || (package.starts_with(namespace) && package[namespace.len()..].starts_with('.'))
}
