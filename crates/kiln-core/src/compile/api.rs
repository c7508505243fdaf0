//! Interface to a compiler that runs inside the current process.
//!
//! kiln does not ship a compiler. The runtime embedding it provides a
//! [`CompilerApi`], which compiles in-memory sources through a
//! [`FileManager`] and reports structured diagnostics.

use std::path::PathBuf;

use crate::error::Result;

use super::diagnostics::Severity;
use super::file_manager::FileManager;

/// A source handed to the compiler from memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInput {
    /// Synthetic URI, e.g. `string:///index_jsp.java`
    pub uri: String,

    /// Fully qualified name of the outer class
    pub class_name: String,

    pub text: String,
}

impl SourceInput {
    /// Source for `class_name`, named after its simple name.
    pub fn new(class_name: impl Into<String>, text: impl Into<String>) -> Self {
        let class_name = class_name.into();
        Self {
            uri: format!("string:///{}.java", super::types::simple_name(&class_name)),
            class_name,
            text: text.into(),
        }
    }
}

/// A diagnostic as the compiler reports it, in generated-source terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDiagnostic {
    pub severity: Severity,

    /// Line in the generated source, if the diagnostic has one
    pub line: Option<usize>,

    pub message: String,

    /// URI of the source the diagnostic belongs to
    pub source: Option<String>,
}

impl ApiDiagnostic {
    pub fn error(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            line,
            message: message.into(),
            source: None,
        }
    }

    pub fn warning(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(line, message)
        }
    }
}

/// Receives diagnostics while a compile runs.
pub trait DiagnosticListener {
    fn report(&mut self, diagnostic: ApiDiagnostic);
}

impl DiagnosticListener for Vec<ApiDiagnostic> {
    fn report(&mut self, diagnostic: ApiDiagnostic) {
        self.push(diagnostic);
    }
}

/// One request to the compiler.
pub struct CompileTask<'a> {
    /// Command line style options (`-proc:none`, `-g`, ...)
    pub options: &'a [String],

    pub sources: &'a [SourceInput],

    /// Where classes are read from and written to
    pub file_manager: &'a dyn FileManager,
}

/// A compiler callable from the current process.
pub trait CompilerApi: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// The compiler's own file manager over a classpath.
    fn standard_file_manager(&self, classpath: &[PathBuf]) -> Result<Box<dyn FileManager>>;

    /// Compile the task's sources. Returns true on success.
    fn compile(&self, task: CompileTask<'_>, diagnostics: &mut dyn DiagnosticListener) -> bool;
}
