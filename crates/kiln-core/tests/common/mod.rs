//! Scripted compilers shared by the integration tests.
//!
//! The toy language is line based:
//! - `package a.b;` sets the package
//! - `class Name {` declares a class; the first one is the outer class and
//!   later ones are nested in it
//! - `import a.b.C;` must resolve through the classpath
//! - `// @error msg` and `// @warning msg` report a diagnostic on that line
//! - `// @silent-failure` fails without reporting anything

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use kiln_core::compile::{
    ApiDiagnostic, BuildTask, CompileTask, CompilerApi, DiagnosticListener, FileKind, FileManager,
    LogLevel, Location, Severity, StandardFileManager, TaskFailure, TaskLog, ToolInvocation,
    class_relative_path,
};

pub const CLASS_MAGIC: &[u8] = b"\xCA\xFE\xBA\xBE";

/// What the toy parser found in a source.
#[derive(Debug, Default)]
pub struct ToyUnit {
    pub package: String,
    pub classes: Vec<String>,
    pub imports: Vec<(usize, String)>,
    pub reports: Vec<(usize, Severity, String)>,
    pub silent_failure: bool,
}

impl ToyUnit {
    pub fn parse(text: &str) -> Self {
        let mut unit = ToyUnit::default();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if let Some(pkg) = line.strip_prefix("package ") {
                unit.package = pkg.trim_end_matches(';').trim().to_string();
            } else if let Some(import) = line.strip_prefix("import ") {
                unit.imports
                    .push((line_no, import.trim_end_matches(';').trim().to_string()));
            } else if let Some(rest) = line.strip_prefix("class ") {
                let name = rest.split_whitespace().next().unwrap_or_default();
                unit.classes.push(name.trim_end_matches('{').to_string());
            }

            if let Some((_, msg)) = line.split_once("// @error ") {
                unit.reports.push((line_no, Severity::Error, msg.to_string()));
            } else if let Some((_, msg)) = line.split_once("// @warning ") {
                unit.reports.push((line_no, Severity::Warning, msg.to_string()));
            } else if line.contains("// @silent-failure") {
                unit.silent_failure = true;
            }
        }
        unit
    }

    /// Binary names of every declared class, outer first.
    pub fn binary_names(&self) -> Vec<String> {
        let qualify = |simple: &str| {
            if self.package.is_empty() {
                simple.to_string()
            } else {
                format!("{}.{}", self.package, simple)
            }
        };
        let Some((outer, nested)) = self.classes.split_first() else {
            return Vec::new();
        };
        let mut names = vec![qualify(outer)];
        names.extend(nested.iter().map(|n| qualify(&format!("{outer}${n}"))));
        names
    }
}

/// Bytes the toy compilers emit for a class.
pub fn class_bytes(binary_name: &str) -> Vec<u8> {
    let mut bytes = CLASS_MAGIC.to_vec();
    bytes.extend_from_slice(binary_name.as_bytes());
    bytes
}

/// In-process compiler API over the toy language.
#[derive(Default)]
pub struct ToyCompiler {
    pub seen_options: Mutex<Vec<Vec<String>>>,
}

impl ToyCompiler {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl CompilerApi for ToyCompiler {
    fn name(&self) -> &str {
        "toyc"
    }

    fn standard_file_manager(&self, classpath: &[PathBuf]) -> kiln_core::Result<Box<dyn FileManager>> {
        Ok(Box::new(StandardFileManager::new(classpath)))
    }

    fn compile(&self, task: CompileTask<'_>, diagnostics: &mut dyn DiagnosticListener) -> bool {
        self.seen_options.lock().push(task.options.to_vec());

        let mut ok = true;
        for source in task.sources {
            let unit = ToyUnit::parse(&source.text);

            for (line, name) in &unit.imports {
                let found = task
                    .file_manager
                    .locate(Location::ClassPath, name, FileKind::Class)
                    .ok()
                    .flatten();
                let readable = found
                    .as_ref()
                    .and_then(|file| task.file_manager.open_for_read(file).ok())
                    .is_some_and(|bytes| bytes.starts_with(CLASS_MAGIC));
                if !readable {
                    ok = false;
                    diagnostics.report(ApiDiagnostic {
                        source: Some(source.uri.clone()),
                        ..ApiDiagnostic::error(Some(*line), format!("cannot find symbol: {name}"))
                    });
                }
            }
            for (line, severity, msg) in &unit.reports {
                if *severity == Severity::Error {
                    ok = false;
                }
                diagnostics.report(ApiDiagnostic {
                    severity: *severity,
                    line: Some(*line),
                    message: msg.clone(),
                    source: Some(source.uri.clone()),
                });
            }
            if unit.silent_failure {
                ok = false;
            }
            if !ok {
                continue;
            }

            for name in unit.binary_names() {
                let Ok(mut out) =
                    task.file_manager
                        .open_for_write(Location::ClassOutput, &name, FileKind::Class)
                else {
                    return false;
                };
                if out.write_all(&class_bytes(&name)).is_err() {
                    return false;
                }
            }
        }
        ok
    }
}

/// Build task that "compiles" toy sources and logs javac-style output.
///
/// Every log line is written slowly, so overlapping runs sharing a log would
/// mix their text.
#[derive(Default)]
pub struct ScriptedTask {
    pub runs: Mutex<Vec<PathBuf>>,
}

impl ScriptedTask {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl BuildTask for ScriptedTask {
    fn name(&self) -> &str {
        "scripted"
    }

    fn execute(&self, invocation: &ToolInvocation, log: &TaskLog) -> Result<(), TaskFailure> {
        self.runs.lock().push(invocation.source_file.clone());
        let bytes = fs::read(&invocation.source_file)
            .map_err(|e| TaskFailure::Aborted(format!("cannot read source: {e}")))?;
        let text = String::from_utf8_lossy(&bytes);
        let unit = ToyUnit::parse(&text);
        let lines: Vec<&str> = text.lines().collect();
        let path = invocation.source_file.display();

        log.log(LogLevel::Info, format!("Compiling 1 source file to {}", invocation.output_dir.display()));
        log.log(LogLevel::Verbose, "[parsing started]");

        let mut errors = 0;
        for (line, severity, msg) in &unit.reports {
            thread::sleep(Duration::from_millis(2));
            log.log(LogLevel::Error, format!("{path}:{line}: {severity}: {msg}"));
            log.log(LogLevel::Error, lines[line - 1].to_string());
            if *severity == Severity::Error {
                errors += 1;
            }
        }
        if unit.silent_failure {
            return Err(TaskFailure::Aborted("tool crashed".to_string()));
        }
        if errors > 0 {
            log.log(LogLevel::Error, format!("{errors} error(s)"));
            return Err(TaskFailure::CompileFailed);
        }

        for name in unit.binary_names() {
            let file = invocation.output_dir.join(class_relative_path(&name, "class"));
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(&file, class_bytes(&name)).unwrap();
        }
        Ok(())
    }
}

/// A page source: the outer class, one nested class and optional extra
/// lines inside the outer class.
pub fn page_source(package: &str, class: &str, body: &[&str]) -> String {
    let mut source = format!("package {package};\n\nclass {class} {{\n");
    for line in body {
        source.push_str("    ");
        source.push_str(line);
        source.push('\n');
    }
    source.push_str("    class Row {\n    }\n}\n");
    source
}

/// In-process backend over the toy compiler.
pub fn in_process(
    api: &Arc<ToyCompiler>,
    packages: &Arc<kiln_core::VirtualPackageMap>,
) -> kiln_core::InProcessBackend {
    let api: Arc<dyn CompilerApi> = api.clone();
    kiln_core::InProcessBackend::new(Some(api), Arc::clone(packages))
}
