//! Parsing of free-form compiler log text into diagnostics.
//!
//! This is the fallback path used for external tools that only report
//! through text. A diagnostic starts at every line of the form
//!
//! ```text
//! <path>:<line>: <message>
//! ```
//!
//! whose path is the generated source (or another `.java` file) and
//! collects the following non-matching lines (source excerpt, caret, symbol
//! details, trailing counts) as context. Text before the first match leads
//! the first diagnostic's context.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::diagnostics::{DiagnosticRecord, DiagnosticTranslator, Severity, TrackingMap};

static DIAGNOSTIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>.+?):(?P<line>\d+): (?P<message>.*)$")
        .expect("diagnostic pattern is valid")
});

/// Diagnostics reconstructed from tool output, with the text they came from.
#[derive(Debug, Clone, Default)]
pub struct ParsedReport {
    /// Structured diagnostics, in output order
    pub diagnostics: Vec<DiagnosticRecord>,

    /// The complete captured text
    pub raw: String,
}

impl ParsedReport {
    /// Diagnostics, falling back to one unstructured error carrying the raw
    /// text when nothing matched.
    pub fn into_diagnostics(self) -> Vec<DiagnosticRecord> {
        if !self.diagnostics.is_empty() {
            return self.diagnostics;
        }
        let raw = self.raw.trim();
        let message = if raw.is_empty() {
            "compilation failed without diagnostic output".to_string()
        } else {
            raw.to_string()
        };
        vec![DiagnosticRecord::unstructured(message)]
    }

    /// Diagnostics for a tool that did not run to completion.
    ///
    /// The abort reason is always reported. Without parsed diagnostics the
    /// captured text becomes its context.
    pub fn into_aborted_diagnostics(self, reason: &str) -> Vec<DiagnosticRecord> {
        let mut aborted =
            DiagnosticRecord::unstructured(format!("build tool aborted: {reason}"));
        if self.diagnostics.is_empty() {
            aborted.context = self
                .raw
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect();
            return vec![aborted];
        }
        let mut diagnostics = self.diagnostics;
        diagnostics.push(aborted);
        diagnostics
    }
}

/// Whether a matched path really names a source file.
///
/// Source excerpts echoed under a diagnostic can contain `<x>:<n>: ` too;
/// those start with indentation or are not `.java` paths.
fn is_source_path(path: &str, source_file: &Path) -> bool {
    if Path::new(path) == source_file {
        return true;
    }
    !path.starts_with(char::is_whitespace) && !path.contains('"') && path.ends_with(".java")
}

/// Parse captured tool output, mapping lines through the tracking map.
pub fn parse_tool_output(report: &str, source_file: &Path, tracking: &TrackingMap) -> ParsedReport {
    let translator = DiagnosticTranslator::new(tracking, Some(source_file));
    let mut diagnostics: Vec<DiagnosticRecord> = Vec::new();
    let mut preamble: Vec<String> = Vec::new();

    for line in report.lines() {
        if let Some(caps) = DIAGNOSTIC_LINE
            .captures(line)
            .filter(|caps| is_source_path(&caps["path"], source_file))
        {
            let generated_line = caps["line"].parse::<usize>().ok();
            let (severity, message) = split_severity(&caps["message"]);
            let mut record = translator.translate(severity, generated_line, message);
            if Path::new(&caps["path"]) != source_file {
                record.file_name = Some(caps["path"].into());
            }
            diagnostics.push(record);
            continue;
        }

        match diagnostics.last_mut() {
            Some(current) if !line.trim().is_empty() => current.context.push(line.to_string()),
            Some(_) => {}
            None if !line.trim().is_empty() => preamble.push(line.to_string()),
            None => {}
        }
    }

    if let Some(first) = diagnostics.first_mut()
        && !preamble.is_empty()
    {
        preamble.append(&mut first.context);
        first.context = preamble;
    }

    ParsedReport {
        diagnostics,
        raw: report.to_string(),
    }
}

/// Split a `error: ` / `warning: ` / `note: ` prefix off a message.
fn split_severity(message: &str) -> (Severity, &str) {
    let prefixes = [
        ("error: ", Severity::Error),
        ("warning: ", Severity::Warning),
        ("note: ", Severity::Note),
    ];
    for (prefix, severity) in prefixes {
        if let Some(rest) = message.strip_prefix(prefix) {
            return (severity, rest);
        }
    }
    (Severity::Error, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::diagnostics::TemplateLocation;

    const JAVAC_OUTPUT: &str = "\
Note: some input files use unchecked operations.
/scratch/kiln/generated/index_jsp.java:12: error: ';' expected
        out.write(\"x\")
                       ^
/scratch/kiln/generated/index_jsp.java:30: warning: [deprecation] foo() has been deprecated
1 error
1 warning
";

    #[test]
    fn test_parse_javac_text() {
        let source = Path::new("/scratch/kiln/generated/index_jsp.java");
        let mut map = TrackingMap::new();
        map.add_range(10..15, TemplateLocation::new("index.tpl", 3, 1), true);

        let report = parse_tool_output(JAVAC_OUTPUT, source, &map);
        assert_eq!(report.diagnostics.len(), 2);

        let first = &report.diagnostics[0];
        assert_eq!(first.severity, Severity::Error);
        assert_eq!(first.message, "';' expected");
        assert_eq!(first.generated_line, Some(12));
        assert_eq!(first.location.as_ref().unwrap().line, 5);
        assert_eq!(first.file_name.as_deref(), Some(source));
        // The note before the first diagnostic leads its context
        assert_eq!(first.context.len(), 3);
        assert_eq!(first.context[0], "Note: some input files use unchecked operations.");

        let second = &report.diagnostics[1];
        assert_eq!(second.severity, Severity::Warning);
        assert!(second.context.contains(&"1 error".to_string()));
        assert!(report.raw.contains("unchecked operations"));
    }

    #[test]
    fn test_windows_drive_letter_path() {
        let source = Path::new(r"C:\scratch\Foo.java");
        let output = "C:\\scratch\\Foo.java:4: error: cannot find symbol\n";
        let report = parse_tool_output(output, source, &TrackingMap::new());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].generated_line, Some(4));
        assert_eq!(report.diagnostics[0].message, "cannot find symbol");
    }

    #[test]
    fn test_unmatched_output_is_kept() {
        let report = parse_tool_output(
            "javac: invalid flag: -bogus\nUsage: javac <options>\n",
            Path::new("Foo.java"),
            &TrackingMap::new(),
        );
        assert!(report.diagnostics.is_empty());

        let diagnostics = report.into_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].location.is_none());
        assert!(diagnostics[0].message.contains("invalid flag"));
    }

    #[test]
    fn test_empty_output_still_fails() {
        let report = parse_tool_output("", Path::new("Foo.java"), &TrackingMap::new());
        let diagnostics = report.into_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
    }

    #[test]
    fn test_echoed_source_with_line_pattern_is_context() {
        let source = Path::new("/scratch/kiln/generated/index_jsp.java");
        let output = "\
/scratch/kiln/generated/index_jsp.java:5: error: ';' expected
        out.write(\"Meeting at 10:30: bring notes\")
                                                  ^
1 error
";
        let report = parse_tool_output(output, source, &TrackingMap::new());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].generated_line, Some(5));
        assert!(report.diagnostics[0].context[0].contains("10:30: bring notes"));
    }

    #[test]
    fn test_other_java_file_keeps_its_name() {
        let source = Path::new("/scratch/index_jsp.java");
        let output = "/scratch/Helper.java:8: warning: unchecked call\n";
        let report = parse_tool_output(output, source, &TrackingMap::new());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(
            report.diagnostics[0].file_name.as_deref(),
            Some(Path::new("/scratch/Helper.java"))
        );
    }

    #[test]
    fn test_leading_output_is_attached() {
        let output = "warning: [options] bootstrap class path not set\nFoo.java:3: error: boom\n";
        let diagnostics =
            parse_tool_output(output, Path::new("Foo.java"), &TrackingMap::new()).into_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "boom");
        assert_eq!(
            diagnostics[0].context,
            ["warning: [options] bootstrap class path not set"]
        );
    }

    #[test]
    fn test_aborted_reason_is_reported() {
        let report = parse_tool_output(
            "javac: invalid flag: -bogus\n",
            Path::new("Foo.java"),
            &TrackingMap::new(),
        );
        let diagnostics = report.into_aborted_diagnostics("javac exited with status 2");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("exited with status 2"));
        assert_eq!(diagnostics[0].context, ["javac: invalid flag: -bogus"]);

        // With parsed diagnostics the reason is appended
        let report = parse_tool_output(
            "Foo.java:1: error: x\n",
            Path::new("Foo.java"),
            &TrackingMap::new(),
        );
        let diagnostics = report.into_aborted_diagnostics("killed");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[1].message, "build tool aborted: killed");
    }
}
