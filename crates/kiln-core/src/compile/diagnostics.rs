//! Diagnostics and their mapping back to template coordinates.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Note => "note",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A location in the template the generated source came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLocation {
    /// Template file path
    pub file: PathBuf,

    /// Line number (1-indexed)
    pub line: usize,

    /// Column number (1-indexed)
    pub column: usize,
}

impl TemplateLocation {
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

/// A compile problem reported to the template author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    /// Severity level
    pub severity: Severity,

    /// Message text
    pub message: String,

    /// Line in the generated source (1-indexed), when the backend knew it
    pub generated_line: Option<usize>,

    /// Template location after translation
    pub location: Option<TemplateLocation>,

    /// Generated file the backend reported against
    pub file_name: Option<PathBuf>,

    /// Unstructured tool output that followed this diagnostic
    pub context: Vec<String>,
}

impl DiagnosticRecord {
    /// An error with no location, carrying raw text.
    pub fn unstructured(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            generated_line: None,
            location: None,
            file_name: None,
            context: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Format the diagnostic for terminal display.
    pub fn format_terminal(&self) -> String {
        let mut output = String::new();

        let level_str = match self.severity {
            Severity::Error => "\x1b[1;31merror\x1b[0m",
            Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
            Severity::Note => "\x1b[1;36mnote\x1b[0m",
        };
        output.push_str(&format!("{level_str}: {}\n", self.message));

        if let Some(loc) = &self.location {
            output.push_str(&format!(
                "  \x1b[1;34m-->\x1b[0m {}:{}:{}\n",
                loc.file.display(),
                loc.line,
                loc.column
            ));
        }
        if let (Some(file), Some(line)) = (&self.file_name, self.generated_line) {
            output.push_str(&format!("  generated: {}:{}\n", file.display(), line));
        }
        for line in &self.context {
            output.push_str("  | ");
            output.push_str(line);
            output.push('\n');
        }

        output
    }

    /// Format the diagnostic for JSON output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "severity": self.severity.as_str(),
            "message": self.message,
            "generated_line": self.generated_line,
            "file": self.file_name.as_ref().map(|f| f.display().to_string()),
            "location": self.location.as_ref().map(|loc| {
                serde_json::json!({
                    "file": loc.file.display().to_string(),
                    "line": loc.line,
                    "column": loc.column,
                })
            }),
            "context": self.context,
        })
    }
}

/// A run of generated lines produced from one template construct.
#[derive(Debug, Clone)]
pub struct TrackedRange {
    /// Generated lines covered, half-open, 1-indexed
    pub generated: Range<usize>,

    /// Where the construct starts in the template
    pub template: TemplateLocation,

    /// Template text was copied line for line (scriptlet-like)
    pub verbatim: bool,
}

impl TrackedRange {
    fn contains(&self, line: usize) -> bool {
        self.generated.contains(&line)
    }

    /// Distance from `line` to the nearest line of this range.
    fn distance(&self, line: usize) -> usize {
        if line < self.generated.start {
            self.generated.start - line
        } else {
            line + 1 - self.generated.end.max(self.generated.start + 1)
        }
    }
}

/// Correlates generated-source lines with template locations.
///
/// Built by the code generator; kiln only reads it.
#[derive(Debug, Clone, Default)]
pub struct TrackingMap {
    ranges: Vec<TrackedRange>,
}

impl TrackingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a range of generated lines.
    pub fn add_range(
        &mut self,
        generated: Range<usize>,
        template: TemplateLocation,
        verbatim: bool,
    ) -> &mut Self {
        self.ranges.push(TrackedRange {
            generated,
            template,
            verbatim,
        });
        self
    }

    /// Record a single generated line copied from a template line.
    pub fn add_line(&mut self, generated_line: usize, template: TemplateLocation) -> &mut Self {
        self.add_range(generated_line..generated_line + 1, template, true)
    }

    pub fn ranges(&self) -> &[TrackedRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Maps backend-native (line, message) pairs to template diagnostics.
pub struct DiagnosticTranslator<'a> {
    tracking: &'a TrackingMap,
    file_name: Option<PathBuf>,
}

impl<'a> DiagnosticTranslator<'a> {
    /// Create a translator for diagnostics reported against `file_name`.
    pub fn new(tracking: &'a TrackingMap, file_name: Option<&Path>) -> Self {
        Self {
            tracking,
            file_name: file_name.map(Path::to_path_buf),
        }
    }

    /// Translate one backend diagnostic.
    pub fn translate(
        &self,
        severity: Severity,
        generated_line: Option<usize>,
        message: impl Into<String>,
    ) -> DiagnosticRecord {
        DiagnosticRecord {
            severity,
            message: message.into(),
            generated_line,
            location: generated_line.and_then(|line| self.map_line(line)),
            file_name: self.file_name.clone(),
            context: Vec::new(),
        }
    }

    /// Map a generated line to its template location.
    ///
    /// Lines outside every range are reported at the closest range.
    pub fn map_line(&self, generated_line: usize) -> Option<TemplateLocation> {
        let ranges = self.tracking.ranges();

        let innermost = ranges
            .iter()
            .filter(|r| r.contains(generated_line))
            .min_by_key(|r| r.generated.len());
        if let Some(range) = innermost {
            let mut location = range.template.clone();
            if range.verbatim {
                location.line += generated_line - range.generated.start;
            }
            return Some(location);
        }

        // Closest preceding range first, then the first following one.
        let preceding = ranges
            .iter()
            .filter(|r| r.generated.start <= generated_line)
            .min_by_key(|r| r.distance(generated_line));
        let nearest = preceding.or_else(|| ranges.iter().min_by_key(|r| r.generated.start));
        nearest.map(|r| r.template.clone())
    }
}
