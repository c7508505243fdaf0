//! Classpath expansion through jar manifests.
//!
//! A jar's `META-INF/MANIFEST.MF` may declare a `Class-Path` attribute: a
//! space separated list of paths relative to the jar's own directory. Some
//! compiler APIs ignore it, so kiln expands it before configuring them.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::error::{Error, Result};

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Expand classpath entries with the transitive `Class-Path` references of
/// every jar.
///
/// Referenced entries are appended after the existing ones in declaration
/// order and are themselves expanded. Duplicates are skipped. Jars that cannot
/// be read are kept without expansion.
pub fn expand_classpath(entries: &[PathBuf]) -> Vec<PathBuf> {
    let mut expanded: Vec<PathBuf> = entries.to_vec();
    let mut seen: FxHashSet<PathBuf> = entries.iter().map(|e| normalize(e)).collect();

    let mut idx = 0;
    while idx < expanded.len() {
        let entry = expanded[idx].clone();
        idx += 1;

        if !is_jar(&entry) {
            continue;
        }

        let references = match manifest_class_path(&entry) {
            Ok(references) => references,
            Err(e) => {
                tracing::debug!("Not expanding {}: {}", entry.display(), e);
                continue;
            }
        };

        let base = entry.parent().unwrap_or(Path::new(""));
        for reference in references {
            let resolved = normalize(&base.join(&reference));
            if seen.insert(resolved.clone()) {
                tracing::debug!(
                    "Classpath {} adds {} from its manifest",
                    entry.display(),
                    resolved.display()
                );
                expanded.push(resolved);
            }
        }
    }

    expanded
}

/// Lexically resolve `.` and `..` so manifest cycles terminate.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(normalized.components().next_back(), Some(Component::Normal(_))) {
                    normalized.pop();
                } else {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

pub(crate) fn is_jar(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"))
}

/// Read the `Class-Path` entries of a jar's manifest.
///
/// Returns an empty list if the jar has no manifest or no attribute.
pub fn manifest_class_path(jar: &Path) -> Result<Vec<String>> {
    let file = File::open(jar).map_err(|e| Error::io(jar, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::Archive {
        path: jar.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut manifest = String::new();
    match archive.by_name(MANIFEST_PATH) {
        Ok(mut entry) => {
            entry
                .read_to_string(&mut manifest)
                .map_err(|e| Error::io(jar, e))?;
        }
        Err(zip::result::ZipError::FileNotFound) => return Ok(Vec::new()),
        Err(e) => {
            return Err(Error::Archive {
                path: jar.to_path_buf(),
                message: e.to_string(),
            });
        }
    }

    Ok(parse_manifest_class_path(&manifest))
}

/// Extract the main-section `Class-Path` entries from manifest text.
///
/// Continuation lines begin with a single space and are joined to the
/// previous line. The main section ends at the first blank line.
pub fn parse_manifest_class_path(manifest: &str) -> Vec<String> {
    let mut attributes: Vec<String> = Vec::new();
    for line in manifest.lines() {
        if line.is_empty() {
            break;
        }
        match (line.strip_prefix(' '), attributes.last_mut()) {
            (Some(continuation), Some(current)) => current.push_str(continuation),
            _ => attributes.push(line.to_string()),
        }
    }

    attributes
        .iter()
        .filter_map(|attribute| attribute.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("Class-Path"))
        .map(|(_, value)| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
