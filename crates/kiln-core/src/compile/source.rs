//! Writable sink for generated source text.
//!
//! The code generator writes through `std::fmt::Write`. Text is held in
//! memory and encoded with the requested encoding when it is flushed to
//! disk.

use std::fmt;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;

use crate::error::{Error, Result};

/// Resolve an encoding label, failing for labels kiln cannot encode to.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::UnsupportedEncoding(label.to_string()))?;
    // UTF-16 and replacement labels decode fine but cannot be produced.
    if encoding.output_encoding() != encoding {
        return Err(Error::UnsupportedEncoding(label.to_string()));
    }
    Ok(encoding)
}

/// Generated source for one unit.
pub struct SourceSink {
    path: PathBuf,
    encoding: &'static Encoding,
    text: String,
    file: Option<File>,
}

impl SourceSink {
    /// Sink that only keeps the text in memory until asked to flush.
    pub fn in_memory(path: impl Into<PathBuf>, encoding: &str) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            encoding: resolve_encoding(encoding)?,
            text: String::new(),
            file: None,
        })
    }

    /// Sink backed by a file that is created now and filled by `flush`.
    pub fn on_disk(path: impl Into<PathBuf>, encoding: &str) -> Result<Self> {
        let path = path.into();
        let encoding = resolve_encoding(encoding)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        Ok(Self {
            path,
            encoding,
            text: String::new(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Canonical name of the sink's encoding.
    pub fn encoding(&self) -> &'static str {
        self.encoding.name()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Encoded bytes of the current text.
    pub fn encoded(&self) -> Vec<u8> {
        let (bytes, _, had_unmappable) = self.encoding.encode(&self.text);
        if had_unmappable {
            tracing::warn!(
                "Source {} has characters not representable in {}",
                self.path.display(),
                self.encoding.name()
            );
        }
        bytes.into_owned()
    }

    /// Write the encoded text to the sink's path.
    ///
    /// Disk-backed sinks reuse the file opened at creation; in-memory sinks
    /// create it now.
    pub fn flush(&mut self) -> Result<()> {
        let bytes = self.encoded();
        match self.file.take() {
            Some(mut file) => {
                file.write_all(&bytes)
                    .and_then(|_| file.flush())
                    .map_err(|e| Error::io(&self.path, e))?;
            }
            None => {
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
                }
                fs::write(&self.path, &bytes).map_err(|e| Error::io(&self.path, e))?;
            }
        }
        Ok(())
    }
}

impl fmt::Write for SourceSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.text.push_str(s);
        Ok(())
    }
}

impl fmt::Debug for SourceSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSink")
            .field("path", &self.path)
            .field("encoding", &self.encoding.name())
            .field("len", &self.text.len())
            .field("on_disk", &self.file.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn test_resolve_encoding() {
        assert_eq!(resolve_encoding("utf-8").unwrap().name(), "UTF-8");
        assert_eq!(resolve_encoding("ISO-8859-1").unwrap().name(), "windows-1252");
        assert!(matches!(
            resolve_encoding("x-klingon"),
            Err(Error::UnsupportedEncoding(_))
        ));
        assert!(resolve_encoding("UTF-16LE").is_err());
    }

    #[test]
    fn test_in_memory_sink_writes_only_on_flush() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("gen").join("Foo.java");

        let mut sink = SourceSink::in_memory(&path, "UTF-8").unwrap();
        write!(sink, "class Foo {{}}").unwrap();
        assert!(!path.exists());
        assert_eq!(sink.text(), "class Foo {}");

        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "class Foo {}");
    }

    #[test]
    fn test_on_disk_sink_encodes() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("Caf.java");

        let mut sink = SourceSink::on_disk(&path, "ISO-8859-1").unwrap();
        assert!(path.exists());
        sink.push_str("// café\n");
        sink.flush().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"// caf\xe9\n");
    }

    #[test]
    fn test_on_disk_sink_reports_io_error() {
        let temp = tempfile::TempDir::new().unwrap();
        // A file where a directory is needed
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let result = SourceSink::on_disk(blocker.join("Foo.java"), "UTF-8");
        assert!(matches!(result, Err(Error::Io { .. })));
    }
}
