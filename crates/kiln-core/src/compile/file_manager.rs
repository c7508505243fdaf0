//! File managers for the in-process compiler API.
//!
//! The compiler reads classes and writes its output through a
//! [`FileManager`]. [`StandardFileManager`] serves directories and jars from
//! disk; [`MemoryFileManager`] wraps another manager and keeps compiled
//! classes in memory, serving the reserved namespace from the
//! [`VirtualPackageMap`].

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::packages::VirtualPackageMap;

use super::classpath::is_jar;
use super::types::{BytecodeArtifact, class_relative_path, is_in_namespace, package_of};

/// Where a file manager looks for or places files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    ClassPath,
    ClassOutput,
    SourcePath,
    PlatformClassPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Source,
    Class,
}

/// A file known to a file manager.
#[derive(Debug, Clone)]
pub enum FileObject {
    /// Plain file on disk
    File {
        path: PathBuf,
        binary_name: String,
        kind: FileKind,
    },

    /// Entry inside a jar
    Archive {
        jar: PathBuf,
        entry: String,
        binary_name: String,
    },

    /// Class held in memory
    Memory(Arc<BytecodeArtifact>),
}

impl FileObject {
    pub fn kind(&self) -> FileKind {
        match self {
            Self::File { kind, .. } => *kind,
            Self::Archive { .. } | Self::Memory(_) => FileKind::Class,
        }
    }

    /// Binary name of the class this file holds.
    pub fn binary_name(&self) -> &str {
        match self {
            Self::File { binary_name, .. } | Self::Archive { binary_name, .. } => binary_name,
            Self::Memory(artifact) => &artifact.class_name,
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }
}

/// Capability interface the compiler API works through.
pub trait FileManager: Send + Sync {
    /// Find a class or source by binary name.
    fn locate(&self, location: Location, class_name: &str, kind: FileKind)
    -> Result<Option<FileObject>>;

    /// Read a file's bytes.
    fn open_for_read(&self, file: &FileObject) -> Result<Vec<u8>>;

    /// Open an output file for a class.
    fn open_for_write(
        &self,
        location: Location,
        class_name: &str,
        kind: FileKind,
    ) -> Result<Box<dyn Write + Send + '_>>;

    /// Files of one package, optionally including subpackages.
    fn list_package(&self, location: Location, package: &str, recurse: bool)
    -> Result<Vec<FileObject>>;

    /// Binary name of a file this manager handed out.
    fn binary_name(&self, location: Location, file: &FileObject) -> Option<String>;
}

/// File manager over a classpath of directories and jars.
#[derive(Debug, Clone, Default)]
pub struct StandardFileManager {
    classpath: Vec<PathBuf>,
    source_path: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
}

impl StandardFileManager {
    pub fn new(classpath: &[PathBuf]) -> Self {
        Self {
            classpath: classpath.to_vec(),
            ..Default::default()
        }
    }

    /// Directories searched for sources.
    pub fn with_source_path(mut self, source_path: Vec<PathBuf>) -> Self {
        self.source_path = source_path;
        self
    }

    /// Directory class output is written to.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    fn roots(&self, location: Location) -> &[PathBuf] {
        match location {
            Location::ClassPath => &self.classpath,
            Location::SourcePath => &self.source_path,
            Location::ClassOutput => self.output_dir.as_slice(),
            Location::PlatformClassPath => &[],
        }
    }
}

fn extension(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Source => "java",
        FileKind::Class => "class",
    }
}

fn open_archive(jar: &Path) -> Result<zip::ZipArchive<File>> {
    let file = File::open(jar).map_err(|e| Error::io(jar, e))?;
    zip::ZipArchive::new(file).map_err(|e| Error::Archive {
        path: jar.to_path_buf(),
        message: e.to_string(),
    })
}

/// Jar entry name of a class (`a.b.C` -> `a/b/C.class`).
fn entry_name(class_name: &str) -> String {
    format!("{}.class", class_name.replace('.', "/"))
}

/// Binary name from a package-relative `.class` path.
fn binary_name_of(relative: &str) -> Option<String> {
    relative
        .strip_suffix(".class")
        .map(|stem| stem.replace(['/', '\\'], "."))
}

fn list_directory(
    root: &Path,
    dir: &Path,
    recurse: bool,
    files: &mut Vec<FileObject>,
) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(dir, e)),
    };

    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.is_dir() {
            if recurse {
                list_directory(root, &path, recurse, files)?;
            }
            continue;
        }
        let Some(relative) = path.strip_prefix(root).ok().and_then(Path::to_str) else {
            continue;
        };
        if let Some(binary_name) = binary_name_of(relative) {
            files.push(FileObject::File {
                path: path.clone(),
                binary_name,
                kind: FileKind::Class,
            });
        }
    }
    Ok(())
}

fn list_archive(jar: &Path, package: &str, recurse: bool, files: &mut Vec<FileObject>) -> Result<()> {
    let archive = open_archive(jar)?;
    let prefix = if package.is_empty() {
        String::new()
    } else {
        format!("{}/", package.replace('.', "/"))
    };

    for name in archive.file_names() {
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        if !recurse && rest.contains('/') {
            continue;
        }
        if let Some(binary_name) = binary_name_of(name) {
            files.push(FileObject::Archive {
                jar: jar.to_path_buf(),
                entry: name.to_string(),
                binary_name,
            });
        }
    }
    Ok(())
}

impl FileManager for StandardFileManager {
    fn locate(
        &self,
        location: Location,
        class_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>> {
        for root in self.roots(location) {
            if is_jar(root) {
                if kind != FileKind::Class {
                    continue;
                }
                let entry = entry_name(class_name);
                let archive = match open_archive(root) {
                    Ok(archive) => archive,
                    Err(e) => {
                        tracing::debug!("Skipping unreadable jar: {}", e);
                        continue;
                    }
                };
                if archive.index_for_name(&entry).is_some() {
                    return Ok(Some(FileObject::Archive {
                        jar: root.clone(),
                        entry,
                        binary_name: class_name.to_string(),
                    }));
                }
            } else {
                let path = root.join(class_relative_path(class_name, extension(kind)));
                if path.is_file() {
                    return Ok(Some(FileObject::File {
                        path,
                        binary_name: class_name.to_string(),
                        kind,
                    }));
                }
            }
        }
        Ok(None)
    }

    fn open_for_read(&self, file: &FileObject) -> Result<Vec<u8>> {
        match file {
            FileObject::File { path, .. } => fs::read(path).map_err(|e| Error::io(path, e)),
            FileObject::Archive { jar, entry, .. } => {
                let mut archive = open_archive(jar)?;
                let mut zipped = archive.by_name(entry).map_err(|e| Error::Archive {
                    path: jar.clone(),
                    message: e.to_string(),
                })?;
                let mut bytes = Vec::new();
                zipped
                    .read_to_end(&mut bytes)
                    .map_err(|e| Error::io(jar, e))?;
                Ok(bytes)
            }
            FileObject::Memory(artifact) => Ok(artifact.bytes.clone()),
        }
    }

    fn open_for_write(
        &self,
        location: Location,
        class_name: &str,
        kind: FileKind,
    ) -> Result<Box<dyn Write + Send + '_>> {
        let Some(root) = self.roots(location).first() else {
            return Err(Error::NotConfigured(format!(
                "no directory configured for {location:?}"
            )));
        };
        let path = root.join(class_relative_path(class_name, extension(kind)));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        Ok(Box::new(file))
    }

    fn list_package(
        &self,
        location: Location,
        package: &str,
        recurse: bool,
    ) -> Result<Vec<FileObject>> {
        let mut files = Vec::new();
        for root in self.roots(location) {
            if is_jar(root) {
                if let Err(e) = list_archive(root, package, recurse, &mut files) {
                    tracing::debug!("Skipping unreadable jar: {}", e);
                }
            } else {
                let dir = root.join(package.replace('.', "/"));
                list_directory(root, &dir, recurse, &mut files)?;
            }
        }
        Ok(files)
    }

    fn binary_name(&self, _location: Location, file: &FileObject) -> Option<String> {
        Some(file.binary_name().to_string())
    }
}

/// Keeps class output in memory and serves the reserved namespace from the
/// virtual package map.
///
/// Classes written during a compile are staged, not published; the caller
/// decides whether to commit them with [`MemoryFileManager::take_outputs`].
pub struct MemoryFileManager {
    delegate: Box<dyn FileManager>,
    packages: Arc<VirtualPackageMap>,
    reserved_package: String,
    staged: Mutex<Vec<Arc<BytecodeArtifact>>>,
}

impl MemoryFileManager {
    pub fn new(
        delegate: Box<dyn FileManager>,
        packages: Arc<VirtualPackageMap>,
        reserved_package: impl Into<String>,
    ) -> Self {
        Self {
            delegate,
            packages,
            reserved_package: reserved_package.into(),
            staged: Mutex::new(Vec::new()),
        }
    }

    /// Take the classes written so far, in write order.
    pub fn take_outputs(&self) -> Vec<Arc<BytecodeArtifact>> {
        std::mem::take(&mut *self.staged.lock())
    }

    fn serves(&self, location: Location, package: &str) -> bool {
        location == Location::ClassPath && is_in_namespace(package, &self.reserved_package)
    }
}

/// Output buffer for one class. Staged when dropped.
struct ClassBuffer<'a> {
    class_name: String,
    bytes: Vec<u8>,
    staged: &'a Mutex<Vec<Arc<BytecodeArtifact>>>,
}

impl Write for ClassBuffer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ClassBuffer<'_> {
    fn drop(&mut self) {
        let artifact = Arc::new(BytecodeArtifact::new(
            std::mem::take(&mut self.class_name),
            std::mem::take(&mut self.bytes),
        ));
        let mut staged = self.staged.lock();
        // A class written twice keeps the last bytes
        staged.retain(|a| a.class_name != artifact.class_name);
        staged.push(artifact);
    }
}

impl FileManager for MemoryFileManager {
    fn locate(
        &self,
        location: Location,
        class_name: &str,
        kind: FileKind,
    ) -> Result<Option<FileObject>> {
        if kind == FileKind::Class
            && self.serves(location, &package_of(class_name))
            && let Some(artifact) = self.packages.lookup(class_name)
        {
            return Ok(Some(FileObject::Memory(artifact)));
        }
        self.delegate.locate(location, class_name, kind)
    }

    fn open_for_read(&self, file: &FileObject) -> Result<Vec<u8>> {
        match file {
            FileObject::Memory(artifact) => Ok(artifact.bytes.clone()),
            other => self.delegate.open_for_read(other),
        }
    }

    fn open_for_write(
        &self,
        location: Location,
        class_name: &str,
        kind: FileKind,
    ) -> Result<Box<dyn Write + Send + '_>> {
        if location == Location::ClassOutput && kind == FileKind::Class {
            tracing::trace!("Buffering output for {}", class_name);
            return Ok(Box::new(ClassBuffer {
                class_name: class_name.to_string(),
                bytes: Vec::new(),
                staged: &self.staged,
            }));
        }
        self.delegate.open_for_write(location, class_name, kind)
    }

    fn list_package(
        &self,
        location: Location,
        package: &str,
        recurse: bool,
    ) -> Result<Vec<FileObject>> {
        if self.serves(location, package)
            && let Some(classes) = self.packages.list(package)
        {
            return Ok(classes.into_iter().map(FileObject::Memory).collect());
        }
        self.delegate.list_package(location, package, recurse)
    }

    fn binary_name(&self, location: Location, file: &FileObject) -> Option<String> {
        match file {
            FileObject::Memory(artifact) => Some(artifact.class_name.clone()),
            other => self.delegate.binary_name(location, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::SimpleFileOptions;

    fn memory_manager(packages: Arc<VirtualPackageMap>) -> MemoryFileManager {
        MemoryFileManager::new(
            Box::new(StandardFileManager::default()),
            packages,
            "kiln.generated",
        )
    }

    #[test]
    fn test_directory_classpath() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("lib/util");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Strings.class"), b"cafe").unwrap();
        fs::write(dir.join("notes.txt"), b"").unwrap();

        let manager = StandardFileManager::new(&[temp.path().to_path_buf()]);
        let found = manager
            .locate(Location::ClassPath, "lib.util.Strings", FileKind::Class)
            .unwrap()
            .unwrap();
        assert_eq!(found.binary_name(), "lib.util.Strings");
        assert_eq!(manager.open_for_read(&found).unwrap(), b"cafe");

        let listed = manager
            .list_package(Location::ClassPath, "lib.util", false)
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(manager.list_package(Location::ClassPath, "lib", false).unwrap().is_empty());
        assert_eq!(manager.list_package(Location::ClassPath, "lib", true).unwrap().len(), 1);
    }

    #[test]
    fn test_jar_classpath() {
        let temp = tempfile::TempDir::new().unwrap();
        let jar = temp.path().join("lib.jar");
        let mut writer = zip::ZipWriter::new(File::create(&jar).unwrap());
        writer
            .start_file("org/acme/Tag.class", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"tag").unwrap();
        writer.finish().unwrap();

        let manager = StandardFileManager::new(&[jar]);
        let found = manager
            .locate(Location::ClassPath, "org.acme.Tag", FileKind::Class)
            .unwrap()
            .unwrap();
        assert!(matches!(found, FileObject::Archive { .. }));
        assert_eq!(manager.open_for_read(&found).unwrap(), b"tag");

        let listed = manager
            .list_package(Location::ClassPath, "org.acme", false)
            .unwrap();
        assert_eq!(listed[0].binary_name(), "org.acme.Tag");
    }

    #[test]
    fn test_class_output_is_staged() {
        let packages = VirtualPackageMap::shared();
        let manager = memory_manager(Arc::clone(&packages));

        {
            let mut out = manager
                .open_for_write(Location::ClassOutput, "kiln.generated.Page", FileKind::Class)
                .unwrap();
            out.write_all(b"\xca\xfe").unwrap();
        }

        // Nothing is published until the caller commits
        assert!(packages.is_empty());
        let outputs = manager.take_outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].bytes, b"\xca\xfe");
        assert!(manager.take_outputs().is_empty());
    }

    #[test]
    fn test_reserved_namespace_served_from_map() {
        let packages = VirtualPackageMap::shared();
        packages.commit(&[Arc::new(BytecodeArtifact::new("kiln.generated.Header", vec![1]))]);
        let manager = memory_manager(Arc::clone(&packages));

        let found = manager
            .locate(Location::ClassPath, "kiln.generated.Header", FileKind::Class)
            .unwrap()
            .unwrap();
        assert!(found.is_memory());
        assert_eq!(
            manager.binary_name(Location::ClassPath, &found).as_deref(),
            Some("kiln.generated.Header")
        );

        let listed = manager
            .list_package(Location::ClassPath, "kiln.generated", false)
            .unwrap();
        assert_eq!(listed.len(), 1);

        // Outside the namespace the delegate answers
        assert!(
            manager
                .locate(Location::ClassPath, "other.Header", FileKind::Class)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_write_without_output_dir() {
        let manager = StandardFileManager::default();
        let result = manager.open_for_write(Location::ClassOutput, "a.B", FileKind::Class);
        assert!(matches!(result, Err(Error::NotConfigured(_))));
    }
}
