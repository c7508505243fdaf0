//! In-memory store of compiled classes.
//!
//! The virtual package map is shared by every backend of a runtime. It is a
//! classpath source for later compiles and the authoritative copy when a
//! caller flushes classes to disk. Entries are only ever added; eviction is
//! the owning runtime's business.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::compile::{BytecodeArtifact, package_of};
use crate::error::{Error, Result};

type PackageClasses = FxHashMap<String, Arc<BytecodeArtifact>>;

/// Package name -> class name -> compiled bytes.
#[derive(Default)]
pub struct VirtualPackageMap {
    packages: RwLock<FxHashMap<String, PackageClasses>>,
}

impl VirtualPackageMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map ready to be shared across backends.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Publish all artifacts of one compile.
    ///
    /// Holds the write lock for the whole batch, so readers see either none
    /// or all of them. Existing entries with the same class name are replaced.
    pub fn commit(&self, artifacts: &[Arc<BytecodeArtifact>]) {
        let mut packages = self.packages.write();
        for artifact in artifacts {
            packages
                .entry(artifact.package.clone())
                .or_default()
                .insert(artifact.class_name.clone(), Arc::clone(artifact));
        }
        tracing::debug!("Committed {} classes to the virtual package map", artifacts.len());
    }

    /// Look up a class by package and fully qualified name.
    pub fn get(&self, package: &str, class_name: &str) -> Option<Arc<BytecodeArtifact>> {
        self.packages
            .read()
            .get(package)
            .and_then(|classes| classes.get(class_name))
            .cloned()
    }

    /// Look up a class by fully qualified name.
    pub fn lookup(&self, class_name: &str) -> Option<Arc<BytecodeArtifact>> {
        self.get(&package_of(class_name), class_name)
    }

    /// All classes of a package, sorted by class name.
    pub fn list(&self, package: &str) -> Option<Vec<Arc<BytecodeArtifact>>> {
        let packages = self.packages.read();
        let classes = packages.get(package)?;
        let mut listed: Vec<_> = classes.values().cloned().collect();
        listed.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        Some(listed)
    }

    pub fn contains_package(&self, package: &str) -> bool {
        self.packages.read().contains_key(package)
    }

    /// When the bytes of a class were produced.
    pub fn birth_time(&self, class_name: &str) -> Option<SystemTime> {
        self.lookup(class_name).map(|artifact| artifact.created)
    }

    /// Write a class's bytes to `path`, creating parent directories.
    ///
    /// Returns false if the class is not in the map.
    pub fn save(&self, class_name: &str, path: &Path) -> Result<bool> {
        let Some(artifact) = self.lookup(class_name) else {
            tracing::warn!("Class {} not found in the virtual package map", class_name);
            return Ok(false);
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(path, &artifact.bytes).map_err(|e| Error::io(path, e))?;
        tracing::debug!("Saved {} to {}", class_name, path.display());
        Ok(true)
    }

    /// Number of classes across all packages.
    pub fn len(&self) -> usize {
        self.packages.read().values().map(|classes| classes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
