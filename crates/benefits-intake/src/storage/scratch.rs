use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StorageError;

/// Directory that holds short-lived working files (rendered PDFs, stamp
/// overlays, stamped copies). Nothing in here outlives one job execution.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            std::fs::create_dir_all(&root).map_err(|e| StorageError::CreateDirectory {
                path: root.clone(),
                source: e,
            })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A collision-resistant path inside the scratch directory. The file is
    /// not created.
    pub fn random_file_path(&self, extension: &str) -> PathBuf {
        let name = uuid::Uuid::new_v4().simple().to_string();
        if extension.is_empty() {
            self.root.join(name)
        } else {
            self.root.join(format!("{}.{}", name, extension))
        }
    }

    /// Copies `source` to a fresh random path and returns it.
    pub fn copy_in(&self, source: &Path) -> Result<PathBuf, StorageError> {
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("pdf");
        let target = self.random_file_path(extension);
        std::fs::copy(source, &target).map_err(|e| StorageError::CopyFile {
            from: source.to_path_buf(),
            to: target.clone(),
            source: e,
        })?;
        Ok(target)
    }
}

/// Removes `path` if present. Missing files are not an error.
pub fn delete_file_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            log::warn!("Failed to delete temporary file {}: {}", path.display(), e);
        }
    }
}

/// A single owned temporary file, deleted when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        delete_file_if_exists(&self.path);
    }
}

/// Tracks every temporary file produced during one execution and deletes
/// all of them on drop, including while unwinding from a panic.
#[derive(Debug, Default)]
pub struct TempFiles {
    paths: Mutex<Vec<PathBuf>>,
}

impl TempFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, path: &Path) {
        if let Ok(mut paths) = self.paths.lock() {
            if !paths.iter().any(|p| p == path) {
                paths.push(path.to_path_buf());
            }
        }
    }

    pub fn tracked(&self) -> Vec<PathBuf> {
        self.paths.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn cleanup(&self) {
        let paths = match self.paths.lock() {
            Ok(mut paths) => std::mem::take(&mut *paths),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for path in &paths {
            delete_file_if_exists(path);
        }
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        self.cleanup();
    }
}
