//! Canonical set of watched folders.

use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{MonitorError, Result};
use crate::unique_list::UniqueList;

/// Watched folders, unique after canonicalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderSet {
    folders: UniqueList<PathBuf>,
}

impl FolderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalizes and appends each path not already present. Returns the
    /// number of folders added.
    pub fn add<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize> {
        let mut added = 0;
        for path in paths {
            if self.folders.push(canonicalize(path.as_ref())?) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Removes each matching folder, keeping the others in order. Returns the
    /// number removed.
    pub fn remove<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize> {
        let mut removed = 0;
        for path in paths {
            if self.folders.remove(&canonicalize(path.as_ref())?).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Replaces the folder at `index`. Returns `false` when the canonical
    /// path is already the current value.
    pub fn change(&mut self, index: usize, new_path: &Path) -> Result<bool> {
        let len = self.folders.len();
        let current = self
            .folders
            .get(index)
            .ok_or(MonitorError::FolderIndexOutOfRange { index, len })?;

        let canonical = canonicalize(new_path)?;
        if *current == canonical {
            return Ok(false);
        }
        self.folders.replace(index, canonical);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.folders.iter()
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        self.folders.as_slice()
    }
}

/// Resolves `path` to a canonical absolute path.
///
/// Existing paths go through `fs::canonicalize`. Paths that do not exist yet
/// are made absolute against the working directory and lexically normalized.
pub fn canonicalize(path: &Path) -> Result<PathBuf> {
    if let Ok(resolved) = fs::canonicalize(path) {
        return Ok(resolved);
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };
    Ok(normalize_lexically(&absolute))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
