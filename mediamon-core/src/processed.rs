use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Append-only ledger of files already dispatched.
///
/// Entries are never evicted; the ledger lives as long as its monitor.
/// Lookups are hashed; `order` keeps first-seen order for listing.
#[derive(Debug, Clone, Default)]
pub struct ProcessedSet {
    seen: HashSet<PathBuf>,
    order: Vec<PathBuf>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.seen.contains(path)
    }

    /// Records `path`. Returns `true` if it had not been seen before.
    pub fn add(&mut self, path: PathBuf) -> bool {
        if !self.seen.insert(path.clone()) {
            return false;
        }
        self.order.push(path);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.order.iter()
    }
}
