//! Extension rules that decide which new files trigger a program.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{MonitorError, Result};
use crate::unique_list::UniqueList;

/// Default extensions offered for media conversion rules.
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".avi", ".mov", ".webm", ".flv", ".wmv", ".m4v", ".mpg",
    ".mpeg",
];

/// Why a filter failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("program not found: {0}")]
    ProgramMissing(PathBuf),

    #[error("program is not a regular file: {0}")]
    NotRegularFile(PathBuf),

    #[error("program is not executable: {0}")]
    NotExecutable(PathBuf),

    #[error("malformed extension {0:?}: must start with '.' and not be '.' or '..'")]
    MalformedExtension(String),
}

/// A program (with any fixed arguments) and the extensions it handles.
///
/// Two filters are equal when both the program and the extension sequence
/// match element-wise, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub program: String,
    pub extensions: UniqueList<String>,
}

impl Filter {
    pub fn new<I, S>(program: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the last path component of `filename` ends in one of this
    /// filter's extensions. Comparison is exact and case-sensitive.
    pub fn matches(&self, filename: impl AsRef<Path>) -> bool {
        let Some(extension) = file_extension(filename.as_ref()) else {
            return false;
        };
        self.extensions.iter().any(|ext| ext == extension)
    }

    /// Path of the executable, i.e. the first word of `program`.
    pub fn program_path(&self) -> &Path {
        Path::new(self.program.split_whitespace().next().unwrap_or(""))
    }

    /// Checks the program and every extension, reporting the first problem.
    pub fn validate(&self) -> std::result::Result<(), FilterError> {
        let program = self.program_path();
        let metadata = fs::metadata(program)
            .map_err(|_| FilterError::ProgramMissing(program.to_path_buf()))?;
        if !metadata.is_file() {
            return Err(FilterError::NotRegularFile(program.to_path_buf()));
        }
        if !is_executable(&metadata) {
            return Err(FilterError::NotExecutable(program.to_path_buf()));
        }

        if let Some(bad) = self.extensions.iter().find(|ext| !extension_is_valid(ext))
        {
            return Err(FilterError::MalformedExtension(bad.clone()));
        }
        Ok(())
    }

    /// Advisory validity check. Not enforced when filters are added.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Suffix from the last `.` of `path`, provided it lies in the final
/// component.
pub fn file_extension(path: &Path) -> Option<&str> {
    let name = path.to_str()?;
    let dot = name.rfind('.')?;
    let extension = &name[dot..];
    if extension.contains('/') {
        return None;
    }
    Some(extension)
}

fn extension_is_valid(extension: &str) -> bool {
    extension.starts_with('.') && extension != "." && extension != ".."
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}

/// Filters in insertion order, unique by program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `filter` unless one with the same program exists. Returns
    /// `true` when the set grew.
    pub fn add(&mut self, filter: Filter) -> bool {
        if self.contains_program(&filter.program) {
            return false;
        }
        self.filters.push(filter);
        true
    }

    /// Replaces the filter at `index` wholesale and returns the old one.
    /// Any other filter with the same program is dropped, so the set stays
    /// unique by program.
    pub fn change(&mut self, index: usize, filter: Filter) -> Result<Filter> {
        let len = self.filters.len();
        let slot = self
            .filters
            .get_mut(index)
            .ok_or(MonitorError::FilterIndexOutOfRange { index, len })?;
        let old = std::mem::replace(slot, filter);

        let program = &self.filters[index].program;
        let duplicate = self
            .filters
            .iter()
            .enumerate()
            .position(|(i, f)| i != index && f.program == *program);
        if let Some(duplicate) = duplicate {
            self.filters.remove(duplicate);
        }
        Ok(old)
    }

    /// Removes the filter whose program equals `program`.
    pub fn remove(&mut self, program: &str) -> Option<Filter> {
        let index = self.filters.iter().position(|f| f.program == program)?;
        Some(self.filters.remove(index))
    }

    pub fn contains_program(&self, program: &str) -> bool {
        self.filters.iter().any(|f| f.program == program)
    }

    /// Whether any filter accepts `filename`.
    pub fn matches_any(&self, filename: &Path) -> bool {
        self.filters.iter().any(|f| f.matches(filename))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.filters.iter()
    }

    pub fn as_slice(&self) -> &[Filter] {
        &self.filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    fn txt_filter() -> Filter {
        Filter::new("/bin/echo", [".txt"])
    }

    #[test]
    fn matches_exact_extension_only() {
        let filter = Filter::new("/bin/echo", [".txt", ".md"]);
        assert!(filter.matches("/tmp/watch/a.txt"));
        assert!(filter.matches("note.md"));
        assert!(!filter.matches("/tmp/watch/a.jpg"));
        assert!(!filter.matches("/tmp/watch/a.TXT"));
        assert!(!filter.matches("/tmp/watch/archive.txt.gz"));
    }

    #[test]
    fn extension_must_be_in_last_component() {
        let filter = txt_filter();
        assert!(!filter.matches("/tmp/dir.txt/readme"));
        assert!(!filter.matches("/tmp/watch/noext"));
        assert_eq!(file_extension(Path::new("/a.b/c")), None);
        assert_eq!(file_extension(Path::new("/a/c.tar.gz")), Some(".gz"));
    }

    #[test]
    fn validate_rejects_missing_program() {
        let filter = Filter::new("/definitely/not/here", [".txt"]);
        assert!(matches!(
            filter.validate(),
            Err(FilterError::ProgramMissing(_))
        ));
        assert!(!filter.is_valid());
    }

    #[test]
    fn validate_rejects_directory_program() {
        let dir = tempdir().unwrap();
        let filter =
            Filter::new(dir.path().to_string_lossy().to_string(), [".txt"]);
        assert!(matches!(
            filter.validate(),
            Err(FilterError::NotRegularFile(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn validate_checks_executable_bit_and_extensions() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let script = dir.path().join("convert.sh");
        let mut file = fs::File::create(&script).unwrap();
        writeln!(file, "#!/bin/sh\nexit 0").unwrap();
        drop(file);

        let program = format!("{} --fast", script.display());
        let filter = Filter::new(program.clone(), [".mkv"]);
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644))
            .unwrap();
        assert!(matches!(
            filter.validate(),
            Err(FilterError::NotExecutable(_))
        ));

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
            .unwrap();
        assert!(filter.is_valid());

        for bad in [".", "..", "mkv"] {
            let filter = Filter::new(program.clone(), [".mkv", bad]);
            assert_eq!(
                filter.validate(),
                Err(FilterError::MalformedExtension(bad.to_string()))
            );
        }
    }

    #[test]
    fn add_is_keyed_by_program() {
        let mut set = FilterSet::new();
        assert!(set.add(txt_filter()));
        assert!(!set.add(txt_filter()));
        assert!(!set.add(Filter::new("/bin/echo", [".md"])));
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0], txt_filter());
    }

    #[test]
    fn change_out_of_range_errors() {
        let mut set = FilterSet::new();
        set.add(txt_filter());
        let err = set.change(3, txt_filter()).unwrap_err();
        assert!(matches!(
            err,
            MonitorError::FilterIndexOutOfRange { index: 3, len: 1 }
        ));

        let old = set.change(0, Filter::new("/bin/cat", [".log"])).unwrap();
        assert_eq!(old, txt_filter());
        assert_eq!(set.as_slice()[0].program, "/bin/cat");
    }

    #[test]
    fn change_to_an_existing_program_drops_the_other_slot() {
        let mut set = FilterSet::new();
        set.add(Filter::new("a", [".a"]));
        set.add(Filter::new("b", [".b"]));
        set.add(Filter::new("c", [".c"]));

        set.change(0, Filter::new("c", [".txt"])).unwrap();
        let programs: Vec<_> = set.iter().map(|f| f.program.as_str()).collect();
        assert_eq!(programs, ["c", "b"]);
        assert_eq!(set.as_slice()[0].extensions.as_slice(), [".txt"]);
    }

    #[test]
    fn remove_preserves_order() {
        let mut set = FilterSet::new();
        set.add(Filter::new("a", [".a"]));
        set.add(Filter::new("b", [".b"]));
        set.add(Filter::new("c", [".c"]));
        assert!(set.remove("b").is_some());
        assert!(set.remove("missing").is_none());
        let programs: Vec<_> = set.iter().map(|f| f.program.as_str()).collect();
        assert_eq!(programs, ["a", "c"]);
    }
}
