//! Registry of files produced by a build

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Every output file a build wrote, so callers can clean up or package them
#[derive(Debug, Clone, Default)]
pub struct FileRegistry {
    files: BTreeSet<PathBuf>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) {
        self.files.insert(path.as_ref().to_path_buf());
    }

    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> bool {
        self.files.remove(path.as_ref())
    }

    /// Swap a registered bundle path for its renamed path
    ///
    /// Returns `false` if `old` was never registered.
    pub fn replace_bundle_entry<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, old: P, new: Q) -> bool {
        if !self.remove_file(old) {
            return false;
        }
        self.files.insert(new.as_ref().to_path_buf());
        true
    }

    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        self.files.contains(path.as_ref())
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
