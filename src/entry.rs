use std::path::{Path, PathBuf};

/// One filesystem object discovered by the walker, as broadcast to matchers.
///
/// `name` is the final path component, kept separately so matchers never
/// have to re-split the path. Non-UTF-8 names are converted lossily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The entry's file name.
    pub name: String,

    /// Full path to the entry, as reconstructed by the walker.
    pub path: PathBuf,
}

impl Entry {
    /// Build an entry from a discovered path.
    ///
    /// A path without a final component (`/`, `..`) uses the whole path as
    /// its name.
    pub fn from_path(path: &Path) -> Self {
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None    => path.to_string_lossy().into_owned(),
        };
        Self {
            name,
            path: path.to_path_buf(),
        }
    }
}
