use std::path::Path;

use crate::error::FindError;

/// Receives everything a [`BoundedWalker`](crate::walker::BoundedWalker)
/// finds.
///
/// All three methods are called on the walker's own thread, so
/// implementations need no synchronisation of their own.
///
/// # Example
///
/// ```rust
/// use std::path::{Path, PathBuf};
/// use fanfind::{FindError, Visitor};
///
/// #[derive(Default)]
/// struct Collect(Vec<PathBuf>);
///
/// impl Visitor for Collect {
///     fn process(&mut self, path: &Path) {
///         self.0.push(path.to_path_buf());
///     }
/// }
/// ```
pub trait Visitor {
    /// Called once for every filesystem object below the root.
    fn process(&mut self, path: &Path);

    /// Called for every traversal problem. The walk keeps going afterwards
    /// unless the error concerns the root itself.
    fn error(&mut self, err: FindError) {
        let _ = err;
    }

    /// Polled before each directory and between entries; returning `true`
    /// ends the walk promptly.
    fn is_stopped(&self) -> bool {
        false
    }
}
