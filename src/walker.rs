//! Iterative directory walker with soft memory and depth ceilings.
//!
//! Built to survive hostile trees:
//! - very deep hierarchies: no recursion, pending directories live on an
//!   explicit stack, and no directory handle is held open across iterations
//! - very wide hierarchies with long names: a pending directory stores only
//!   its own name plus a shared link to its parent, the full path is rebuilt
//!   when the directory is expanded
//!
//! The ceilings are approximate. They stop the frontier from growing, they
//! never hide entries that were already listed.

use std::cell::{Cell, OnceCell};
use std::ffi::OsString;
use std::fs::{self, DirEntry};
use std::mem;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::FindError;
use crate::traits::Visitor;

/// Default depth ceiling.
pub const DEFAULT_DEPTH_LIMIT: usize = 1024;

// ---------------------------------------------------------------------------
// WalkConfig
// ---------------------------------------------------------------------------

/// Resource ceilings for one walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkConfig {
    /// Approximate byte budget for pending directories. `None` is unlimited.
    pub memory_limit: Option<usize>,

    /// Deepest level reported. Root children are level 1; directories at
    /// this level are reported but not entered. `None` is unlimited.
    pub depth_limit: Option<usize>,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            memory_limit: None,
            depth_limit:  Some(DEFAULT_DEPTH_LIMIT),
        }
    }
}

/// What one walk did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Entries passed to `Visitor::process`.
    pub entries: usize,

    /// Directories whose children were listed, including the root.
    pub dirs_expanded: usize,

    /// Errors passed to `Visitor::error`.
    pub errors: usize,

    /// High-water mark of the frontier footprint, in bytes.
    pub peak_footprint: usize,
}

// ---------------------------------------------------------------------------
// Frontier nodes
// ---------------------------------------------------------------------------

/// Live byte cost of all frontier nodes. Owned by one walk, single-threaded.
#[derive(Default)]
struct Footprint {
    live: Cell<usize>,
    peak: Cell<usize>,
}

impl Footprint {
    fn add(&self, n: usize) {
        let live = self.live.get() + n;
        self.live.set(live);
        self.peak.set(self.peak.get().max(live));
    }

    fn sub(&self, n: usize) {
        self.live.set(self.live.get().saturating_sub(n));
    }
}

/// A directory that has been discovered but not necessarily expanded.
struct Node<'f> {
    name:      OsString,
    parent:    Option<Rc<Node<'f>>>,
    level:     usize,
    path:      OnceCell<PathBuf>,
    footprint: &'f Footprint,
}

impl<'f> Node<'f> {
    fn new(footprint: &'f Footprint, name: OsString, parent: Option<Rc<Node<'f>>>) -> Self {
        footprint.add(mem::size_of::<Self>() + name.len());
        let level = parent.as_ref().map_or(0, |p| p.level + 1);
        Self {
            name,
            parent,
            level,
            path: OnceCell::new(),
            footprint,
        }
    }

    /// Full path, built from the nearest ancestor that already knows its own
    /// and cached from then on.
    fn path(&self) -> &Path {
        if let Some(p) = self.path.get() {
            return p;
        }
        let mut names = vec![self.name.as_os_str()];
        let mut base: Option<&Path> = None;
        let mut cur = self.parent.as_deref();
        while let Some(node) = cur {
            if let Some(p) = node.path.get() {
                base = Some(p);
                break;
            }
            names.push(node.name.as_os_str());
            cur = node.parent.as_deref();
        }

        let mut full = base.map(Path::to_path_buf).unwrap_or_default();
        for name in names.iter().rev() {
            full.push(name);
        }
        self.footprint.add(full.as_os_str().len());
        self.path.get_or_init(|| full)
    }
}

impl Drop for Node<'_> {
    fn drop(&mut self) {
        let mut cost = mem::size_of::<Self>() + self.name.len();
        if let Some(p) = self.path.get() {
            cost += p.as_os_str().len();
        }
        self.footprint.sub(cost);

        // Unlink the parent chain by hand so a deep chain is released in a
        // loop instead of one nested drop per level.
        let mut next = self.parent.take();
        while let Some(rc) = next {
            match Rc::try_unwrap(rc) {
                Ok(mut node) => next = node.parent.take(),
                Err(_) => break,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// BoundedWalker
// ---------------------------------------------------------------------------

/// Depth-first, stack-based directory walker.
///
/// Sibling order follows whatever the OS returns for each directory; the
/// subdirectories of one directory are entered in reverse discovery order.
#[derive(Debug, Clone, Default)]
pub struct BoundedWalker {
    config: WalkConfig,
}

impl BoundedWalker {
    pub fn new(config: WalkConfig) -> Self {
        Self { config }
    }

    /// Walk everything below `root`, reporting to `visitor`.
    ///
    /// A root that is not a directory is processed on its own; a missing
    /// root is reported as [`FindError::NotFound`] and nothing else happens.
    pub fn scan<V: Visitor + ?Sized>(&self, root: &Path, visitor: &mut V) -> WalkStats {
        self.walk(root, visitor, &Footprint::default())
    }

    fn walk<V: Visitor + ?Sized>(
        &self,
        root: &Path,
        visitor: &mut V,
        footprint: &Footprint,
    ) -> WalkStats {
        let mut stats = WalkStats::default();

        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                visitor.process(root);
                stats.entries = 1;
                return stats;
            }
            Err(e) => {
                let err = if e.kind() == std::io::ErrorKind::NotFound {
                    FindError::NotFound(root.to_path_buf())
                } else {
                    FindError::io(root, e)
                };
                visitor.error(err);
                stats.errors = 1;
                return stats;
            }
        }

        let mut stack = vec![Rc::new(Node::new(footprint, root.as_os_str().to_owned(), None))];

        while !visitor.is_stopped() {
            let Some(dir) = stack.pop() else { break };
            stats.dirs_expanded += 1;
            self.expand(&dir, &mut stack, footprint, visitor, &mut stats);
        }

        // Whatever is still pending (early stop) is released while the
        // footprint is still borrowed.
        drop(stack);
        stats.peak_footprint = footprint.peak.get();
        debug!(
            root = %root.display(),
            entries = stats.entries,
            dirs = stats.dirs_expanded,
            errors = stats.errors,
            peak_footprint = stats.peak_footprint,
            "walk finished"
        );
        stats
    }

    /// List one directory: process every child, push subdirectories while
    /// the ceilings allow it.
    fn expand<'f, V: Visitor + ?Sized>(
        &self,
        dir: &Rc<Node<'f>>,
        stack: &mut Vec<Rc<Node<'f>>>,
        footprint: &'f Footprint,
        visitor: &mut V,
        stats: &mut WalkStats,
    ) {
        let dir_path = dir.path();
        trace!(dir = %dir_path.display(), level = dir.level, "expanding");

        let entries = match fs::read_dir(dir_path) {
            Ok(entries) => entries,
            Err(e) => {
                visitor.error(FindError::io(dir_path, e));
                stats.errors += 1;
                return;
            }
        };

        let mut grow = true;
        for entry in entries {
            if visitor.is_stopped() {
                return;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    visitor.error(FindError::io(dir_path, e));
                    stats.errors += 1;
                    return;
                }
            };

            visitor.process(&entry.path());
            stats.entries += 1;

            if !grow || !is_dir(&entry) {
                continue;
            }

            if let Some(limit) = self.config.memory_limit {
                if footprint.live.get() > limit {
                    debug!(dir = %dir_path.display(), footprint = footprint.live.get(), "memory ceiling hit");
                    visitor.error(FindError::MemoryLimit { path: dir_path.to_path_buf(), limit });
                    stats.errors += 1;
                    grow = false;
                    continue;
                }
            }
            if let Some(limit) = self.config.depth_limit {
                if dir.level + 1 >= limit {
                    debug!(dir = %dir_path.display(), level = dir.level, "depth ceiling hit");
                    visitor.error(FindError::DepthLimit { path: dir_path.to_path_buf(), limit });
                    stats.errors += 1;
                    grow = false;
                    continue;
                }
            }

            stack.push(Rc::new(Node::new(footprint, entry.file_name(), Some(Rc::clone(dir)))));
        }
    }
}

/// Directory check that never follows symlinks.
fn is_dir(entry: &DirEntry) -> bool {
    match entry.file_type() {
        Ok(ft) => ft.is_dir(),
        Err(_) => fs::symlink_metadata(entry.path())
            .map(|m| m.is_dir())
            .unwrap_or(false),
    }
}
