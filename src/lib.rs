//! # fanfind
//!
//! Concurrent file finder: one walker, many matchers, a broadcast channel in
//! between.
//!
//! The walker lists a directory tree on the calling thread and sends every
//! `(name, path)` it finds into a [`BroadcastChannel`]. Each substring gets its
//! own matcher thread with its own copy of the stream. Matches pile up in a
//! shared buffer that a timer thread prints every few seconds, and a control
//! thread reads `dump` / `exit` from stdin while the scan runs.
//!
//! The building blocks are public and usable on their own:
//!
//! - [`BroadcastChannel`]: multicast queue with per-receiver backlogs,
//!   graceful and abandon close
//! - [`BoundedWalker`]: non-recursive walker with soft memory and depth
//!   ceilings
//! - [`InterruptibleInput`]: a blocking reader another thread can cancel
//!
//! # Quick Start
//!
//! ```rust,no_run
//! let summary = fanfind::scan("/var/log")
//!     .pattern(".log")
//!     .pattern(".gz")
//!     .run()
//!     .unwrap();
//!
//! eprintln!("{} matches in {:.3}s", summary.matches, summary.duration.as_secs_f64());
//! ```
//!
//! # Walking on your own
//!
//! ```rust
//! use std::path::{Path, PathBuf};
//! use fanfind::{BoundedWalker, FindError, Visitor, WalkConfig};
//!
//! #[derive(Default)]
//! struct Collect {
//!     paths:  Vec<PathBuf>,
//!     errors: Vec<FindError>,
//! }
//!
//! impl Visitor for Collect {
//!     fn process(&mut self, path: &Path) {
//!         self.paths.push(path.to_path_buf());
//!     }
//!     fn error(&mut self, err: FindError) {
//!         self.errors.push(err);
//!     }
//! }
//!
//! let dir = std::env::temp_dir();
//! let mut visitor = Collect::default();
//! let stats = BoundedWalker::new(WalkConfig { depth_limit: Some(1), ..Default::default() })
//!     .scan(&dir, &mut visitor);
//! assert_eq!(stats.entries, visitor.paths.len());
//! ```

#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod input;
pub mod walker;

mod builder;
mod entry;
mod error;
mod results;
mod scan;
mod traits;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use builder::ScanBuilder;
pub use channel::{BroadcastChannel, Receiver, ReceiverId};
pub use entry::Entry;
pub use error::FindError;
pub use input::{CancelSignal, InterruptibleInput};
pub use results::{ResultBuffer, ScanResult, ScanSummary};
pub use scan::{highlight, Phase, ScanState, DEFAULT_DUMP_INTERVAL};
pub use traits::Visitor;
pub use walker::{BoundedWalker, WalkConfig, WalkStats};

// ── Entry point ───────────────────────────────────────────────────────────────

/// Create a new [`ScanBuilder`] for the tree under `root`.
///
/// # Example
///
/// ```rust
/// use std::fs;
///
/// let dir = tempfile::tempdir().unwrap();
/// fs::write(dir.path().join("invoice.txt"), "").unwrap();
/// fs::write(dir.path().join("report.txt"), "").unwrap();
///
/// // Commands come from a pipe whose writer is already gone: no `dump`, no `exit`.
/// let (commands, _) = fanfind::input::pipe().unwrap();
///
/// let summary = fanfind::scan(dir.path())
///     .pattern("invoice")
///     .commands(commands)
///     .output(std::io::sink())
///     .run()
///     .unwrap();
///
/// assert_eq!(summary.matches, 1);
/// ```
pub fn scan(root: impl Into<std::path::PathBuf>) -> ScanBuilder {
    ScanBuilder::new(root)
}
