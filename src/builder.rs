use std::io::{self, IsTerminal, Write};
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::FindError;
use crate::results::ScanSummary;
use crate::scan::{run, ScanOptions, DEFAULT_DUMP_INTERVAL};
use crate::walker::WalkConfig;

// ---------------------------------------------------------------------------
// ScanBuilder
// ---------------------------------------------------------------------------

/// Entry point for configuring and executing a scan.
///
/// Created via [`fanfind::scan()`](crate::scan). Configure with chained
/// builder methods, then call [`run()`](ScanBuilder::run) to execute.
///
/// # Example
///
/// ```rust,ignore
/// let summary = fanfind::scan("/var/log")
///     .pattern("error")
///     .pattern(".gz")
///     .depth_limit(64)
///     .run()?;
/// ```
pub struct ScanBuilder {
    root:          PathBuf,
    patterns:      Vec<String>,
    walk:          WalkConfig,
    dump_interval: Duration,
    highlight:     bool,
    commands:      Option<OwnedFd>,
    output:        Option<Box<dyn Write + Send>>,
    diagnostics:   Option<Box<dyn Write + Send>>,
}

impl ScanBuilder {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root:          root.into(),
            patterns:      Vec::new(),
            walk:          WalkConfig::default(),
            dump_interval: DEFAULT_DUMP_INTERVAL,
            highlight:     false,
            commands:      None,
            output:        None,
            diagnostics:   None,
        }
    }

    // ── Matching ──────────────────────────────────────────────────────────

    /// Add a substring to look for in file names. Each pattern gets its own
    /// matcher thread. Matching is case-sensitive; an empty pattern matches
    /// every entry.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Add several patterns at once.
    pub fn patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    // ── Limits ────────────────────────────────────────────────────────────

    /// Approximate memory budget, in bytes, for directories waiting to be
    /// entered. Unlimited by default.
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.walk.memory_limit = Some(bytes);
        self
    }

    /// Deepest level reported: `1` means the root's children only, and so
    /// on. Defaults to 1024.
    pub fn depth_limit(mut self, depth: usize) -> Self {
        self.walk.depth_limit = Some(depth);
        self
    }

    /// Remove the depth ceiling.
    pub fn unlimited_depth(mut self) -> Self {
        self.walk.depth_limit = None;
        self
    }

    // ── Output ────────────────────────────────────────────────────────────

    /// How often accumulated matches are printed unprompted. Defaults to 5s.
    pub fn dump_interval(mut self, interval: Duration) -> Self {
        self.dump_interval = interval;
        self
    }

    /// Emphasise the matched substring.
    ///
    /// With the default output this only takes effect when stdout is a
    /// terminal; with a custom output it is applied as requested.
    pub fn highlight(mut self, yes: bool) -> Self {
        self.highlight = yes;
        self
    }

    /// Read `dump`/`exit` commands from this descriptor instead of stdin.
    pub fn commands(mut self, fd: impl Into<OwnedFd>) -> Self {
        self.commands = Some(fd.into());
        self
    }

    /// Write matches here instead of stdout.
    pub fn output(mut self, out: impl Write + Send + 'static) -> Self {
        self.output = Some(Box::new(out));
        self
    }

    /// Write traversal errors here instead of stderr.
    pub fn diagnostics(mut self, out: impl Write + Send + 'static) -> Self {
        self.diagnostics = Some(Box::new(out));
        self
    }

    // ── Execute ───────────────────────────────────────────────────────────

    /// Execute the scan.
    ///
    /// Blocks until the walk completes and every matcher has drained, or
    /// until an `exit` command aborts it.
    ///
    /// # Errors
    ///
    /// Returns `Err` for configuration errors (no pattern, zero depth limit
    /// or dump interval) and startup failures (cancel pipe,
    /// worker threads). Traversal errors are not failures: they are written
    /// to the diagnostics stream and counted in [`ScanSummary::errors`].
    pub fn run(self) -> Result<ScanSummary, FindError> {
        if self.patterns.is_empty() {
            return Err(FindError::InvalidPattern("at least one pattern is required".into()));
        }
        if self.walk.depth_limit == Some(0) {
            return Err(FindError::InvalidConfig("depth limit must be at least 1".into()));
        }
        if self.dump_interval.is_zero() {
            return Err(FindError::InvalidConfig("dump interval must be positive".into()));
        }

        let (output, highlight): (Box<dyn Write + Send>, bool) = match self.output {
            Some(out) => (out, self.highlight),
            None => {
                let highlight = self.highlight && io::stdout().is_terminal();
                (Box::new(io::stdout()) as Box<dyn Write + Send>, highlight)
            }
        };
        let diagnostics: Box<dyn Write + Send> = match self.diagnostics {
            Some(out) => out,
            None => Box::new(io::stderr()),
        };

        run(ScanOptions {
            root: self.root,
            patterns: self.patterns,
            walk: self.walk,
            dump_interval: self.dump_interval,
            highlight,
            commands: self.commands,
            output,
            diagnostics,
        })
    }
}
