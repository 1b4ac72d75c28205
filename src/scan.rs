//! Wires one walker, N matchers, a control reader and a dump timer together.
//!
//! ```text
//!                 ┌─► matcher-0 ─┐
//! walker ─► chan ─┼─► matcher-1 ─┼─► ResultBuffer ─► dump ─► output
//!                 └─► matcher-N ─┘                    ▲
//!                                 control (dump/exit) ┘
//! ```
//!
//! The walker runs on the calling thread and is the only producer. Everything
//! else runs on named scoped threads that end once the scan is finished or
//! stopped.

use std::io::{self, BufRead, BufReader, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};

use crate::channel::{BroadcastChannel, Receiver};
use crate::entry::Entry;
use crate::error::FindError;
use crate::input::{CancelSignal, InterruptibleInput};
use crate::results::{ResultBuffer, ScanResult, ScanSummary};
use crate::traits::Visitor;
use crate::walker::{BoundedWalker, WalkConfig};

/// How often accumulated matches are printed without being asked.
pub const DEFAULT_DUMP_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// ScanState
// ---------------------------------------------------------------------------

/// Where a scan is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    /// The walk completed normally.
    Finished,
    /// The user asked to abort.
    Stopped,
}

/// Lifecycle flag shared by every worker of one scan.
///
/// Leaves `Running` exactly once, through a compare-and-set, so a completion
/// racing an `exit` has a single winner.
#[derive(Debug)]
pub struct ScanState(AtomicU8);

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanState {
    pub fn new() -> Self {
        Self(AtomicU8::new(Phase::Running as u8))
    }

    pub fn phase(&self) -> Phase {
        match self.0.load(Ordering::Acquire) {
            0 => Phase::Running,
            1 => Phase::Finished,
            _ => Phase::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.phase() == Phase::Stopped
    }

    /// `Running → Finished`. Returns `false` if the scan had already left
    /// `Running`.
    pub fn finish(&self) -> bool {
        self.leave_running(Phase::Finished)
    }

    /// `Running → Stopped`. Returns `false` if the scan had already left
    /// `Running`.
    pub fn stop(&self) -> bool {
        self.leave_running(Phase::Stopped)
    }

    fn leave_running(&self, to: Phase) -> bool {
        self.0
            .compare_exchange(Phase::Running as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Everything `run()` needs. Built and validated by `ScanBuilder`.
pub(crate) struct ScanOptions {
    pub root:          PathBuf,
    pub patterns:      Vec<String>,
    pub walk:          WalkConfig,
    pub dump_interval: Duration,
    pub highlight:     bool,
    pub commands:      Option<OwnedFd>,
    pub output:        Box<dyn Write + Send>,
    pub diagnostics:   Box<dyn Write + Send>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

struct Printer {
    out:       Box<dyn Write + Send>,
    highlight: bool,
}

impl Printer {
    fn print(&mut self, batch: &[ScanResult]) -> io::Result<()> {
        for r in batch {
            if self.highlight && !r.pattern.is_empty() {
                writeln!(self.out, "{}", highlight(&r.path, &r.pattern))?;
            } else {
                writeln!(self.out, "{}", r.path.display())?;
            }
        }
        self.out.flush()
    }
}

/// Render `path` with every occurrence of `pattern` in its file name set in
/// bold. The directory part is left alone.
pub fn highlight(path: &Path, pattern: &str) -> String {
    let s = path.to_string_lossy();
    if pattern.is_empty() {
        return s.into_owned();
    }
    let base = s.rfind(MAIN_SEPARATOR).map_or(0, |i| i + 1);
    let (dir, name) = s.split_at(base);
    format!("{dir}{}", name.replace(pattern, &format!("\x1b[1m{pattern}\x1b[0m")))
}

// ---------------------------------------------------------------------------
// ScanContext
// ---------------------------------------------------------------------------

struct ScanContext {
    chan:           BroadcastChannel<Entry>,
    results:        Arc<ResultBuffer>,
    state:          ScanState,
    cancel:         CancelSignal,
    dump_requested: Mutex<bool>,
    dump_ready:     Condvar,
    printer:        Mutex<Printer>,
    printed:        AtomicUsize,
}

impl ScanContext {
    /// Register a matcher for `pattern`. Done before the walk starts so no
    /// matcher misses early entries.
    fn matcher(&self, pattern: String) -> Receiver<Entry> {
        let results = Arc::clone(&self.results);
        self.chan.create_receiver(move |entry: &Entry| {
            if entry.name.contains(pattern.as_str()) {
                trace!(path = %entry.path.display(), pattern = %pattern, "match");
                results.push(ScanResult {
                    path:    entry.path.clone(),
                    pattern: pattern.clone(),
                });
            }
        })
    }

    fn signal_dump(&self) {
        *self.dump_requested.lock() = true;
        self.dump_ready.notify_all();
    }

    /// Abort: drop queued entries, discard unprinted matches, release every
    /// worker. Too late once the walk has finished.
    fn signal_stop(&self) {
        if !self.state.stop() {
            return;
        }
        info!("scan stopped on request");
        self.chan.close(true);
        self.signal_dump();
        self.cancel.raise();
    }

    /// Normal end of the walk: matchers drain what is queued.
    fn signal_complete(&self) {
        if !self.state.finish() {
            return;
        }
        self.chan.close(false);
        self.signal_dump();
        self.cancel.raise();
    }

    /// Print and forget whatever has accumulated. Prints nothing once the
    /// scan is stopped.
    fn dump(&self) {
        let batch = self.results.take();
        if batch.is_empty() || self.state.is_stopped() {
            return;
        }
        debug!(count = batch.len(), "dumping matches");
        match self.printer.lock().print(&batch) {
            Ok(()) => {
                self.printed.fetch_add(batch.len(), Ordering::Relaxed);
            }
            Err(e) => debug!(error = %e, "failed to write matches"),
        }
    }

    fn control_worker(&self, source: RawFd) {
        let input = InterruptibleInput::new(source, &self.cancel);
        let mut lines = BufReader::new(input).lines();
        while self.state.is_running() {
            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    debug!(error = %e, "command input failed");
                    break;
                }
                None => break,
            };
            match line.trim() {
                "dump" => self.signal_dump(),
                "exit" => self.signal_stop(),
                "" => {}
                other => debug!(command = other, "ignoring unknown command"),
            }
        }
        debug!("control worker done");
    }

    fn dump_worker(&self, interval: Duration) {
        while self.state.is_running() {
            {
                let mut requested = self.dump_requested.lock();
                if !*requested {
                    self.dump_ready.wait_for(&mut requested, interval);
                }
                *requested = false;
            }
            self.dump();
        }
        debug!("dump worker done");
    }
}

// ---------------------------------------------------------------------------
// Walker → channel
// ---------------------------------------------------------------------------

struct Feeder<'a, W: Write + ?Sized> {
    ctx:         &'a ScanContext,
    root:        &'a Path,
    diagnostics: &'a mut W,
}

impl<W: Write + ?Sized> Visitor for Feeder<'_, W> {
    fn process(&mut self, path: &Path) {
        self.ctx.chan.send(Entry::from_path(path));
    }

    fn error(&mut self, err: FindError) {
        let path = err.path().unwrap_or(self.root);
        debug!(path = %path.display(), error = %err, "traversal error");
        if let Err(e) = writeln!(self.diagnostics, "{}: {}", path.display(), err) {
            debug!(error = %e, "failed to write diagnostic");
        }
    }

    fn is_stopped(&self) -> bool {
        !self.ctx.state.is_running()
    }
}

// ---------------------------------------------------------------------------
// run()
// ---------------------------------------------------------------------------

fn spawn<'scope, F>(
    s: &'scope Scope<'scope, '_>,
    name: String,
    f: F,
) -> Result<ScopedJoinHandle<'scope, ()>, FindError>
where
    F: FnOnce() + Send + 'scope,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn_scoped(s, f)
        .map_err(|e| FindError::Thread(format!("{name}: {e}")))
}

fn join(handle: ScopedJoinHandle<'_, ()>) {
    let name = handle.thread().name().unwrap_or("worker").to_owned();
    if handle.join().is_err() {
        warn!(worker = %name, "worker panicked");
    }
}

struct Workers<'scope> {
    matchers: Vec<ScopedJoinHandle<'scope, ()>>,
    control:  ScopedJoinHandle<'scope, ()>,
    dump:     ScopedJoinHandle<'scope, ()>,
}

fn start_workers<'scope>(
    s: &'scope Scope<'scope, '_>,
    ctx: &'scope ScanContext,
    receivers: Vec<Receiver<Entry>>,
    source: RawFd,
    interval: Duration,
) -> Result<Workers<'scope>, FindError> {
    let mut matchers = Vec::with_capacity(receivers.len());
    for (i, rx) in receivers.into_iter().enumerate() {
        matchers.push(spawn(s, format!("matcher-{i}"), move || rx.run())?);
    }
    let control = spawn(s, "control".into(), move || ctx.control_worker(source))?;
    let dump = spawn(s, "dump".into(), move || ctx.dump_worker(interval))?;
    Ok(Workers { matchers, control, dump })
}

/// Execute one scan to completion (or until `exit`).
///
/// Called by `ScanBuilder::run()` after validating inputs.
pub(crate) fn run(opts: ScanOptions) -> Result<ScanSummary, FindError> {
    let start = Instant::now();
    let cancel = CancelSignal::new().map_err(FindError::Signal)?;

    let ctx = ScanContext {
        chan: BroadcastChannel::new(),
        results: Arc::new(ResultBuffer::new()),
        state: ScanState::new(),
        cancel,
        dump_requested: Mutex::new(false),
        dump_ready: Condvar::new(),
        printer: Mutex::new(Printer {
            out:       opts.output,
            highlight: opts.highlight,
        }),
        printed: AtomicUsize::new(0),
    };

    let receivers: Vec<_> = opts.patterns.iter().cloned().map(|p| ctx.matcher(p)).collect();
    let source = match &opts.commands {
        Some(fd) => fd.as_raw_fd(),
        None => io::stdin().as_raw_fd(),
    };
    let walker = BoundedWalker::new(opts.walk);
    let mut diagnostics = opts.diagnostics;

    info!(
        root = %opts.root.display(),
        patterns = opts.patterns.len(),
        "scan started"
    );

    let walk = thread::scope(|s| {
        let ctx = &ctx;
        let workers = match start_workers(s, ctx, receivers, source, opts.dump_interval) {
            Ok(w) => w,
            Err(e) => {
                // Release whatever did start so the scope can join it.
                ctx.signal_stop();
                return Err(e);
            }
        };

        let mut feeder = Feeder {
            ctx,
            root: &opts.root,
            diagnostics: &mut *diagnostics,
        };
        let stats = walker.scan(&opts.root, &mut feeder);
        if let Err(e) = diagnostics.flush() {
            debug!(error = %e, "failed to flush diagnostics");
        }
        ctx.signal_complete();

        for handle in workers.matchers {
            join(handle);
        }
        join(workers.control);
        join(workers.dump);
        Ok(stats)
    })?;

    ctx.dump();

    let summary = ScanSummary {
        matches: ctx.results.total(),
        printed: ctx.printed.load(Ordering::Relaxed),
        entries: walk.entries,
        errors: walk.errors,
        duration: start.elapsed(),
        stopped: ctx.state.is_stopped(),
        peak_footprint: walk.peak_footprint,
        entries_per_sec: 0,
    }
    .compute();

    info!(
        matches = summary.matches,
        printed = summary.printed,
        entries = summary.entries,
        errors = summary.errors,
        stopped = summary.stopped,
        elapsed_ms = summary.duration.as_millis() as u64,
        "scan finished"
    );
    Ok(summary)
}
