//! Command-line configuration.
//!
//! Parsing uses clap derive; [`CliArgs::into_builder`] turns the parsed
//! arguments into a [`ScanBuilder`].

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::builder::ScanBuilder;
use crate::walker::DEFAULT_DEPTH_LIMIT;

/// Find files whose names contain any of the given substrings.
///
/// While the scan runs, type `dump` to print matches found so far or `exit`
/// to abort.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fanfind",
    version,
    about = "Find files whose names contain any of the given substrings",
    after_help = "COMMANDS (on stdin while scanning):\n    \
        dump    print matches accumulated so far\n    \
        exit    abort the scan, discarding unprinted matches"
)]
pub struct CliArgs {
    /// Directory to scan
    #[arg(value_name = "DIR")]
    pub root: PathBuf,

    /// Substrings to look for in file names (one matcher thread each)
    #[arg(value_name = "SUBSTRING", required = true, num_args = 1..)]
    pub patterns: Vec<String>,

    /// Approximate memory budget for pending directories, in bytes
    #[arg(long, value_name = "BYTES")]
    pub memory_limit: Option<usize>,

    /// Deepest directory level to report (0 = unlimited)
    #[arg(long, default_value_t = DEFAULT_DEPTH_LIMIT, value_name = "NUM")]
    pub depth_limit: usize,

    /// Seconds between unprompted match dumps
    #[arg(long, default_value = "5", value_name = "SECS")]
    pub interval: u64,

    /// Emphasise the matched substring when writing to a terminal
    #[arg(long)]
    pub highlight: bool,

    /// Verbose logging on stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl CliArgs {
    pub fn into_builder(self) -> ScanBuilder {
        let mut builder = crate::scan(self.root)
            .patterns(self.patterns)
            .dump_interval(Duration::from_secs(self.interval))
            .highlight(self.highlight);

        builder = match self.depth_limit {
            0 => builder.unlimited_depth(),
            d => builder.depth_limit(d),
        };
        if let Some(bytes) = self.memory_limit {
            builder = builder.memory_limit(bytes);
        }
        builder
    }
}
