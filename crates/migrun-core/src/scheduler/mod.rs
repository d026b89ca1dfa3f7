//! Job scheduler.
//!
//! Pairs query and target chunks, dispatches one worker per pair onto devices
//! with spare capacity, watches completion markers and worker exits, and
//! resubmits transient failures:
//! chunk listing → pairs → dispatch loop → teardown → assembly.

mod dispatch;
mod launch;
mod pairs;
mod progress;
mod run;

use std::path::PathBuf;

use crate::job::{FailureKind, JobUid, PartIndex};

pub use dispatch::{Scheduler, SchedulerSettings, SkipRule};
pub use launch::WorkerLauncher;
pub use pairs::{generate_pairs, list_chunks};
pub use progress::{format_elapsed, render_queue, ProgressStats};
pub use run::{execute_run, stop_daemons};

/// How to invoke the alignment worker.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    /// Worker program (wrapper that writes the completion marker).
    pub program: String,
    /// Extra options placed before the positional chunk arguments.
    pub opts: Vec<String>,
    /// Value of `--format`.
    pub format: String,
    pub num_threads: usize,
    /// `--segment_size` value; 0 omits the flag.
    pub segment_size: i64,
}

impl Default for WorkerSpec {
    fn default() -> Self {
        Self {
            program: "run_segalign_symlink".to_string(),
            opts: Vec::new(),
            format: "maf-".to_string(),
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            segment_size: 0,
        }
    }
}

/// Everything one `migrun run` needs besides the global config.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub devices: Vec<String>,
    /// Per-device job ceilings; empty means one job per device.
    pub capacities: Vec<usize>,
    pub query_dir: PathBuf,
    pub target_dir: PathBuf,
    /// Holds partial outputs and completion markers.
    pub tmp_dir: PathBuf,
    pub output: PathBuf,
    /// Where worker logs and the command log go; defaults to `tmp_dir`.
    pub log_dir: Option<PathBuf>,
    pub worker: WorkerSpec,
    /// Root of the per-device daemon pipe directories. `None` disables daemon control.
    pub mps_pipe_dir: Option<PathBuf>,
    pub only_missing: bool,
    /// With `only_missing`, parts below this index are skipped too.
    pub start_part: usize,
    pub keep_partial: bool,
    /// Chunk files whose name contains this are ignored when listing inputs.
    pub chunk_ext_skip: String,
    pub verbose: bool,
}

impl RunOptions {
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| self.tmp_dir.clone())
    }
}

/// A pair whose last incarnation failed terminally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedJob {
    pub uid: JobUid,
    pub part: PartIndex,
    pub kind: FailureKind,
}

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total_pairs: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedJob>,
    /// `mem_err` incarnations that were pushed back onto the pending list.
    pub resubmitted: usize,
    /// Workers launched, resubmissions included. Skipped pairs do not count.
    pub incarnations: u64,
    pub skipped: usize,
    /// Uid, part and device of every launch, in launch order.
    pub assignments: Vec<(JobUid, PartIndex, String)>,
    /// Part indices with no output after the run.
    pub missing_parts: Vec<usize>,
    /// Parts concatenated into the final output.
    pub parts_combined: usize,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.missing_parts.is_empty() && self.failed.is_empty()
    }
}
