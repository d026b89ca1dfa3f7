//! Progress reporting for a run (pairs done, elapsed, estimated runtime).
//!
//! The dispatch loop prints one line per launch in verbose mode and redraws a
//! compact view of the device queue while it waits for free slots.

use std::time::Duration;

use crate::job::JobUid;

/// Snapshot of run progress (CLI-friendly).
#[derive(Debug, Clone, Default)]
pub struct ProgressStats {
    pub total_pairs: usize,
    /// Pairs not yet launched (including resubmitted ones).
    pub pending: usize,
    /// Jobs currently holding a device slot.
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Elapsed time since dispatch started (seconds).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Pairs that have left both the pending list and the device queue.
    pub fn finished(&self) -> usize {
        self.total_pairs
            .saturating_sub(self.pending)
            .saturating_sub(self.running)
    }

    /// Estimated total runtime: elapsed scaled by total / finished.
    /// Before anything finishes, the divisor is clamped to 1.
    pub fn estimated_total_secs(&self) -> f64 {
        let done = self.finished().max(1);
        self.elapsed_secs * self.total_pairs as f64 / done as f64
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_pairs == 0 {
            return 1.0;
        }
        (self.finished() as f64 / self.total_pairs as f64).min(1.0)
    }
}

/// `H:MM:SS`
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Device queue as `uid uid|uid|` with devices separated by `|`.
pub fn render_queue(snapshot: &[(String, Vec<JobUid>)]) -> String {
    snapshot
        .iter()
        .map(|(_, uids)| {
            uids.iter()
                .map(|u| u.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("|")
}
