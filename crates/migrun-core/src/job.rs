//! Job identity, task pairs, and the job state machine.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Unique id of one job incarnation. Assigned monotonically; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobUid(u64);

impl JobUid {
    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobUid {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(JobUid)
    }
}

/// Hands out uids 1, 2, 3, ... for the lifetime of a run.
#[derive(Debug)]
pub struct UidAllocator {
    next: u64,
}

impl Default for UidAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl UidAllocator {
    pub fn next_uid(&mut self) -> JobUid {
        let uid = JobUid(self.next);
        self.next += 1;
        uid
    }
}

/// 1-based position of a (query, target) pair in generation order.
/// Names the partial output file, so every incarnation of a pair writes the same part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartIndex(pub usize);

impl fmt::Display for PartIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One query chunk paired with one target chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPair {
    pub part: PartIndex,
    pub query: PathBuf,
    pub target: PathBuf,
}

/// Why a job incarnation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient device memory / driver condition (`mem_err`).
    Memory,
    /// Any other fatal marker in the worker's stderr (`other_err`).
    Other,
    /// Worker exited without a fatal marker but never wrote its completion marker.
    Unsignaled,
    /// Killed while tearing down an aborted run.
    Aborted,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Memory => "mem_err",
            FailureKind::Other => "other_err",
            FailureKind::Unsignaled => "unsignaled",
            FailureKind::Aborted => "aborted",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job state: `Pending -> Running -> CompletedSuccess | CompletedFailure`.
/// A job is `Pending` from uid assignment until its worker has spawned.
/// A `mem_err` failure is terminal for its uid; the pair re-enters as a new job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    CompletedSuccess,
    CompletedFailure(FailureKind),
    /// Not launched because its part already exists (`--only-missing`).
    Skipped,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running)
    }
}

/// Scheduler-side record of one job incarnation.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub uid: JobUid,
    pub pair: TaskPair,
    pub device: String,
    /// 1-based attempt number of this pair.
    pub attempt: u32,
    pub state: JobState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uids_are_monotonic_and_unique() {
        let mut alloc = UidAllocator::default();
        let a = alloc.next_uid();
        let b = alloc.next_uid();
        let c = alloc.next_uid();
        assert_eq!(a, JobUid::new(1));
        assert!(a < b && b < c);
    }

    #[test]
    fn uid_display_and_parse() {
        let uid = JobUid::new(42);
        assert_eq!(uid.to_string(), "42");
        assert_eq!("42".parse::<JobUid>().unwrap(), uid);
        assert!("x42".parse::<JobUid>().is_err());
        assert!("-1".parse::<JobUid>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::CompletedSuccess.is_terminal());
        assert!(JobState::CompletedFailure(FailureKind::Memory).is_terminal());
        assert!(JobState::Skipped.is_terminal());
    }
}
