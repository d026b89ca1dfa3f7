//! Process supervisor: owns every worker process of a run.
//!
//! Tracks live workers by uid, detects termination without blocking, captures
//! both output streams, and classifies failures from stderr. Reaped workers
//! leave a small `FinishedProcess` record behind so eager reaping (to bound
//! open pipes) never hides a failure from the dispatch loop.

mod classify;
mod command;
mod process;

use std::collections::BTreeMap;
use std::process::ExitStatus;

use crate::job::JobUid;

pub use classify::{default_rules, Classifier, ClassifyRule, ErrorClass};
pub use command::WorkerCommand;

use process::TrackedProcess;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("duplicate job uid {0}: a worker with this uid was already spawned")]
    DuplicateJob(JobUid),
    #[error("no worker tracked for uid {0}")]
    UnknownJob(JobUid),
    #[error("worker for uid {0} is still running")]
    StillRunning(JobUid),
    #[error("failed to spawn worker for uid {uid} ({program})")]
    Spawn {
        uid: JobUid,
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Exit status and classification of a reaped worker.
#[derive(Debug, Clone, Copy)]
pub struct FinishedProcess {
    pub status: Option<ExitStatus>,
    pub class: ErrorClass,
}

pub struct ProcessSupervisor {
    live: BTreeMap<JobUid, TrackedProcess>,
    finished: BTreeMap<JobUid, FinishedProcess>,
    classifier: Classifier,
    max_tracked: usize,
    stdout: String,
    stderr: String,
}

impl ProcessSupervisor {
    pub fn new(classifier: Classifier, max_tracked: usize) -> Self {
        Self {
            live: BTreeMap::new(),
            finished: BTreeMap::new(),
            classifier,
            max_tracked: max_tracked.max(1),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Launch `cmd` as the worker for `uid`. Returns the OS pid.
    ///
    /// When the live set is at the ceiling, finished workers are reaped first.
    pub async fn spawn(&mut self, uid: JobUid, cmd: &WorkerCommand) -> Result<u32, SupervisorError> {
        if self.live.contains_key(&uid) || self.finished.contains_key(&uid) {
            return Err(SupervisorError::DuplicateJob(uid));
        }
        if self.live.len() >= self.max_tracked {
            let n = self.reap_finished().await;
            tracing::debug!(reaped = n, live = self.live.len(), "tracked process ceiling reached");
        }
        let proc = TrackedProcess::spawn(cmd).map_err(|source| SupervisorError::Spawn {
            uid,
            program: cmd.program.clone(),
            source,
        })?;
        let pid = proc.pid().unwrap_or(0);
        tracing::debug!(uid = %uid, pid, "adding process");
        self.live.insert(uid, proc);
        Ok(pid)
    }

    /// Among `uids`, those whose worker has terminated. Never blocks.
    pub fn poll_finished(&mut self, uids: &[JobUid]) -> Vec<JobUid> {
        let mut done = Vec::new();
        for &uid in uids {
            if self.finished.contains_key(&uid) {
                done.push(uid);
                continue;
            }
            let Some(proc) = self.live.get_mut(&uid) else {
                continue;
            };
            match proc.has_exited() {
                Ok(true) => done.push(uid),
                Ok(false) => {}
                Err(e) => tracing::warn!(uid = %uid, "exit check failed: {}", e),
            }
        }
        done
    }

    /// Classify a terminated worker, reaping it on first use.
    pub async fn classify(&mut self, uid: JobUid) -> Result<ErrorClass, SupervisorError> {
        if let Some(f) = self.finished.get(&uid) {
            return Ok(f.class);
        }
        let proc = self
            .live
            .get_mut(&uid)
            .ok_or(SupervisorError::UnknownJob(uid))?;
        if !proc.has_exited().unwrap_or(true) {
            return Err(SupervisorError::StillRunning(uid));
        }
        let Some(proc) = self.live.remove(&uid) else {
            return Err(SupervisorError::UnknownJob(uid));
        };
        Ok(self.reap_one(uid, proc).await.class)
    }

    /// Reaped record for `uid`, if it has been reaped.
    pub fn finished(&self, uid: JobUid) -> Option<&FinishedProcess> {
        self.finished.get(&uid)
    }

    /// Number of workers whose process has not been reaped yet.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Reap every live worker that has already exited. Returns how many were reaped.
    pub async fn reap_finished(&mut self) -> usize {
        let exited: Vec<JobUid> = self
            .live
            .iter_mut()
            .filter_map(|(uid, p)| matches!(p.has_exited(), Ok(true)).then_some(*uid))
            .collect();
        for uid in &exited {
            if let Some(proc) = self.live.remove(uid) {
                self.reap_one(*uid, proc).await;
            }
        }
        exited.len()
    }

    /// Wait for every remaining worker to exit and return all output captured during the run.
    pub async fn reap_all(&mut self) -> (String, String) {
        let live = std::mem::take(&mut self.live);
        for (uid, proc) in live {
            tracing::info!(uid = %uid, "waiting for process");
            self.reap_one(uid, proc).await;
        }
        (self.stdout.clone(), self.stderr.clone())
    }

    /// Kill every live worker (best effort), then collect whatever output exists.
    pub async fn terminate_and_reap(&mut self) -> (String, String) {
        let live = std::mem::take(&mut self.live);
        for (uid, mut proc) in live {
            if let Err(e) = proc.kill() {
                tracing::warn!(uid = %uid, "could not terminate worker: {}", e);
            }
            self.reap_one(uid, proc).await;
        }
        (self.stdout.clone(), self.stderr.clone())
    }

    async fn reap_one(&mut self, uid: JobUid, proc: TrackedProcess) -> FinishedProcess {
        let reaped = proc.reap(&uid.to_string()).await;
        let class = self.classifier.classify(&reaped.stderr);
        tracing::debug!(uid = %uid, status = ?reaped.status, %class, "removing process");
        self.stdout.push_str(&reaped.stdout);
        self.stderr.push_str(&reaped.stderr);
        let finished = FinishedProcess {
            status: reaped.status,
            class,
        };
        self.finished.insert(uid, finished);
        finished
    }
}
