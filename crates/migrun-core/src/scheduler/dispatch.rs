//! The dispatch loop.
//!
//! One `Scheduler` owns the device queue, the completion store and the process
//! supervisor for a run. Each iteration either fills the first device with a
//! free slot from the pending list, or sleeps one refresh interval and then
//! processes completion markers followed by worker exits.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::config::{ConfigError, MigrunConfig};
use crate::control::{RunAborted, RunControl};
use crate::device::DeviceRegistry;
use crate::job::{FailureKind, JobRecord, JobState, JobUid, PartIndex, TaskPair, UidAllocator};
use crate::queue::DeviceQueue;
use crate::resubmit::{ResubmitDecision, ResubmitPolicy};
use crate::signal::CompletionStore;
use crate::supervisor::{Classifier, ErrorClass, ProcessSupervisor};

use super::launch::WorkerLauncher;
use super::progress::{format_elapsed, render_queue, ProgressStats};
use super::{FailedJob, RunSummary};

/// Which pairs are not launched at all (`--only-missing`, `--start-part`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipRule {
    pub only_missing: bool,
    pub start_part: usize,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub refresh: Duration,
    pub marker_grace: Duration,
    pub uid_prefix: String,
    pub max_tracked: usize,
    pub classifier: Classifier,
    pub resubmit: ResubmitPolicy,
    pub skip: SkipRule,
    pub verbose: bool,
}

impl SchedulerSettings {
    pub fn from_config(cfg: &MigrunConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            refresh: cfg.refresh_interval()?,
            marker_grace: cfg.marker_grace(),
            uid_prefix: cfg.uid_prefix.clone(),
            max_tracked: cfg.max_tracked_processes,
            classifier: Classifier::new(cfg.classify.rules.clone()),
            resubmit: ResubmitPolicy::from(&cfg.resubmit),
            skip: SkipRule::default(),
            verbose: false,
        })
    }
}

pub struct Scheduler {
    registry: DeviceRegistry,
    queue: DeviceQueue,
    store: CompletionStore,
    supervisor: ProcessSupervisor,
    launcher: WorkerLauncher,
    policy: ResubmitPolicy,
    skip: SkipRule,
    refresh: Duration,
    marker_grace: Duration,
    verbose: bool,
    control: RunControl,

    uids: UidAllocator,
    pending: VecDeque<TaskPair>,
    total_pairs: usize,
    attempts: HashMap<PartIndex, u32>,
    jobs: BTreeMap<JobUid, JobRecord>,
    /// First tick that saw a clean exit with no marker yet.
    exited_at: HashMap<JobUid, Instant>,
    summary: RunSummary,
    log: String,
    started: Instant,
    redrawing: bool,
}

impl Scheduler {
    pub fn new(
        registry: DeviceRegistry,
        pairs: Vec<TaskPair>,
        marker_dir: &Path,
        launcher: WorkerLauncher,
        settings: SchedulerSettings,
        control: RunControl,
    ) -> Self {
        let queue = DeviceQueue::new(&registry);
        let total_pairs = pairs.len();
        Self {
            queue,
            store: CompletionStore::new(marker_dir, settings.uid_prefix),
            supervisor: ProcessSupervisor::new(settings.classifier, settings.max_tracked),
            launcher,
            policy: settings.resubmit,
            skip: settings.skip,
            refresh: settings.refresh,
            marker_grace: settings.marker_grace,
            verbose: settings.verbose,
            control,
            registry,
            uids: UidAllocator::default(),
            pending: pairs.into(),
            total_pairs,
            attempts: HashMap::new(),
            jobs: BTreeMap::new(),
            exited_at: HashMap::new(),
            summary: RunSummary {
                total_pairs,
                ..Default::default()
            },
            log: String::new(),
            started: Instant::now(),
            redrawing: false,
        }
    }

    /// Dispatch every pending pair and wait until the device queue drains.
    ///
    /// Returns `RunAborted` when the run control is cancelled; the caller is
    /// expected to call `shutdown(true)` on any error.
    pub async fn run(&mut self) -> Result<()> {
        self.started = Instant::now();
        loop {
            if self.control.is_cancelled() {
                self.end_redraw();
                return Err(RunAborted.into());
            }
            if self.pending.is_empty() && self.queue.is_empty() {
                break;
            }
            if !self.pending.is_empty() {
                if let Some((device, count)) = self.queue.free_devices().into_iter().next() {
                    self.end_redraw();
                    self.fill_device(&device, count).await?;
                    continue;
                }
            }
            tokio::time::sleep(self.refresh).await;
            self.tick().await?;
            if self.verbose {
                self.redraw_queue();
            }
        }
        self.end_redraw();
        let msg = format!(
            "Finished GPU section. time {}",
            format_elapsed(self.started.elapsed())
        );
        println!("{}", msg);
        self.note(&msg);
        Ok(())
    }

    /// Wait for (or, with `terminate`, kill) every remaining worker.
    /// Returns the stdout and stderr captured over the whole run.
    ///
    /// Killed workers are recorded as `aborted` failures and their partial
    /// outputs removed, so they are reported missing instead of combined.
    pub async fn shutdown(&mut self, terminate: bool) -> (String, String) {
        if !terminate {
            return self.supervisor.reap_all().await;
        }
        let captured = self.supervisor.terminate_and_reap().await;
        // Markers written just before the kill still count.
        if let Err(e) = self.record_successes() {
            tracing::warn!("{:#}", e);
        }
        let killed = self.queue.running_uids();
        for &uid in &killed {
            self.fail(uid, FailureKind::Aborted);
        }
        self.queue.remove(&killed);
        captured
    }

    pub fn progress(&self) -> ProgressStats {
        ProgressStats {
            total_pairs: self.total_pairs,
            pending: self.pending.len(),
            running: self.queue.len(),
            succeeded: self.summary.succeeded,
            failed: self.summary.failed.len(),
            skipped: self.summary.skipped,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }

    pub fn summary(&self) -> RunSummary {
        let mut s = self.summary.clone();
        s.incarnations = self
            .jobs
            .values()
            .filter(|j| !matches!(j.state, JobState::Pending | JobState::Skipped))
            .count() as u64;
        s
    }

    pub fn job(&self, uid: JobUid) -> Option<&JobRecord> {
        self.jobs.get(&uid)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobRecord> {
        self.jobs.values()
    }

    /// Launched commands plus skip, resubmit and failure notes, one per line.
    pub fn command_log(&self) -> &str {
        &self.log
    }

    pub fn store(&self) -> &CompletionStore {
        &self.store
    }

    async fn fill_device(&mut self, device: &str, mut count: usize) -> Result<()> {
        let capacity = self.registry.get(device).map(|d| d.capacity).unwrap_or(0);
        while count < capacity {
            let Some(pair) = self.pending.pop_front() else {
                break;
            };
            if self.should_skip(&pair) {
                self.skip_pair(pair, device);
                continue;
            }
            self.launch(pair, device).await?;
            count += 1;
        }
        Ok(())
    }

    /// Only first attempts are skipped; a resubmitted pair may have left a partial file.
    fn should_skip(&self, pair: &TaskPair) -> bool {
        if !self.skip.only_missing || self.attempts.contains_key(&pair.part) {
            return false;
        }
        pair.part.0 < self.skip.start_part || self.launcher.part_path(pair.part).is_file()
    }

    /// Skipped pairs still take a uid, but no slot.
    fn skip_pair(&mut self, pair: TaskPair, device: &str) {
        self.summary.skipped += 1;
        let line = format!(
            "SKIPPED: part {}: {} and {}",
            pair.part,
            pair.target.display(),
            pair.query.display()
        );
        if self.verbose {
            println!("{}", line);
        }
        tracing::debug!(part = %pair.part, "skipped; output already present");
        self.note(&line);
        let uid = self.uids.next_uid();
        self.jobs.insert(
            uid,
            JobRecord {
                uid,
                pair,
                device: device.to_string(),
                attempt: 0,
                state: JobState::Skipped,
            },
        );
    }

    async fn launch(&mut self, pair: TaskPair, device: &str) -> Result<()> {
        let uid = self.uids.next_uid();
        let attempt = {
            let n = self.attempts.entry(pair.part).or_insert(0);
            *n += 1;
            *n
        };
        let marker = self.store.marker_path(uid);
        let cmd = self.launcher.command(&pair, device, &marker);
        self.jobs.insert(
            uid,
            JobRecord {
                uid,
                pair: pair.clone(),
                device: device.to_string(),
                attempt,
                state: JobState::Pending,
            },
        );
        self.queue.submit(uid, device)?;
        let pid = self.supervisor.spawn(uid, &cmd).await?;
        self.set_state(uid, JobState::Running);

        tracing::debug!(uid = %uid, part = %pair.part, device, attempt, pid, "launched worker");
        if self.verbose {
            let p = self.progress();
            println!(
                "running process with pid={}, uid={} and device={}. part {} /{}: {} and {}. \
                 Elapsed Time: {}, estimated runtime: {} [pending {}, running {}]",
                pid,
                uid,
                device,
                pair.part,
                self.total_pairs,
                pair.target.display(),
                pair.query.display(),
                format_elapsed(self.started.elapsed()),
                format_elapsed(Duration::try_from_secs_f64(p.estimated_total_secs()).unwrap_or_default()),
                p.pending,
                p.running
            );
            println!("{}", cmd);
        }
        self.note(&cmd.to_string());
        self.summary
            .assignments
            .push((uid, pair.part, device.to_string()));
        Ok(())
    }

    /// Markers first, then exits of the uids still holding a slot.
    async fn tick(&mut self) -> Result<()> {
        self.record_successes()?;
        let running = self.queue.running_uids();
        let exited = self.supervisor.poll_finished(&running);
        if exited.is_empty() {
            return Ok(());
        }
        // A worker may write its marker and exit between the two polls.
        self.record_successes()?;

        let mut released = Vec::new();
        for uid in exited {
            if self.store.is_complete(uid) {
                continue;
            }
            match self.supervisor.classify(uid).await? {
                ErrorClass::NoError => {
                    let first_seen = *self.exited_at.entry(uid).or_insert_with(Instant::now);
                    if first_seen.elapsed() >= self.marker_grace {
                        self.fail(uid, FailureKind::Unsignaled);
                        released.push(uid);
                    }
                }
                ErrorClass::Memory => {
                    self.handle_transient(uid);
                    released.push(uid);
                }
                ErrorClass::Other => {
                    self.fail(uid, FailureKind::Other);
                    released.push(uid);
                }
            }
        }
        self.queue.remove(&released);
        Ok(())
    }

    fn record_successes(&mut self) -> Result<()> {
        let fresh: Vec<JobUid> = self
            .store
            .poll()
            .with_context(|| format!("poll completion markers in {}", self.store.dir().display()))?
            .into_iter()
            .collect();
        for uid in self.queue.remove(&fresh) {
            self.exited_at.remove(&uid);
            self.set_state(uid, JobState::CompletedSuccess);
            self.summary.succeeded += 1;
            tracing::info!(uid = %uid, "job completed");
        }
        Ok(())
    }

    fn handle_transient(&mut self, uid: JobUid) {
        let Some(rec) = self.jobs.get(&uid) else {
            return;
        };
        let attempt = rec.attempt;
        let pair = rec.pair.clone();
        match self.policy.decide(attempt, ErrorClass::Memory) {
            ResubmitDecision::Resubmit => {
                self.set_state(uid, JobState::CompletedFailure(FailureKind::Memory));
                self.summary.resubmitted += 1;
                println!("{} RESUBMITTED", uid);
                tracing::warn!(uid = %uid, part = %pair.part, attempt, "transient failure, resubmitting");
                self.note(&format!("{} RESUBMITTED", uid));
                self.pending.push_back(pair);
            }
            ResubmitDecision::GiveUp => self.fail(uid, FailureKind::Memory),
        }
    }

    /// Terminal failure. The pair's partial output, if any, is discarded so it
    /// shows up as missing and a later `--only-missing` run retries it.
    fn fail(&mut self, uid: JobUid, kind: FailureKind) {
        self.exited_at.remove(&uid);
        self.set_state(uid, JobState::CompletedFailure(kind));
        if let Some(part) = self.jobs.get(&uid).map(|r| r.pair.part) {
            self.summary.failed.push(FailedJob { uid, part, kind });
            let path = self.launcher.part_path(part);
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!("could not remove {}: {}", path.display(), e);
                }
            }
        }
        println!("FAILED UID {} ({})", uid, kind);
        tracing::warn!(uid = %uid, %kind, "job failed");
        self.note(&format!("FAILED UID {} ({})", uid, kind));
    }

    fn set_state(&mut self, uid: JobUid, state: JobState) {
        if let Some(rec) = self.jobs.get_mut(&uid) {
            rec.state = state;
        }
    }

    fn note(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }

    fn redraw_queue(&mut self) {
        print!("\x1b[2K{}\r", render_queue(&self.queue.snapshot()));
        let _ = std::io::stdout().flush();
        self.redrawing = true;
    }

    fn end_redraw(&mut self) {
        if self.redrawing {
            println!();
            self.redrawing = false;
        }
    }
}
