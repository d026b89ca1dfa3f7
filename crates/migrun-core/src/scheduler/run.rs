//! One complete `migrun run`: setup, dispatch, teardown, assembly.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::assemble::{output_extension, write_log, Assembler};
use crate::config::MigrunConfig;
use crate::control::RunControl;
use crate::daemon::PartitionDaemon;
use crate::device::{Device, DeviceRegistry};
use crate::signal::CompletionStore;

use super::dispatch::{Scheduler, SchedulerSettings, SkipRule};
use super::launch::WorkerLauncher;
use super::pairs::{generate_pairs, list_chunks};
use super::{RunOptions, RunSummary};

pub const STDOUT_LOG: &str = "worker_stdout.txt";
pub const STDERR_LOG: &str = "worker_stderr.txt";
pub const COMMAND_LOG: &str = "commands.txt";

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))
}

/// Run every (query, target) pair to completion.
///
/// Configuration problems fail before any worker starts. Once dispatch has
/// begun, teardown (daemon stop, reaping, logs, assembly) runs on both the
/// normal and the error path; a dispatch error is returned after teardown.
pub async fn execute_run(
    opts: &RunOptions,
    cfg: &MigrunConfig,
    daemon: &dyn PartitionDaemon,
    control: RunControl,
) -> Result<RunSummary> {
    let registry = DeviceRegistry::from_lists(&opts.devices, &opts.capacities)?;
    let mut settings = SchedulerSettings::from_config(cfg)?;
    settings.skip = SkipRule {
        only_missing: opts.only_missing,
        start_part: opts.start_part,
    };
    settings.verbose = opts.verbose;

    create_dir(&opts.tmp_dir)?;
    let log_dir = opts.log_dir();
    create_dir(&log_dir)?;
    if let Some(dir) = &opts.mps_pipe_dir {
        create_dir(dir)?;
    }

    let queries = list_chunks(&opts.query_dir, &opts.chunk_ext_skip)?;
    let targets = list_chunks(&opts.target_dir, &opts.chunk_ext_skip)?;
    let pairs = generate_pairs(&queries, &targets);
    let total = pairs.len();
    println!(
        "{} query chunks x {} target chunks = {} pairs on {} devices (capacity {})",
        queries.len(),
        targets.len(),
        total,
        registry.len(),
        registry.total_capacity()
    );
    tracing::info!(
        queries = queries.len(),
        targets = targets.len(),
        pairs = total,
        "starting run"
    );

    // Uids restart at 1 every run; markers left by an earlier run would
    // otherwise complete fresh jobs.
    let stale = CompletionStore::new(&opts.tmp_dir, cfg.uid_prefix.clone())
        .clear()
        .with_context(|| format!("clear stale markers in {}", opts.tmp_dir.display()))?;
    if stale > 0 {
        tracing::info!(stale, "removed stale completion markers");
    }

    let devices = registry.devices().to_vec();
    daemon
        .start(&devices)
        .await
        .context("start partition daemons")?;

    let ext = output_extension(&opts.output);
    let launcher = WorkerLauncher::new(
        opts.worker.clone(),
        &opts.tmp_dir,
        &ext,
        opts.mps_pipe_dir.clone(),
    );
    let mut scheduler = Scheduler::new(registry, pairs, &opts.tmp_dir, launcher, settings, control);
    let outcome = scheduler.run().await;
    if let Err(e) = &outcome {
        tracing::error!("dispatch stopped: {:#}", e);
    }

    let teardown = finish(&mut scheduler, opts, daemon, &devices, &ext, outcome.is_err()).await;
    match (outcome, teardown) {
        (Ok(()), summary) => summary,
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(t)) => {
            tracing::error!("teardown after failed run also failed: {:#}", t);
            Err(e)
        }
    }
}

async fn finish(
    scheduler: &mut Scheduler,
    opts: &RunOptions,
    daemon: &dyn PartitionDaemon,
    devices: &[Device],
    ext: &str,
    aborted: bool,
) -> Result<RunSummary> {
    // On abort, workers are killed before their daemon goes away.
    let (stdout, stderr) = if aborted {
        let captured = scheduler.shutdown(true).await;
        stop_daemon(daemon, devices).await;
        captured
    } else {
        stop_daemon(daemon, devices).await;
        scheduler.shutdown(false).await
    };

    let log_dir = opts.log_dir();
    let append = opts.only_missing;
    write_log(&log_dir.join(STDOUT_LOG), &stdout, append)?;
    write_log(&log_dir.join(STDERR_LOG), &stderr, append)?;
    write_log(&log_dir.join(COMMAND_LOG), scheduler.command_log(), append)?;

    let mut summary = scheduler.summary();
    let assembler = Assembler::new(&opts.tmp_dir, ext);
    summary.missing_parts = assembler
        .missing_parts(summary.total_pairs)
        .with_context(|| format!("list parts in {}", opts.tmp_dir.display()))?;
    if !summary.missing_parts.is_empty() {
        let list: Vec<String> = summary.missing_parts.iter().map(|k| k.to_string()).collect();
        println!("Missing {} output parts: ", summary.missing_parts.len());
        println!("{}", list.join(", "));
        println!("Rerun with --only-missing");
        tracing::warn!(missing = summary.missing_parts.len(), "run incomplete");
    }

    let report = assembler.assemble(&opts.output, summary.total_pairs, opts.keep_partial)?;
    summary.parts_combined = report.parts.len();

    if !opts.keep_partial {
        let removed = scheduler
            .store()
            .clear()
            .context("remove completion markers")?;
        tracing::debug!(removed, "removed completion markers");
    }
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed.len(),
        resubmitted = summary.resubmitted,
        skipped = summary.skipped,
        "run finished"
    );
    Ok(summary)
}

async fn stop_daemon(daemon: &dyn PartitionDaemon, devices: &[Device]) {
    if let Err(e) = daemon.stop(devices).await {
        tracing::warn!("could not stop partition daemons: {:#}", e);
    }
}

/// Stop the daemons of `devices` without running anything.
pub async fn stop_daemons(devices: &[String], daemon: &dyn PartitionDaemon) -> Result<()> {
    let registry = DeviceRegistry::from_lists(devices, &[])?;
    daemon.stop(registry.devices()).await
}
