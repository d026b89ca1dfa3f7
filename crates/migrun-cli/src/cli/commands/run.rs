//! `migrun run` – dispatch every chunk pair and combine the results.

use anyhow::{bail, Result};
use migrun_core::config::MigrunConfig;
use migrun_core::control::RunControl;
use migrun_core::daemon::{MpsDaemon, NoopDaemon, PartitionDaemon};
use migrun_core::device::{parse_capacities, parse_list};
use migrun_core::scheduler::{self, RunOptions, WorkerSpec};

use crate::cli::RunArgs;

/// Requested thread count, clamped to the CPUs available (all of them when unset or 0).
pub(crate) fn resolve_threads(requested: Option<usize>) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match requested {
        Some(n) if n > 0 && n <= cpus => n,
        _ => cpus,
    }
}

/// MPS control unless skipped; clap enforces the pipe dir, this re-checks it.
pub(crate) fn select_daemon(
    opts: &RunOptions,
    skip_daemon_control: bool,
) -> Result<Box<dyn PartitionDaemon>> {
    if skip_daemon_control {
        return Ok(Box::new(NoopDaemon));
    }
    match &opts.mps_pipe_dir {
        Some(dir) => Ok(Box::new(MpsDaemon::new(dir))),
        None => bail!("--mps-pipe-dir is required unless --skip-daemon-control is given"),
    }
}

pub(crate) fn build_options(args: &RunArgs, verbose: bool) -> Result<RunOptions> {
    let capacities = match &args.capacity {
        Some(list) => parse_capacities(list)?,
        None => Vec::new(),
    };
    Ok(RunOptions {
        devices: parse_list(&args.devices),
        capacities,
        query_dir: args.query.clone(),
        target_dir: args.target.clone(),
        tmp_dir: args.tmp_dir.clone(),
        output: args.output.clone(),
        log_dir: args.log_dir.clone(),
        worker: WorkerSpec {
            program: args.worker_cmd.clone(),
            opts: args
                .worker_opts
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            format: args.format.clone(),
            num_threads: resolve_threads(args.num_threads),
            segment_size: args.segment_size,
        },
        mps_pipe_dir: args.mps_pipe_dir.clone(),
        only_missing: args.only_missing,
        start_part: args.start_part,
        keep_partial: args.keep_partial,
        chunk_ext_skip: args.chunk_ext_skip.clone(),
        verbose,
    })
}

pub async fn run_align(args: RunArgs, mut cfg: MigrunConfig, verbose: bool) -> Result<()> {
    if let Some(secs) = args.refresh {
        cfg.refresh_secs = secs;
    }
    if args.no_resubmit {
        cfg.resubmit.enabled = false;
    }
    let opts = build_options(&args, verbose)?;
    println!("USING {} THREADS", opts.worker.num_threads);

    let daemon = select_daemon(&opts, args.skip_daemon_control)?;

    let control = RunControl::new();
    let trip = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, stopping workers");
            trip.cancel();
        }
    });

    let summary = scheduler::execute_run(&opts, &cfg, daemon.as_ref(), control).await?;
    println!(
        "{} of {} pairs succeeded, {} failed, {} resubmitted, {} skipped ({} jobs launched)",
        summary.succeeded,
        summary.total_pairs,
        summary.failed.len(),
        summary.resubmitted,
        summary.skipped,
        summary.incarnations
    );
    for f in &summary.failed {
        println!("  part {} (uid {}): {}", f.part, f.uid, f.kind);
    }
    println!(
        "combined {} parts into {}",
        summary.parts_combined,
        opts.output.display()
    );
    Ok(())
}
