//! CLI for the migrun scheduler.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use migrun_core::config::{self, MigrunConfig};
use std::path::PathBuf;

use commands::{run_align, run_split, run_stop_daemons};

/// Top-level CLI for migrun.
#[derive(Debug, Parser)]
#[command(name = "migrun")]
#[command(
    about = "migrun: run pairwise alignment jobs across GPU / MIG devices",
    long_about = None
)]
pub struct Cli {
    /// Print per-job progress and debug logs.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of ~/.config/migrun/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Align every query chunk against every target chunk on the given devices.
    Run(RunArgs),

    /// Split a FASTA file into balanced chunk files.
    Split {
        /// Input sequence in FASTA format.
        #[arg(long)]
        input: PathBuf,
        /// Output directory for chunk_<i> files.
        #[arg(long)]
        out: PathBuf,
        /// Maximum number of chunks; the exact count when --goal-bp is not given.
        #[arg(long, default_value = "20", value_name = "N")]
        max_chunks: usize,
        /// Goal bases per chunk; picks the chunk count up to --max-chunks.
        #[arg(long, default_value = "0", value_name = "BP")]
        goal_bp: u64,
        /// Also convert each chunk to .2bit with faToTwoBit.
        #[arg(long)]
        to_2bit: bool,
    },

    /// Stop the MPS daemons of the given devices and exit.
    StopDaemons {
        /// Comma-separated device ids.
        #[arg(long, value_name = "LIST")]
        devices: String,
        /// MPS pipe directory root.
        #[arg(long, value_name = "DIR")]
        mps_pipe_dir: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Comma-separated GPU or MIG device ids.
    #[arg(long, value_name = "LIST")]
    pub devices: String,
    /// Comma-separated jobs per device (default: one each).
    #[arg(long, value_name = "LIST")]
    pub capacity: Option<String>,
    /// Seconds between checks for free devices (overrides config).
    #[arg(long, value_name = "SECS")]
    pub refresh: Option<f64>,
    /// Directory of query chunks.
    #[arg(long)]
    pub query: PathBuf,
    /// Directory of target chunks.
    #[arg(long)]
    pub target: PathBuf,
    /// Directory for partial outputs and completion markers.
    #[arg(long, value_name = "DIR")]
    pub tmp_dir: PathBuf,
    /// Final combined alignment file; its extension names the part files.
    #[arg(long)]
    pub output: PathBuf,
    /// Directory for worker logs and the command log (default: --tmp-dir).
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
    /// Output format passed to the worker. Must support concatenation.
    #[arg(long, default_value = "maf-")]
    pub format: String,
    /// Worker program. It must create the file given by --uid on success.
    #[arg(long, default_value = "run_segalign_symlink", value_name = "CMD")]
    pub worker_cmd: String,
    /// Extra worker options, whitespace separated.
    #[arg(long, default_value = "", value_name = "OPTS", allow_hyphen_values = true)]
    pub worker_opts: String,
    /// Threads per worker (default: all available CPUs).
    #[arg(long, value_name = "N")]
    pub num_threads: Option<usize>,
    /// Maximum segment size output by the worker; 0 disables partitioning.
    #[arg(long, default_value = "0", value_name = "N", allow_negative_numbers = true)]
    pub segment_size: i64,
    /// MPS pipe directory root; one subdirectory per device.
    #[arg(long, value_name = "DIR", required_unless_present = "skip_daemon_control")]
    pub mps_pipe_dir: Option<PathBuf>,
    /// Do not start or stop MPS daemons (they are managed elsewhere, or absent).
    #[arg(long)]
    pub skip_daemon_control: bool,
    /// Only run pairs whose part file is missing.
    #[arg(long)]
    pub only_missing: bool,
    /// With --only-missing, also skip parts below this index.
    #[arg(long, default_value = "0", value_name = "K")]
    pub start_part: usize,
    /// Keep part files (and markers) after combining them.
    #[arg(long)]
    pub keep_partial: bool,
    /// Do not resubmit jobs that failed with a transient device error.
    #[arg(long)]
    pub no_resubmit: bool,
    /// Ignore chunk files whose name contains this.
    #[arg(long, default_value = ".2bit", value_name = "EXT")]
    pub chunk_ext_skip: String,
}

impl Cli {
    /// Load config (explicit path or XDG default) and dispatch.
    pub async fn run(self) -> Result<()> {
        let cfg: MigrunConfig = match &self.config {
            Some(path) => config::load_from(path)?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded config: {:?}", cfg);

        match self.command {
            CliCommand::Run(args) => run_align(args, cfg, self.verbose).await?,
            CliCommand::Split {
                input,
                out,
                max_chunks,
                goal_bp,
                to_2bit,
            } => run_split(&input, &out, max_chunks, goal_bp, to_2bit)?,
            CliCommand::StopDaemons {
                devices,
                mps_pipe_dir,
            } => run_stop_daemons(&devices, &mps_pipe_dir).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
