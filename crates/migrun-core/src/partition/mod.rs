//! Input partitioning (`migrun split`).
//!
//! Splits a FASTA file into `chunk_<i>` files of similar total length without
//! splitting individual sequences. The chunk count is either fixed or chosen
//! to be closest to a goal size per chunk.

mod fasta;
mod pack;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};

pub use fasta::{parse_fasta, read_fasta, write_fasta, FastaRecord};
pub use pack::{best_bin_count, mse, pack, Packing};

/// Converter used for `--to-2bit` (UCSC kent tools).
pub const TWOBIT_CMD: &str = "faToTwoBit";

#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Exact chunk count, or the upper bound of the search when `goal_bp` is set.
    pub max_chunks: usize,
    /// Target bases per chunk; 0 disables the search.
    pub goal_bp: u64,
    /// Also write `chunk_<i>.2bit` next to each chunk.
    pub to_2bit: bool,
    pub twobit_cmd: String,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            max_chunks: 20,
            goal_bp: 0,
            to_2bit: false,
            twobit_cmd: TWOBIT_CMD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SplitReport {
    pub bin_count: usize,
    /// Written chunk files and their total length. Empty bins are not written.
    pub chunks: Vec<(PathBuf, u64)>,
}

/// `chunk_<i>`
pub fn chunk_file_name(bin: usize) -> String {
    format!("chunk_{}", bin)
}

/// Split `input` into chunk files under `out_dir`.
pub fn split_fasta(input: &Path, out_dir: &Path, opts: &SplitOptions) -> Result<SplitReport> {
    if opts.max_chunks == 0 {
        bail!("max chunks must be at least 1");
    }
    if !input.is_file() {
        bail!("input file {} does not exist", input.display());
    }
    fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;

    let records = read_fasta(input)?;
    let lengths: Vec<u64> = records.iter().map(|r| r.len() as u64).collect();
    let bin_count = if opts.goal_bp > 0 {
        best_bin_count(&lengths, opts.goal_bp, opts.max_chunks)
    } else {
        opts.max_chunks
    };
    tracing::info!(
        sequences = records.len(),
        bins = bin_count,
        "packing {}",
        input.display()
    );

    let packing = pack(&lengths, bin_count);
    let mut report = SplitReport {
        bin_count,
        chunks: Vec::new(),
    };
    for (bin, members) in packing.bins.iter().enumerate() {
        if members.is_empty() {
            tracing::debug!(bin, "empty bin not written");
            continue;
        }
        let path = out_dir.join(chunk_file_name(bin));
        write_fasta(&path, members.iter().map(|&i| &records[i]))?;
        tracing::debug!(bin, bases = packing.sizes[bin], "wrote {}", path.display());
        report.chunks.push((path, packing.sizes[bin]));
    }

    if opts.to_2bit {
        for (path, _) in &report.chunks {
            convert_to_2bit(path, &opts.twobit_cmd)?;
        }
    }
    Ok(report)
}

/// `<cmd> <chunk> <chunk>.2bit`
pub fn convert_to_2bit(chunk: &Path, cmd: &str) -> Result<PathBuf> {
    let mut out = chunk.as_os_str().to_owned();
    out.push(".2bit");
    let out = PathBuf::from(out);
    let status = Command::new(cmd)
        .arg(chunk)
        .arg(&out)
        .status()
        .with_context(|| format!("run {}", cmd))?;
    if !status.success() {
        bail!("{} {} exited with {}", cmd, chunk.display(), status);
    }
    Ok(out)
}
