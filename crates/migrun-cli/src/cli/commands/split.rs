//! `migrun split` – partition a FASTA file into balanced chunks.

use anyhow::Result;
use migrun_core::partition::{split_fasta, SplitOptions};
use std::path::Path;

pub fn run_split(
    input: &Path,
    out: &Path,
    max_chunks: usize,
    goal_bp: u64,
    to_2bit: bool,
) -> Result<()> {
    let opts = SplitOptions {
        max_chunks,
        goal_bp,
        to_2bit,
        ..Default::default()
    };
    let report = split_fasta(input, out, &opts)?;
    println!("bin count = {}", report.bin_count);
    for (path, bases) in &report.chunks {
        println!("{}  {} bp", path.display(), bases);
    }
    Ok(())
}
