//! Final concatenation of per-pair partial outputs.
//!
//! Parts are concatenated in ascending part order into `<output>.part`, which is
//! then atomically renamed onto the output path, so a crash never leaves a
//! half-written result under the final name.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::job::PartIndex;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Appends `.part` to the final path (e.g. `out.maf` -> `out.maf.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// `part_<k>.<ext>`
pub fn part_file_name(part: PartIndex, ext: &str) -> String {
    format!("part_{}.{}", part, ext)
}

/// Extension of the final output file; partial outputs share it.
pub fn output_extension(output: &Path) -> String {
    output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("out")
        .to_string()
}

/// Parse `part_<k>.<ext>` back into its index.
fn parse_part_name(name: &str, ext: &str) -> Option<usize> {
    let digits = name.strip_prefix("part_")?.strip_suffix(ext)?.strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Parts concatenated, in the order written.
    pub parts: Vec<usize>,
    pub bytes: u64,
    /// Part files deleted after concatenation.
    pub removed: usize,
}

/// Partial outputs of one run living in `tmp_dir`.
#[derive(Debug, Clone)]
pub struct Assembler {
    tmp_dir: PathBuf,
    ext: String,
}

impl Assembler {
    pub fn new(tmp_dir: impl Into<PathBuf>, ext: impl Into<String>) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
            ext: ext.into(),
        }
    }

    pub fn part_path(&self, part: PartIndex) -> PathBuf {
        self.tmp_dir.join(part_file_name(part, &self.ext))
    }

    /// Part indices present on disk, ascending.
    pub fn existing_parts(&self) -> io::Result<Vec<usize>> {
        let mut parts = Vec::new();
        for entry in fs::read_dir(&self.tmp_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(k) = entry
                .file_name()
                .to_str()
                .and_then(|n| parse_part_name(n, &self.ext))
            {
                parts.push(k);
            }
        }
        parts.sort_unstable();
        Ok(parts)
    }

    /// Indices in `1..=expected` with no part file.
    pub fn missing_parts(&self, expected: usize) -> io::Result<Vec<usize>> {
        let present = self.existing_parts()?;
        Ok((1..=expected)
            .filter(|k| present.binary_search(k).is_err())
            .collect())
    }

    /// Concatenate parts `1..=expected` into `output`, then delete them unless
    /// `keep_partial`. Parts above `expected` belong to another run and are left alone.
    pub fn assemble(
        &self,
        output: &Path,
        expected: usize,
        keep_partial: bool,
    ) -> Result<AssemblyReport> {
        let (parts, foreign): (Vec<usize>, Vec<usize>) = self
            .existing_parts()
            .with_context(|| format!("list parts in {}", self.tmp_dir.display()))?
            .into_iter()
            .partition(|&k| (1..=expected).contains(&k));
        if !foreign.is_empty() {
            tracing::warn!(
                ?foreign,
                expected,
                "ignoring part files outside this run in {}",
                self.tmp_dir.display()
            );
        }
        let tmp = temp_path(output);
        let file =
            File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        let mut out = BufWriter::new(file);
        let mut bytes = 0u64;
        for &k in &parts {
            let path = self.part_path(PartIndex(k));
            let mut f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
            bytes += io::copy(&mut f, &mut out)
                .with_context(|| format!("append {}", path.display()))?;
        }
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all().context("sync combined output")?;
        drop(file);
        fs::rename(&tmp, output).with_context(|| {
            format!("rename {} -> {}", tmp.display(), output.display())
        })?;

        let mut removed = 0;
        if !keep_partial {
            for &k in &parts {
                let path = self.part_path(PartIndex(k));
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!("could not remove {}: {}", path.display(), e),
                }
            }
        }
        tracing::info!(
            parts = parts.len(),
            bytes,
            removed,
            "combined partial outputs into {}",
            output.display()
        );
        Ok(AssemblyReport {
            parts,
            bytes,
            removed,
        })
    }
}

/// Write `contents` to `path`, appending when `append` is set.
pub fn write_log(path: &Path, contents: &str, append: bool) -> Result<()> {
    let mut f = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    f.write_all(contents.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
