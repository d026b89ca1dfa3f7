//! Minimal FASTA reading and writing.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    /// Header line including the leading `>`.
    pub description: String,
    pub sequence: String,
}

impl FastaRecord {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// Parse records in file order. Sequence lines are joined; records without
/// sequence are dropped.
pub fn parse_fasta<R: BufRead>(reader: R) -> io::Result<Vec<FastaRecord>> {
    let mut records = Vec::new();
    let mut description = String::new();
    let mut sequence = String::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end();
        if line.starts_with('>') {
            if !sequence.is_empty() {
                records.push(FastaRecord {
                    description: std::mem::take(&mut description),
                    sequence: std::mem::take(&mut sequence),
                });
            }
            description = line.to_string();
        } else {
            sequence.push_str(line);
        }
    }
    if !sequence.is_empty() {
        records.push(FastaRecord {
            description,
            sequence,
        });
    }
    Ok(records)
}

/// Read `path` and sort records longest first (stable for equal lengths).
pub fn read_fasta(path: &Path) -> Result<Vec<FastaRecord>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut records =
        parse_fasta(BufReader::new(f)).with_context(|| format!("read {}", path.display()))?;
    records.sort_by(|a, b| b.len().cmp(&a.len()));
    Ok(records)
}

/// One header line and one sequence line per record.
pub fn write_fasta<'a>(path: &Path, records: impl IntoIterator<Item = &'a FastaRecord>) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for r in records {
        writeln!(w, "{}", r.description)?;
        writeln!(w, "{}", r.sequence)?;
    }
    w.flush()?;
    Ok(())
}
