use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::job::{PartIndex, TaskPair};

/// Regular files in `dir`, sorted by file name. Names containing `skip` (when
/// non-empty) are ignored, e.g. the `.2bit` companions of FASTA chunks.
pub fn list_chunks(dir: &Path, skip: &str) -> Result<Vec<PathBuf>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read chunk dir {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !skip.is_empty() && name.contains(skip) {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names.into_iter().map(|n| dir.join(n)).collect())
}

/// Every target for the first query, then every target for the next, ...
/// Parts are numbered from 1 in that order.
pub fn generate_pairs(queries: &[PathBuf], targets: &[PathBuf]) -> Vec<TaskPair> {
    queries
        .iter()
        .flat_map(|q| targets.iter().map(move |t| (q, t)))
        .enumerate()
        .map(|(i, (q, t))| TaskPair {
            part: PartIndex(i + 1),
            query: q.clone(),
            target: t.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn lists_sorted_files_and_skips_extension() {
        let dir = tempfile::tempdir().unwrap();
        for n in ["chunk_2", "chunk_10", "chunk_1", "chunk_1.2bit"] {
            fs::write(dir.path().join(n), ">s\nACGT\n").unwrap();
        }
        fs::create_dir(dir.path().join("chunk_0")).unwrap();
        let chunks = list_chunks(dir.path(), ".2bit").unwrap();
        let names: Vec<_> = chunks
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["chunk_1", "chunk_10", "chunk_2"]);

        let all = list_chunks(dir.path(), "").unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn missing_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_chunks(&dir.path().join("nope"), ".2bit").is_err());
    }

    #[test]
    fn n_by_m_unique_pairs_in_nested_order() {
        let q: Vec<PathBuf> = ["q1", "q2", "q3"].iter().map(PathBuf::from).collect();
        let t: Vec<PathBuf> = ["t1", "t2"].iter().map(PathBuf::from).collect();
        let pairs = generate_pairs(&q, &t);
        assert_eq!(pairs.len(), 6);
        let unique: HashSet<_> = pairs.iter().map(|p| (&p.query, &p.target)).collect();
        assert_eq!(unique.len(), 6);
        assert_eq!(pairs[0].part, PartIndex(1));
        assert_eq!(pairs[1].query, PathBuf::from("q1"));
        assert_eq!(pairs[1].target, PathBuf::from("t2"));
        assert_eq!(pairs[2].query, PathBuf::from("q2"));
        assert_eq!(pairs[5].part, PartIndex(6));
        assert!(generate_pairs(&q, &[]).is_empty());
    }
}
