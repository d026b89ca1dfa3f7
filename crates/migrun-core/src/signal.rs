//! Completion markers written by workers.
//!
//! A worker signals success by creating an empty file `<dir>/<prefix><uid>`.
//! The worker may be a wrapper whose exit does not line up with the end of the
//! aligned unit of work, so the marker is the only success signal the
//! scheduler trusts; exit status is used only to detect failures.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::job::JobUid;

/// Parse a marker file name into its uid. `None` for foreign files.
pub fn parse_marker_name(name: &str, prefix: &str) -> Option<JobUid> {
    let rest = name.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Polls a shared directory for completion markers.
#[derive(Debug)]
pub struct CompletionStore {
    dir: PathBuf,
    prefix: String,
    seen: BTreeSet<JobUid>,
}

impl CompletionStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            seen: BTreeSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the worker for `uid` must create on success.
    pub fn marker_path(&self, uid: JobUid) -> PathBuf {
        self.dir.join(format!("{}{}", self.prefix, uid))
    }

    /// Uids whose marker appeared since the previous poll.
    pub fn poll(&mut self) -> io::Result<BTreeSet<JobUid>> {
        let mut fresh = BTreeSet::new();
        for entry in fs::read_dir(&self.dir)? {
            let Ok(entry) = entry else { continue };
            let Ok(file_type) = entry.file_type() else { continue };
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(uid) = name
                .to_str()
                .and_then(|n| parse_marker_name(n, &self.prefix))
            else {
                continue;
            };
            if self.seen.insert(uid) {
                fresh.insert(uid);
            }
        }
        Ok(fresh)
    }

    /// True if a marker for `uid` has been observed by `poll`.
    pub fn is_complete(&self, uid: JobUid) -> bool {
        self.seen.contains(&uid)
    }

    /// All uids observed so far.
    pub fn completed(&self) -> &BTreeSet<JobUid> {
        &self.seen
    }

    /// Delete every marker file in the directory. Returns the number removed.
    pub fn clear(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let is_marker = name
                .to_str()
                .and_then(|n| parse_marker_name(n, &self.prefix))
                .is_some();
            if is_marker && entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
