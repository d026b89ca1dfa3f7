//! Shared fixtures: chunk directories and a shell-script stand-in for the aligner.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use migrun_core::config::MigrunConfig;
use migrun_core::scheduler::{RunOptions, WorkerSpec};
use tempfile::TempDir;

/// Parses the worker command line, runs `hooks` (which may exit early), then
/// writes `<target> <query>` to the part file and touches the marker.
/// `$part` and `$state` are available to hooks.
const WORKER_TEMPLATE: &str = r#"#!/bin/sh
out=""
marker=""
pos=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output=*) out="${1#--output=}" ;;
    --uid) shift; marker="$1" ;;
    --num_gpu|--num_threads|--segment_size) shift ;;
    --*) ;;
    *) pos="$pos $(basename "$1")" ;;
  esac
  shift
done
part=$(basename "$out")
part="${part#part_}"
part="${part%%.*}"
state=$(dirname "$0")
echo "$part $CUDA_VISIBLE_DEVICES" >> "$state/launches.log"
__HOOKS__
echo "${pos# }" > "$out"
: > "$marker"
"#;

/// Part 2 fails once with the driver-unload message, then succeeds.
pub const FLAKY_PART_2: &str = r#"
if [ "$part" = 2 ] && [ ! -e "$state/flaky_2" ]; then
  : > "$state/flaky_2"
  echo "CUDA error: cudaErrorCudartUnloading" >&2
  exit 1
fi
"#;

/// Part 3 always dies with a fatal allocation failure.
pub const FATAL_PART_3: &str = r#"
if [ "$part" = 3 ]; then
  echo "terminate called after throwing an instance of 'std::bad_alloc'" >&2
  echo "Aborted (core dumped)" >&2
  exit 134
fi
"#;

/// Part 1 writes half an output, records its pid in `$state/hung.pid`, then
/// hangs until killed. Creating `$state/fixed` turns it back into a normal worker.
pub const HANG_PART_1: &str = r#"
if [ "$part" = 1 ] && [ ! -e "$state/fixed" ]; then
  echo "TRUNCATED" > "$out"
  echo "$$" > "$state/hung.pid"
  exec sleep 30
fi
"#;

pub struct Fixture {
    pub dir: TempDir,
    pub query: PathBuf,
    pub target: PathBuf,
    pub tmp: PathBuf,
    pub output: PathBuf,
    pub worker: PathBuf,
}

impl Fixture {
    /// `n_query` x `n_target` chunk files (plus `.2bit` companions that must be ignored).
    pub fn new(n_query: usize, n_target: usize, hooks: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let query = dir.path().join("query");
        let target = dir.path().join("target");
        for (d, n) in [(&query, n_query), (&target, n_target)] {
            fs::create_dir_all(d).unwrap();
            for i in 0..n {
                fs::write(d.join(format!("chunk_{}", i)), ">s\nACGT\n").unwrap();
                fs::write(d.join(format!("chunk_{}.2bit", i)), b"").unwrap();
            }
        }
        let tmp = dir.path().join("tmp");
        let output = dir.path().join("out.maf");
        let worker = dir.path().join("fake_worker.sh");
        fs::write(&worker, WORKER_TEMPLATE.replace("__HOOKS__", hooks)).unwrap();
        Self {
            dir,
            query,
            target,
            tmp,
            output,
            worker,
        }
    }

    pub fn options(&self, devices: &[&str], capacities: &[usize]) -> RunOptions {
        RunOptions {
            devices: devices.iter().map(|d| d.to_string()).collect(),
            capacities: capacities.to_vec(),
            query_dir: self.query.clone(),
            target_dir: self.target.clone(),
            tmp_dir: self.tmp.clone(),
            output: self.output.clone(),
            log_dir: None,
            // Run through `sh` so the freshly written script is never exec'd directly.
            worker: WorkerSpec {
                program: "sh".to_string(),
                opts: vec![self.worker.to_string_lossy().into_owned()],
                format: "maf-".to_string(),
                num_threads: 1,
                segment_size: 0,
            },
            mps_pipe_dir: None,
            only_missing: false,
            start_part: 0,
            keep_partial: false,
            chunk_ext_skip: ".2bit".to_string(),
            verbose: false,
        }
    }

    /// `(part, device)` per launch, in launch order.
    pub fn launches(&self) -> Vec<(usize, String)> {
        let path = self.dir.path().join("launches.log");
        let Ok(text) = fs::read_to_string(path) else {
            return Vec::new();
        };
        text.lines()
            .filter_map(|l| {
                let (part, device) = l.split_once(' ')?;
                Some((part.parse().ok()?, device.to_string()))
            })
            .collect()
    }

    pub fn log(&self, name: &str) -> String {
        fs::read_to_string(self.tmp.join(name)).unwrap_or_default()
    }
}

/// Fast polling; short marker grace.
pub fn test_config() -> MigrunConfig {
    MigrunConfig {
        refresh_secs: 0.02,
        marker_grace_secs: 2.0,
        ..Default::default()
    }
}
