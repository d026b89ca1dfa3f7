use std::path::{Path, PathBuf};

use crate::assemble::part_file_name;
use crate::daemon::pipe_dir_for;
use crate::job::{PartIndex, TaskPair};
use crate::supervisor::WorkerCommand;

use super::WorkerSpec;

/// Builds the command line of one worker incarnation.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    worker: WorkerSpec,
    tmp_dir: PathBuf,
    ext: String,
    mps_pipe_dir: Option<PathBuf>,
}

impl WorkerLauncher {
    pub fn new(
        worker: WorkerSpec,
        tmp_dir: impl Into<PathBuf>,
        ext: impl Into<String>,
        mps_pipe_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            worker,
            tmp_dir: tmp_dir.into(),
            ext: ext.into(),
            mps_pipe_dir,
        }
    }

    /// Partial output written by every incarnation of `part`.
    pub fn part_path(&self, part: PartIndex) -> PathBuf {
        self.tmp_dir.join(part_file_name(part, &self.ext))
    }

    /// `<program> [opts] <target> <query> --output=.. --format=.. --num_gpu 1
    /// --num_threads n --uid <marker> [--segment_size s]`, restricted to `device`.
    pub fn command(&self, pair: &TaskPair, device: &str, marker: &Path) -> WorkerCommand {
        let mut cmd = WorkerCommand::new(&self.worker.program).env("CUDA_VISIBLE_DEVICES", device);
        if let Some(dir) = &self.mps_pipe_dir {
            cmd = cmd.env(
                "CUDA_MPS_PIPE_DIRECTORY",
                pipe_dir_for(dir, device).to_string_lossy(),
            );
        }
        let mut cmd = cmd
            .args(self.worker.opts.iter().cloned())
            .arg(pair.target.to_string_lossy())
            .arg(pair.query.to_string_lossy())
            .arg(format!("--output={}", self.part_path(pair.part).display()))
            .arg(format!("--format={}", self.worker.format))
            .args(["--num_gpu", "1", "--num_threads"])
            .arg(self.worker.num_threads.to_string())
            .arg("--uid")
            .arg(marker.to_string_lossy());
        if self.worker.segment_size != 0 {
            cmd = cmd
                .arg("--segment_size")
                .arg(self.worker.segment_size.to_string());
        }
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> TaskPair {
        TaskPair {
            part: PartIndex(4),
            query: PathBuf::from("/q/chunk_1"),
            target: PathBuf::from("/t/chunk_0"),
        }
    }

    fn worker() -> WorkerSpec {
        WorkerSpec {
            program: "run_segalign".to_string(),
            opts: vec!["--debug".to_string()],
            format: "maf-".to_string(),
            num_threads: 8,
            segment_size: 0,
        }
    }

    #[test]
    fn command_line_layout() {
        let l = WorkerLauncher::new(worker(), "/tmp/run", "maf", None);
        let cmd = l.command(&pair(), "MIG-1", Path::new("/tmp/run/UID_9"));
        assert_eq!(cmd.envs, vec![("CUDA_VISIBLE_DEVICES".to_string(), "MIG-1".to_string())]);
        assert_eq!(
            cmd.to_string(),
            "CUDA_VISIBLE_DEVICES=MIG-1 run_segalign --debug /t/chunk_0 /q/chunk_1 \
             --output=/tmp/run/part_4.maf --format=maf- --num_gpu 1 --num_threads 8 \
             --uid /tmp/run/UID_9"
        );
    }

    #[test]
    fn pipe_dir_and_segment_size() {
        let mut s = worker();
        s.segment_size = -1;
        let l = WorkerLauncher::new(s, "/tmp/run", "maf", Some(PathBuf::from("/mps")));
        let cmd = l.command(&pair(), "MIG-2", Path::new("/tmp/run/UID_1"));
        assert_eq!(cmd.envs[1].0, "CUDA_MPS_PIPE_DIRECTORY");
        assert_eq!(cmd.envs[1].1, "/mps/MIG-2");
        assert_eq!(cmd.args[cmd.args.len() - 2..], ["--segment_size", "-1"]);
    }

    #[test]
    fn part_path_is_shared_by_incarnations() {
        let l = WorkerLauncher::new(worker(), "/tmp/run", "maf", None);
        assert_eq!(l.part_path(PartIndex(4)), PathBuf::from("/tmp/run/part_4.maf"));
    }
}
