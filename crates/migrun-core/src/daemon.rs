//! Lifecycle of the per-device shared-execution (MPS) daemon.
//!
//! Workers on a device share it through a daemon whose control pipe lives in
//! `<pipe_dir>/<device>`. The scheduler only needs `start` before dispatch and
//! `stop` at teardown.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::device::Device;

/// Control program shipped with the CUDA toolkit.
pub const MPS_CONTROL_CMD: &str = "nvidia-cuda-mps-control";

#[async_trait]
pub trait PartitionDaemon: Send + Sync {
    async fn start(&self, devices: &[Device]) -> Result<()>;
    async fn stop(&self, devices: &[Device]) -> Result<()>;
}

/// Pipe directory of the daemon serving `device`.
pub fn pipe_dir_for(pipe_dir: &Path, device: &str) -> PathBuf {
    pipe_dir.join(device)
}

/// One MPS control daemon per device.
#[derive(Debug, Clone)]
pub struct MpsDaemon {
    pipe_dir: PathBuf,
    control_cmd: String,
}

impl MpsDaemon {
    pub fn new(pipe_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipe_dir: pipe_dir.into(),
            control_cmd: MPS_CONTROL_CMD.to_string(),
        }
    }

    /// Use a different control program (tests, wrappers).
    pub fn with_control_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.control_cmd = cmd.into();
        self
    }

    pub fn pipe_dir(&self) -> &Path {
        &self.pipe_dir
    }

    fn command(&self, device: &str) -> Command {
        let mut cmd = Command::new(&self.control_cmd);
        cmd.env("CUDA_VISIBLE_DEVICES", device).env(
            "CUDA_MPS_PIPE_DIRECTORY",
            pipe_dir_for(&self.pipe_dir, device),
        );
        cmd
    }

    async fn start_one(&self, device: &str) -> Result<()> {
        let status = self
            .command(device)
            .arg("-d")
            .stdin(Stdio::null())
            .status()
            .await
            .with_context(|| format!("run {} -d for device {}", self.control_cmd, device))?;
        if !status.success() {
            bail!(
                "{} -d for device {} exited with {}",
                self.control_cmd,
                device,
                status
            );
        }
        Ok(())
    }

    async fn stop_one(&self, device: &str) -> Result<()> {
        let mut child = self
            .command(device)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("run {} for device {}", self.control_cmd, device))?;
        if let Some(mut stdin) = child.stdin.take() {
            // The daemon may already be gone; a closed pipe is fine here.
            let _ = stdin.write_all(b"quit\n").await;
        }
        let status = child.wait().await?;
        if !status.success() {
            bail!("stopping daemon for device {} exited with {}", device, status);
        }
        Ok(())
    }
}

#[async_trait]
impl PartitionDaemon for MpsDaemon {
    /// Clears stale daemons first, then starts one per device.
    async fn start(&self, devices: &[Device]) -> Result<()> {
        if let Err(e) = self.stop(devices).await {
            tracing::debug!("stale daemon cleanup: {:#}", e);
        }
        for d in devices {
            let dir = pipe_dir_for(&self.pipe_dir, &d.name);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create pipe dir {}", dir.display()))?;
            println!("Initializing MPS server for {}", d.name);
            self.start_one(&d.name).await?;
        }
        Ok(())
    }

    /// Best effort across devices; reports the first failure after trying all.
    async fn stop(&self, devices: &[Device]) -> Result<()> {
        let mut first_err = None;
        for d in devices {
            println!("Destroying MPS server for {}", d.name);
            if let Err(e) = self.stop_one(&d.name).await {
                tracing::warn!(device = %d.name, "could not stop daemon: {:#}", e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Used when daemon control is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDaemon;

#[async_trait]
impl PartitionDaemon for NoopDaemon {
    async fn start(&self, _devices: &[Device]) -> Result<()> {
        Ok(())
    }

    async fn stop(&self, _devices: &[Device]) -> Result<()> {
        Ok(())
    }
}
