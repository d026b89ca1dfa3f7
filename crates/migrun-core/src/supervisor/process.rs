//! One spawned worker: child handle plus background output capture.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::command::WorkerCommand;

/// How long to wait for a finished worker's pipes to close. A worker that left a
/// background child holding its stdout/stderr would otherwise block reaping.
pub(super) const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

type Capture = JoinHandle<io::Result<Vec<u8>>>;

/// Live worker process. Both output streams are drained by tasks from the
/// moment of spawn so a worker never stalls on a full pipe.
pub(super) struct TrackedProcess {
    child: Child,
    stdout: Capture,
    stderr: Capture,
}

/// Captured output of a reaped worker.
pub(super) struct Reaped {
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
}

fn capture<R>(stream: Option<R>) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut s) = stream {
            s.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

async fn collect(name: &str, uid: &str, mut handle: Capture) -> String {
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(Ok(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Ok(Err(e))) => {
            tracing::warn!(uid, "could not read {} of worker: {}", name, e);
            String::new()
        }
        Ok(Err(e)) => {
            tracing::warn!(uid, "{} capture task failed: {}", name, e);
            String::new()
        }
        Err(_) => {
            handle.abort();
            tracing::warn!(uid, "{} of worker still open after exit; output dropped", name);
            String::new()
        }
    }
}

impl TrackedProcess {
    pub fn spawn(cmd: &WorkerCommand) -> io::Result<Self> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(cmd.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command.spawn()?;
        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());
        Ok(Self {
            child,
            stdout,
            stderr,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking exit check.
    pub fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    /// Send SIGKILL if the process is still running.
    pub fn kill(&mut self) -> io::Result<()> {
        if self.has_exited()? {
            return Ok(());
        }
        self.child.start_kill()
    }

    /// Wait for exit and collect both streams. Consumes the handle, so a process
    /// cannot be reaped twice.
    pub async fn reap(mut self, uid: &str) -> Reaped {
        let status = match self.child.wait().await {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(uid, "could not wait for worker: {}", e);
                None
            }
        };
        let stdout = collect("stdout", uid, self.stdout).await;
        let stderr = collect("stderr", uid, self.stderr).await;
        Reaped {
            status,
            stdout,
            stderr,
        }
    }
}
