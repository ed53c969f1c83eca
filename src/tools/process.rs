//! Child process execution with a hard timeout
//!
//! - stdout and stderr drained concurrently, capped per stream
//! - on timeout the whole process group is killed (unix) and whatever was
//!   captured so far is returned
//! - one child per call, never reused

use crate::types::{ExecutionMethod, ExecutionResult};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

/// Default per-stream capture cap (8MB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

/// How long to wait for pipes to close after the child is gone
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Capture settings for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    pub max_output_bytes: usize,
    pub drain_grace: Duration,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Background reader for one output stream
struct StreamCapture {
    buffer: Arc<Mutex<Captured>>,
    task: Option<JoinHandle<()>>,
}

fn lock(buffer: &Mutex<Captured>) -> std::sync::MutexGuard<'_, Captured> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StreamCapture {
    fn spawn<R>(reader: Option<R>, max_bytes: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Captured::default()));
        let task = reader.map(|mut reader| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    let n = match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    // keep draining past the cap so the child never blocks on a full pipe
                    let mut captured = lock(&buffer);
                    let room = max_bytes.saturating_sub(captured.bytes.len());
                    let take = n.min(room);
                    captured.bytes.extend_from_slice(&chunk[..take]);
                    if take < n {
                        captured.truncated = true;
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait up to `grace` for EOF, then return what was read
    async fn finish(self, grace: Duration) -> (String, bool) {
        if let Some(mut task) = self.task {
            if timeout(grace, &mut task).await.is_err() {
                // a grandchild still holds the pipe open
                task.abort();
            }
        }
        let captured = std::mem::take(&mut *lock(&self.buffer));
        (
            String::from_utf8_lossy(&captured.bytes).into_owned(),
            captured.truncated,
        )
    }
}

/// Run `cmd` to completion or until `limit` elapses
///
/// Spawn failures surface as `Err`; a timeout is a normal result with
/// `timed_out` set.
pub async fn run_captured(
    mut cmd: Command,
    limit: Duration,
    capture: CaptureLimits,
    method: ExecutionMethod,
) -> std::io::Result<ExecutionResult> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // own process group, so a timeout can take down the whole tree
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn()?;
    let pid = child.id();
    debug!(?pid, ?method, "Spawned child process");

    let stdout = StreamCapture::spawn(child.stdout.take(), capture.max_output_bytes);
    let stderr = StreamCapture::spawn(child.stderr.take(), capture.max_output_bytes);

    let status = match timeout(limit, child.wait()).await {
        Ok(status) => Some(status?),
        Err(_) => {
            debug!(?pid, limit_ms = limit.as_millis() as u64, "Timeout reached, terminating");
            terminate(&mut child).await;
            None
        }
    };
    let elapsed = start.elapsed();

    let (stdout, stdout_truncated) = stdout.finish(capture.drain_grace).await;
    let (stderr, stderr_truncated) = stderr.finish(capture.drain_grace).await;

    let result = match status {
        Some(status) => ExecutionResult::completed(exit_code(status), stdout, stderr, elapsed, method),
        None => ExecutionResult::timed_out(stdout, stderr, elapsed, limit, method),
    };
    Ok(result.with_truncated(stdout_truncated || stderr_truncated))
}

fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code()
}

/// Kill the child's process group and reap the child
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg only sends a signal; the group id is our own child's pid
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
        }
    }

    if let Err(e) = child.kill().await {
        debug!(error = %e, "Child already gone");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    async fn run(script: &str, limit: Duration) -> ExecutionResult {
        run_captured(sh(script), limit, CaptureLimits::default(), ExecutionMethod::HostBinary)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let result = run("echo out; echo err >&2; exit 3", Duration::from_secs(5)).await;
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.timed_out);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn test_timeout_returns_partial_output() {
        let start = Instant::now();
        let result = run("echo early; sleep 5; echo late", Duration::from_millis(500)).await;

        assert!(result.timed_out);
        assert!(result.exit_code.is_none());
        assert_eq!(result.stdout, "early\n");
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        // the backgrounded sleep would hold stdout open if it survived
        let start = Instant::now();
        let result = run("sleep 5 & sleep 5; wait", Duration::from_millis(300)).await;
        assert!(result.timed_out);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_output_cap() {
        let capture = CaptureLimits {
            max_output_bytes: 10,
            drain_grace: DEFAULT_DRAIN_GRACE,
        };
        let result = run_captured(
            sh("head -c 100000 /dev/zero | tr '\\0' 'a'"),
            Duration::from_secs(5),
            capture,
            ExecutionMethod::HostBinary,
        )
        .await
        .unwrap();

        assert_eq!(result.stdout, "aaaaaaaaaa");
        assert!(result.truncated);
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let cmd = Command::new("/nonexistent/toolgate-test-binary");
        let result = run_captured(
            cmd,
            Duration::from_secs(1),
            CaptureLimits::default(),
            ExecutionMethod::HostBinary,
        )
        .await;
        assert!(result.is_err());
    }
}
