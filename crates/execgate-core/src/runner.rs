//! Process runner boundary.
//!
//! The engine decides *what* may run; a [`ProcessRunner`] executes it.
//! The contract: a finite timeout after which the child is killed and
//! the result marked `timed_out`, byte-limited capture flagged as
//! `truncated`, and cancellation prior to spawn short-circuiting to a
//! non-executed result. Transient spawn failures are the runner's
//! concern and are never re-evaluated against policy.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use execgate_types::{ExecutionPlan, RunResult};

/// Per-run options handed to the runner alongside the plan.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory for the child process.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the child.
    pub env: HashMap<String, String>,
    /// Timeout in milliseconds; the child is killed when it elapses.
    pub timeout_ms: u64,
    /// Caller abort signal, honored before spawn.
    pub cancel: Option<CancellationToken>,
}

/// Executes an [`ExecutionPlan`] and captures its output.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, plan: &ExecutionPlan, options: RunOptions) -> RunResult;
}

/// Native runner using [`tokio::process`].
pub struct NativeRunner {
    /// Byte cap applied to each captured stream.
    pub max_output_bytes: usize,
}

impl NativeRunner {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

impl Default for NativeRunner {
    fn default() -> Self {
        Self::new(200_000)
    }
}

#[async_trait]
impl ProcessRunner for NativeRunner {
    async fn run(&self, plan: &ExecutionPlan, options: RunOptions) -> RunResult {
        let Some((program, args)) = plan.argv.split_first() else {
            return RunResult::not_executed("empty argv");
        };

        if let Some(cancel) = &options.cancel
            && cancel.is_cancelled()
        {
            debug!(program, "run cancelled before spawn");
            return RunResult::not_executed("cancelled before spawn");
        }

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .envs(&options.env)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(program, error = %err, "failed to spawn process");
                return RunResult::not_executed(format!("failed to spawn process: {err}"));
            }
        };

        // Take the handles before awaiting so the child can still be
        // killed on timeout and partial output read afterwards.
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        let wait = tokio::time::timeout(Duration::from_millis(options.timeout_ms), child.wait())
            .await;

        let (exit_code, timed_out, error) = match wait {
            Ok(Ok(status)) => (status.code().unwrap_or(-1), false, None),
            Ok(Err(err)) => (-1, false, Some(format!("process error: {err}"))),
            Err(_) => {
                let _ = child.kill().await;
                (-1, true, None)
            }
        };

        let (stdout, out_clipped) = read_clipped(stdout_handle, self.max_output_bytes).await;
        let (stderr, err_clipped) = read_clipped(stderr_handle, self.max_output_bytes).await;

        RunResult {
            success: exit_code == 0 && !timed_out && error.is_none(),
            stdout,
            stderr,
            exit_code,
            timed_out,
            truncated: out_clipped || err_clipped,
            error,
        }
    }
}

async fn read_clipped<R: tokio::io::AsyncRead + Unpin>(
    handle: Option<R>,
    limit: usize,
) -> (String, bool) {
    let Some(mut handle) = handle else {
        return (String::new(), false);
    };
    let mut buf = Vec::new();
    if handle.read_to_end(&mut buf).await.is_err() {
        return (String::new(), false);
    }
    let clipped = buf.len() > limit;
    if clipped {
        buf.truncate(limit);
    }
    (String::from_utf8_lossy(&buf).into_owned(), clipped)
}

// ── Tests ───────────────────────────────────────────────────────────────
