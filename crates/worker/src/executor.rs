//! Isolated measurement of one grid point.
//!
//! [`ProcessExecutor`] runs the rank-resolver collaborator as a child
//! process per attempt: the [`MeasureRequest`] is written to its stdin as
//! JSON, a [`ResolverOutput`] is read back from stdout. A crash or hang in
//! the collaborator is confined to that child, which is killed when the
//! attempt times out.

use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};

use geogrid_core::measure::{MeasureRequest, Measurement, ResolverOutput};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

use crate::config::ResolverCommand;

/// Maximum stdout or stderr captured per stream (4 MiB).
const MAX_OUTPUT_BYTES: u64 = 4 * 1024 * 1024;

/// Longest stderr excerpt carried in an error.
const STDERR_EXCERPT_CHARS: usize = 500;

/// Errors from one measurement attempt. All of them are retryable.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    #[error("Failed to spawn rank resolver: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("I/O error talking to rank resolver: {0}")]
    Io(#[source] std::io::Error),

    #[error("Rank resolver timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Rank resolver exited with code {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },

    #[error("Rank resolver printed malformed output: {0}")]
    MalformedOutput(String),

    /// The task running the attempt died (panicked or was aborted).
    #[error("Measurement task crashed: {0}")]
    Crashed(String),
}

/// Measures a single point.
///
/// Implementations must be cheap to share: the pool holds one instance
/// behind an `Arc` and calls it from many tasks at once.
pub trait MeasureExecutor: Send + Sync + 'static {
    fn measure(
        &self,
        request: MeasureRequest,
    ) -> impl Future<Output = Result<Measurement, MeasureError>> + Send;
}

/// Runs the rank-resolver executable once per attempt.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    command: ResolverCommand,
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(command: ResolverCommand, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

impl MeasureExecutor for ProcessExecutor {
    async fn measure(&self, request: MeasureRequest) -> Result<Measurement, MeasureError> {
        let input = serde_json::to_vec(&request)
            .map_err(|e| MeasureError::MalformedOutput(format!("request encoding: {e}")))?;

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so anything the resolver launches is killed
        // with it on timeout.
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(MeasureError::Spawn)?;
        let pgid = child.id();

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // One deadline covers the exit and both pipes: a descendant holding
        // stdout open must not outlive the attempt.
        let attempt = async {
            let (_, status, stdout, stderr) = tokio::join!(
                write_request(stdin, &input),
                child.wait(),
                read_stream(stdout),
                read_stream(stderr),
            );
            status.map(|status| (status, stdout, stderr))
        };

        let (status, stdout, stderr) = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return Err(MeasureError::Io(e)),
            Err(_) => {
                kill_process_group(pgid);
                // Dropping `child` kills the resolver itself.
                return Err(MeasureError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(MeasureError::Failed {
                exit_code: status.code().unwrap_or(-1),
                stderr: stderr.trim().chars().take(STDERR_EXCERPT_CHARS).collect(),
            });
        }

        parse_output(&stdout).map(Measurement::from)
    }
}

/// Parse the resolver's stdout. The last non-empty line must be the JSON
/// result so that the resolver may log freely before it.
fn parse_output(stdout: &[u8]) -> Result<ResolverOutput, MeasureError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or_else(|| MeasureError::MalformedOutput("empty stdout".to_string()))?;
    serde_json::from_str(line).map_err(|e| MeasureError::MalformedOutput(e.to_string()))
}

async fn write_request<W: AsyncWrite + Unpin>(handle: Option<W>, input: &[u8]) {
    if let Some(mut stdin) = handle {
        // The resolver may exit without reading; its exit status decides.
        let _ = stdin.write_all(input).await;
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: Option<u32>) {
    let Some(pgid) = pgid.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created for this
    // attempt's resolver.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        tracing::debug!(pgid, error = %std::io::Error::last_os_error(), "Failed to kill resolver process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: Option<u32>) {}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
