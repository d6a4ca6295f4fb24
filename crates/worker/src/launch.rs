//! Fire-and-forget start of a sweep from another process.
//!
//! Callers that have just created a run (the web API) use this to request an
//! immediate sweep. The orchestrator's own lock decides whether the launched
//! process actually does anything.

use std::ffi::OsStr;
use std::io;
use std::process::{Command, Stdio};

/// Spawn `program` detached from the caller and return its PID.
///
/// Stdio is redirected to null and the child is not awaited. A background
/// thread reaps it when it exits so no zombie is left behind.
pub fn spawn_detached(program: impl AsRef<OsStr>) -> io::Result<u32> {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

    // Own process group: a Ctrl-C aimed at the caller does not reach the sweep.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn()?;
    let pid = child.id();
    tracing::info!(pid, "Orchestrator launched");

    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(pid)
}
