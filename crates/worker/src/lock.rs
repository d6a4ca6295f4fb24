//! Singleton guard for the orchestrator process.
//!
//! The lock is a marker file created with `O_EXCL` semantics and holding the
//! owner's PID. Presence of the file means another sweep is active. The file
//! is removed when the guard is dropped, which covers normal returns, error
//! returns and unwinding panics. A marker left behind by a process that was
//! killed outright (SIGKILL, power loss) names a PID that no longer exists;
//! such a marker is stale and is taken over.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Contents of the lock marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: String,
}

/// Exclusive ownership of the orchestrator lock marker.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Try to take the lock at `path`.
    ///
    /// Returns `Ok(None)` if the marker already exists and its holder is
    /// alive or unknown. Other I/O failures (missing directory, permissions)
    /// are errors.
    pub fn acquire(path: impl AsRef<Path>) -> io::Result<Option<Self>> {
        let path = path.as_ref();
        if let Some(guard) = Self::create(path)? {
            return Ok(Some(guard));
        }

        let Some(holder) = read_holder(path) else {
            return Ok(None);
        };
        if process_alive(holder.pid) {
            return Ok(None);
        }

        // Only remove the marker we judged stale, not one a concurrent
        // instance has just written in its place.
        if read_holder(path).as_ref() != Some(&holder) {
            return Ok(None);
        }
        tracing::warn!(
            path = %path.display(),
            stale_pid = holder.pid,
            acquired_at = %holder.acquired_at,
            "Removing stale lock left by a dead process",
        );
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Self::create(path)
    }

    /// Create the marker, or `Ok(None)` if it already exists.
    fn create(path: &Path) -> io::Result<Option<Self>> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e),
        };

        // From here on the guard owns the file and removes it on any exit.
        let guard = Self {
            path: path.to_path_buf(),
        };
        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: chrono::Utc::now().to_rfc3339(),
        };
        let payload = serde_json::to_vec(&info).map_err(io::Error::other)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        Ok(Some(guard))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Lock released"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove lock file",
            ),
        }
    }
}

/// Read the marker of whoever holds the lock, if it is readable.
pub fn read_holder(path: impl AsRef<Path>) -> Option<LockInfo> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only checks that the process exists.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    // EPERM: it exists but belongs to someone else.
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
