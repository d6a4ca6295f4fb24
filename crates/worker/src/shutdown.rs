//! Termination signals for a running sweep.
//!
//! Both SIGINT and SIGTERM cancel the sweep's token, so the sweep drains its
//! in-flight measurements and returns normally. Returning normally is what
//! lets the lock guard remove its marker.

use std::io;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Installed handlers for the signals that stop a sweep.
///
/// Handlers are registered by [`ShutdownSignal::install`], not on first
/// poll, so a signal arriving right after startup is not lost.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Register the handlers. Must be called from within a Tokio runtime.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the first termination signal and return its name.
    #[cfg(unix)]
    pub async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(self) -> &'static str {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        "Ctrl-C"
    }
}

/// Cancel `cancel` when `signal` fires.
pub fn cancel_on_shutdown(signal: ShutdownSignal, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = signal.recv().await;
        tracing::warn!(signal = name, "Shutdown requested, draining in-flight measurements");
        cancel.cancel();
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn sigterm_cancels_the_sweep() {
        let cancel = CancellationToken::new();
        let handle = cancel_on_shutdown(ShutdownSignal::install().unwrap(), cancel.clone());

        // SAFETY: sends a signal to this process, whose handler is installed.
        let rc = unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };
        assert_eq!(rc, 0);

        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .unwrap();
        handle.await.unwrap();
    }
}
