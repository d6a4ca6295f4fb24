//! Run status transitions for one run within a sweep.
//!
//! A [`RunLifecycle`] holds a single pooled connection for the whole time a
//! run is being processed. Status and control queries for that run go
//! through it; the connection returns to the pool when the lifecycle is
//! dropped, whichever way processing ends.

use std::future::Future;

use geogrid_core::retry::{retry_with, RetryPolicy, STATUS_UPDATE_POLICY};
use geogrid_core::types::DbId;
use geogrid_db::models::status::RunStatus;
use geogrid_db::repositories::GeoGridRunRepo;
use geogrid_db::DbPool;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, Postgres};
use tokio::sync::Mutex;

/// Result of one status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The run was not in a status that allows the move.
    Rejected,
    /// Storage kept failing after every retry.
    Failed,
}

impl Transition {
    pub fn is_applied(self) -> bool {
        self == Self::Applied
    }
}

/// Status manager for one run, pinned to one connection.
pub struct RunLifecycle {
    run_id: DbId,
    conn: PoolConnection<Postgres>,
    policy: RetryPolicy,
}

impl RunLifecycle {
    /// Check out the run's connection.
    ///
    /// Not retried: if the pool cannot hand out a connection the run is
    /// skipped for this sweep.
    pub async fn attach(pool: &DbPool, run_id: DbId) -> Result<Self, sqlx::Error> {
        let conn = pool.acquire().await?;
        Ok(Self {
            run_id,
            conn,
            policy: STATUS_UPDATE_POLICY,
        })
    }

    /// Override the retry policy for status writes.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn run_id(&self) -> DbId {
        self.run_id
    }

    /// The pinned connection, for the run's control queries.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    pub async fn mark_running(&mut self) -> Transition {
        self.transition(RunStatus::Running).await
    }

    pub async fn mark_done(&mut self) -> Transition {
        self.transition(RunStatus::Done).await
    }

    pub async fn mark_error(&mut self) -> Transition {
        self.transition(RunStatus::Error).await
    }

    /// Apply `status`, retrying transient failures with the lifecycle's
    /// backoff. A guard rejection is final and not retried.
    async fn transition(&mut self, status: RunStatus) -> Transition {
        let run_id = self.run_id;
        // The retried closure is called once per attempt; the lock lends the
        // pinned connection to whichever attempt is running.
        let conn = Mutex::new(&mut *self.conn);
        let conn = &conn;
        apply_transition(run_id, status, self.policy, move || async move {
            let mut conn = conn.lock().await;
            GeoGridRunRepo::update_status(&mut **conn, run_id, status).await
        })
        .await
    }
}

/// Run one guarded status update under `policy`.
///
/// `update` reports whether the guard accepted the move. Only storage errors
/// are retried; `Ok(false)` ends the transition as [`Transition::Rejected`].
async fn apply_transition<F, Fut>(run_id: DbId, status: RunStatus, policy: RetryPolicy, mut update: F) -> Transition
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, sqlx::Error>>,
{
    let result = retry_with(
        policy,
        |_| update(),
        |attempt, e: &sqlx::Error, will_retry| {
            if will_retry {
                tracing::warn!(
                    run_id,
                    status = %status,
                    attempt,
                    retry_in_ms = policy.delay_after(attempt).as_millis() as u64,
                    error = %e,
                    "Run status update failed, retrying",
                );
            } else {
                tracing::error!(run_id, status = %status, attempt, error = %e, "Run status update failed, giving up");
            }
        },
    )
    .await;

    match result {
        Ok(true) => {
            tracing::info!(run_id, status = %status, "Run status updated");
            Transition::Applied
        }
        Ok(false) => {
            tracing::warn!(run_id, status = %status, "Run status change rejected by current status");
            Transition::Rejected
        }
        Err(_) => Transition::Failed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;

    /// Replays `results` one per call and counts the calls.
    async fn replay(results: Vec<Result<bool, sqlx::Error>>, policy: RetryPolicy) -> (Transition, u32) {
        let calls = Cell::new(0);
        let mut results = VecDeque::from(results);
        let transition = apply_transition(1, RunStatus::Running, policy, || {
            calls.set(calls.get() + 1);
            let result = results.pop_front().unwrap_or(Err(sqlx::Error::PoolTimedOut));
            async move { result }
        })
        .await;
        (transition, calls.get())
    }

    #[tokio::test(start_paused = true)]
    async fn storage_errors_are_retried_with_linear_backoff() {
        let start = Instant::now();
        let (transition, calls) = replay(vec![], STATUS_UPDATE_POLICY).await;

        assert_eq!(transition, Transition::Failed);
        assert_eq!(calls, 3);
        // 1s after the first failure, 2s after the second.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_a_transient_error() {
        let start = Instant::now();
        let (transition, calls) = replay(vec![Err(sqlx::Error::PoolTimedOut), Ok(true)], STATUS_UPDATE_POLICY).await;

        assert_eq!(transition, Transition::Applied);
        assert_eq!(calls, 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_is_not_retried() {
        let start = Instant::now();
        let (transition, calls) = replay(vec![Ok(false)], STATUS_UPDATE_POLICY).await;

        assert_eq!(transition, Transition::Rejected);
        assert_eq!(calls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn applied_on_first_attempt() {
        let (transition, calls) = replay(vec![Ok(true)], STATUS_UPDATE_POLICY).await;
        assert!(transition.is_applied());
        assert_eq!(calls, 1);
    }
}
