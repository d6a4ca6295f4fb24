//! One sweep over every active run.
//!
//! For each queued or running run, oldest first: pin a connection, mark the
//! run running, make sure its grid exists, measure its unranked points, then
//! mark it done once a fresh count confirms nothing is left unranked.
//! Failures of one run never stop the sweep over the others.

use std::sync::Arc;

use geogrid_core::measure::{MeasureConfig, PointTarget};
use geogrid_core::retry::{RetryPolicy, MEASUREMENT_POLICY, STATUS_UPDATE_POLICY};
use geogrid_db::models::run::GeoGridRun;
use geogrid_db::persistence::PointWriter;
use geogrid_db::repositories::{BusinessRepo, GeoGridPointRepo, GeoGridRunRepo};
use geogrid_db::DbPool;
use tokio_util::sync::CancellationToken;

use crate::config::{ExecutionMode, OrchestratorConfig};
use crate::error::OrchestratorError;
use crate::executor::{MeasureExecutor, ProcessExecutor};
use crate::lifecycle::{RunLifecycle, Transition};
use crate::lock::{read_holder, LockGuard};
use crate::planner::{ensure_grid, GridState};
use crate::pool::{RunContext, SweepReport, WorkerPool};
use crate::sequential::measure_sequentially;
use crate::sink::PointSink;

/// How one run ended within a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Done,
    /// Points are still unranked; the run stays `running` for the next sweep.
    Incomplete { remaining: i64 },
    Errored,
    /// Not processed to the end this sweep (no connection, status update
    /// failed or rejected, storage failure while measuring).
    Skipped,
    /// Stopped by shutdown; left `running`.
    Cancelled,
}

/// Totals for a whole sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub runs: usize,
    pub done: usize,
    pub incomplete: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl SweepSummary {
    fn add(&mut self, result: RunResult) {
        self.runs += 1;
        match result {
            RunResult::Done => self.done += 1,
            RunResult::Incomplete { .. } | RunResult::Cancelled => self.incomplete += 1,
            RunResult::Errored => self.errored += 1,
            RunResult::Skipped => self.skipped += 1,
        }
    }
}

/// Tunables for a sweep.
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub max_concurrency: usize,
    pub execution_mode: ExecutionMode,
    pub proxy_url: Option<String>,
    pub measurement_policy: RetryPolicy,
    pub status_policy: RetryPolicy,
}

impl SweepSettings {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            execution_mode: config.execution_mode,
            proxy_url: config.proxy_url.clone(),
            measurement_policy: MEASUREMENT_POLICY,
            status_policy: STATUS_UPDATE_POLICY,
        }
    }
}

/// Drives sweeps over the active runs in one database.
pub struct Orchestrator<E, S> {
    pool: DbPool,
    executor: Arc<E>,
    sink: Arc<S>,
    settings: SweepSettings,
}

impl<E: MeasureExecutor, S: PointSink + 'static> Orchestrator<E, S> {
    pub fn new(pool: DbPool, executor: Arc<E>, sink: Arc<S>, settings: SweepSettings) -> Self {
        Self {
            pool,
            executor,
            sink,
            settings,
        }
    }

    /// Process every active run once.
    ///
    /// Only the initial listing of runs can fail the sweep; everything after
    /// that is contained per run.
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<SweepSummary, OrchestratorError> {
        let runs = GeoGridRunRepo::list_active(&self.pool).await?;
        tracing::info!(active_runs = runs.len(), "Sweep started");

        let mut summary = SweepSummary::default();
        for run in &runs {
            if cancel.is_cancelled() {
                tracing::warn!("Sweep cancelled, remaining runs left for next sweep");
                break;
            }
            let result = self.process_run(run, cancel).await;
            tracing::info!(run_id = run.id, result = ?result, "Run processed");
            summary.add(result);
        }

        tracing::info!(
            runs = summary.runs,
            done = summary.done,
            incomplete = summary.incomplete,
            errored = summary.errored,
            skipped = summary.skipped,
            "Sweep finished",
        );
        Ok(summary)
    }

    /// Take one run through running, measurement and completion.
    pub async fn process_run(&self, run: &GeoGridRun, cancel: &CancellationToken) -> RunResult {
        let mut lifecycle = match RunLifecycle::attach(&self.pool, run.id).await {
            Ok(lifecycle) => lifecycle.with_policy(self.settings.status_policy),
            Err(e) => {
                tracing::error!(run_id = run.id, error = %e, "No connection for run, skipping");
                return RunResult::Skipped;
            }
        };

        if lifecycle.mark_running().await != Transition::Applied {
            return RunResult::Skipped;
        }

        match self.measure_run(&mut lifecycle, run, cancel).await {
            Ok(report) if report.skipped > 0 => RunResult::Cancelled,
            Ok(_) => self.complete(&mut lifecycle).await,
            Err(e) if !e.ends_run() => {
                tracing::warn!(run_id = run.id, error = %e, "Run interrupted, left for next sweep");
                RunResult::Skipped
            }
            Err(e) => {
                tracing::error!(run_id = run.id, error = %e, "Run failed");
                match lifecycle.mark_error().await {
                    Transition::Applied => RunResult::Errored,
                    Transition::Rejected | Transition::Failed => RunResult::Skipped,
                }
            }
        }
    }

    /// Build the grid if needed and measure every unranked point.
    async fn measure_run(
        &self,
        lifecycle: &mut RunLifecycle,
        run: &GeoGridRun,
        cancel: &CancellationToken,
    ) -> Result<SweepReport, OrchestratorError> {
        if ensure_grid(lifecycle.conn(), run).await? == GridState::Empty {
            tracing::info!(run_id = run.id, "Run has an empty grid");
            return Ok(SweepReport::default());
        }

        let points: Vec<PointTarget> = GeoGridPointRepo::list_unranked(lifecycle.conn(), run.id)
            .await?
            .into_iter()
            .map(PointTarget::from)
            .collect();
        if points.is_empty() {
            return Ok(SweepReport::default());
        }

        let business_name = BusinessRepo::find_by_id(lifecycle.conn(), run.business_id)
            .await?
            .map(|b| b.name)
            .unwrap_or_default();
        let ctx = RunContext {
            run_id: run.id,
            keyword: run.keyword.clone(),
            config: MeasureConfig {
                proxy: self.settings.proxy_url.clone(),
                business_id: run.business_id,
                business_name,
            },
        };

        match self.settings.execution_mode {
            ExecutionMode::Pool => {
                let pool = WorkerPool::new(
                    Arc::clone(&self.executor),
                    Arc::clone(&self.sink),
                    self.settings.max_concurrency,
                )
                .with_policy(self.settings.measurement_policy);
                Ok(pool.run(&ctx, points, cancel).await)
            }
            ExecutionMode::Sequential => {
                measure_sequentially(
                    self.executor.as_ref(),
                    self.sink.as_ref(),
                    &ctx,
                    points,
                    self.settings.measurement_policy,
                    cancel,
                )
                .await
            }
        }
    }

    /// Mark the run done if a fresh count finds no unranked points.
    async fn complete(&self, lifecycle: &mut RunLifecycle) -> RunResult {
        let run_id = lifecycle.run_id();
        let remaining = match GeoGridPointRepo::count_unranked(lifecycle.conn(), run_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(run_id, error = %e, "Failed to count unranked points");
                return RunResult::Skipped;
            }
        };

        if remaining > 0 {
            tracing::info!(run_id, remaining, "Run still has unranked points, left running");
            return RunResult::Incomplete { remaining };
        }

        match lifecycle.mark_done().await {
            Transition::Applied => RunResult::Done,
            Transition::Rejected | Transition::Failed => RunResult::Skipped,
        }
    }
}

/// Run one full sweep as a process: take the lock, connect, sweep.
///
/// Returns `Ok(None)` without touching storage when another instance holds
/// the lock. The lock is released before this returns.
pub async fn run_once(
    config: &OrchestratorConfig,
    cancel: &CancellationToken,
) -> Result<Option<SweepSummary>, OrchestratorError> {
    let Some(_lock) = LockGuard::acquire(&config.lock_path).map_err(OrchestratorError::Lock)? else {
        let holder = read_holder(&config.lock_path).map(|info| info.pid);
        tracing::info!(
            path = %config.lock_path.display(),
            holder_pid = ?holder,
            "Another orchestrator holds the lock, exiting",
        );
        return Ok(None);
    };
    tracing::info!(path = %config.lock_path.display(), "Lock acquired");

    let pool = geogrid_db::create_pool(&config.database_url, config.db_max_connections).await?;
    geogrid_db::health_check(&pool).await?;
    if config.run_migrations {
        geogrid_db::run_migrations(&pool).await?;
        tracing::info!("Migrations applied");
    }

    let executor = Arc::new(ProcessExecutor::new(config.resolver.clone(), config.task_timeout));
    let writer = Arc::new(PointWriter::new(pool.clone()));
    let orchestrator = Orchestrator::new(pool.clone(), executor, writer, SweepSettings::from_config(config));

    let summary = orchestrator.sweep(cancel).await;
    pool.close().await;

    let summary = summary?;
    if cancel.is_cancelled() {
        return Err(OrchestratorError::Cancelled);
    }
    Ok(Some(summary))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_each_result() {
        let mut summary = SweepSummary::default();
        for result in [
            RunResult::Done,
            RunResult::Done,
            RunResult::Incomplete { remaining: 2 },
            RunResult::Cancelled,
            RunResult::Errored,
            RunResult::Skipped,
        ] {
            summary.add(result);
        }
        assert_eq!(
            summary,
            SweepSummary {
                runs: 6,
                done: 2,
                incomplete: 2,
                errored: 1,
                skipped: 1,
            }
        );
    }

    #[tokio::test]
    async fn held_lock_exits_without_touching_storage() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("sweep.lock");
        let _held = LockGuard::acquire(&lock_path).unwrap().unwrap();

        let config = OrchestratorConfig::from_lookup(|key| match key {
            // Unreachable database: connecting would fail the call.
            "DATABASE_URL" => Some("postgres://127.0.0.1:1/none".into()),
            "RANK_RESOLVER_CMD" => Some("/bin/true".into()),
            "GEOGRID_LOCK_PATH" => Some(lock_path.display().to_string()),
            _ => None,
        })
        .unwrap();

        let result = run_once(&config, &CancellationToken::new()).await.unwrap();
        assert!(result.is_none());
        assert!(lock_path.exists());
    }
}
