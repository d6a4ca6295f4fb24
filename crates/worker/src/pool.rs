//! Bounded pool of isolated measurement tasks for one run.
//!
//! Each point is measured by its own Tokio task, itself watched by a small
//! supervisor task. The supervisor turns whatever happens to the measurement
//! task (result, error, panic) into a [`TaskOutcome`] and sends it back over
//! a channel. The dispatcher never shares state with tasks; it only counts
//! in-flight slots and applies outcomes as they arrive.

use std::collections::VecDeque;
use std::sync::Arc;

use geogrid_core::measure::{MeasureConfig, MeasureRequest, PointTarget, TaskOutcome};
use geogrid_core::retry::{retry_with, RetryPolicy, MEASUREMENT_POLICY};
use geogrid_core::types::DbId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::executor::{MeasureError, MeasureExecutor};
use crate::sink::PointSink;

/// Everything a measurement task needs besides its point.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: DbId,
    pub keyword: String,
    pub config: MeasureConfig,
}

impl RunContext {
    pub fn request(&self, point: &PointTarget) -> MeasureRequest {
        MeasureRequest {
            run_id: self.run_id,
            point_id: point.point_id,
            keyword: self.keyword.clone(),
            origin: point.coords,
            config: self.config.clone(),
        }
    }
}

/// Counters for one run's measurement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub dispatched: usize,
    /// Points written with a positive rank.
    pub measured: usize,
    /// Points the resolver answered for without finding the business.
    pub not_found: usize,
    /// Points whose measurement or write failed; left unranked.
    pub failed: usize,
    /// Points never dispatched because the sweep was cancelled.
    pub skipped: usize,
    pub peak_in_flight: usize,
}

/// Dispatches a run's unranked points over at most `max_concurrency`
/// isolated tasks.
pub struct WorkerPool<E, S> {
    executor: Arc<E>,
    sink: S,
    max_concurrency: usize,
    policy: RetryPolicy,
}

impl<E: MeasureExecutor, S: PointSink> WorkerPool<E, S> {
    pub fn new(executor: Arc<E>, sink: S, max_concurrency: usize) -> Self {
        Self {
            executor,
            sink,
            max_concurrency: max_concurrency.max(1),
            policy: MEASUREMENT_POLICY,
        }
    }

    /// Override the per-point retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Measure `points` in order, keeping at most `max_concurrency` in
    /// flight.
    ///
    /// Per-point failures are counted, never returned. Cancellation stops
    /// new dispatches; tasks already in flight are drained and applied.
    pub async fn run(
        &self,
        ctx: &RunContext,
        points: Vec<PointTarget>,
        cancel: &CancellationToken,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        let mut pending: VecDeque<PointTarget> = points.into();
        let (tx, mut rx) = mpsc::channel::<TaskOutcome>(self.max_concurrency);
        let mut in_flight = 0usize;

        tracing::info!(
            run_id = ctx.run_id,
            points = pending.len(),
            max_concurrency = self.max_concurrency,
            "Starting measurement pool",
        );

        loop {
            while in_flight < self.max_concurrency && !cancel.is_cancelled() {
                let Some(point) = pending.pop_front() else {
                    break;
                };
                self.dispatch(ctx, &point, tx.clone());
                in_flight += 1;
                report.dispatched += 1;
                report.peak_in_flight = report.peak_in_flight.max(in_flight);
                tracing::debug!(run_id = ctx.run_id, point_id = point.point_id, in_flight, "Point dispatched");
            }

            if in_flight == 0 {
                break;
            }

            // The dispatcher holds `tx`, so the channel cannot close here.
            let Some(outcome) = rx.recv().await else {
                break;
            };
            in_flight -= 1;
            self.apply(ctx.run_id, outcome, &mut report).await;
        }

        report.skipped = pending.len();
        if report.skipped > 0 {
            tracing::warn!(
                run_id = ctx.run_id,
                skipped = report.skipped,
                "Measurement pool cancelled with points pending",
            );
        }
        tracing::info!(
            run_id = ctx.run_id,
            dispatched = report.dispatched,
            measured = report.measured,
            not_found = report.not_found,
            failed = report.failed,
            peak_in_flight = report.peak_in_flight,
            "Measurement pool finished",
        );
        report
    }

    /// Start a supervised measurement task for `point`.
    fn dispatch(&self, ctx: &RunContext, point: &PointTarget, tx: mpsc::Sender<TaskOutcome>) {
        let point_id = point.point_id;
        let run_id = ctx.run_id;
        let request = ctx.request(point);
        let task = tokio::spawn(measure_with_retry(Arc::clone(&self.executor), request, self.policy));

        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(run_id, point_id, error = %e, "Measurement task crashed");
                    TaskOutcome::Error {
                        point_id,
                        message: MeasureError::Crashed(e.to_string()).to_string(),
                    }
                }
            };
            // Only fails if the dispatcher is gone, in which case nobody
            // is waiting for the result.
            let _ = tx.send(outcome).await;
        });
    }

    async fn apply(&self, run_id: DbId, outcome: TaskOutcome, report: &mut SweepReport) {
        match outcome {
            TaskOutcome::Done {
                point_id,
                measurement,
            } => {
                let rank = measurement.rank;
                if let Err(e) = self.sink.record(point_id, measurement).await {
                    tracing::error!(run_id, point_id, error = %e, "Failed to persist measurement");
                    report.failed += 1;
                    return;
                }
                match rank {
                    Some(rank) => {
                        tracing::info!(run_id, point_id, rank, "Point measured");
                        report.measured += 1;
                    }
                    None => {
                        tracing::info!(run_id, point_id, "Business not found at point, left unranked");
                        report.not_found += 1;
                    }
                }
            }
            TaskOutcome::Error { point_id, message } => {
                tracing::warn!(run_id, point_id, error = %message, "Point measurement failed, left unranked");
                report.failed += 1;
            }
        }
    }
}

/// Measure one point, retrying failures per `policy`.
pub(crate) async fn measure_with_retry<E: MeasureExecutor>(
    executor: Arc<E>,
    request: MeasureRequest,
    policy: RetryPolicy,
) -> TaskOutcome {
    let point_id = request.point_id;
    let run_id = request.run_id;

    let result = retry_with(
        policy,
        |_| {
            let executor = Arc::clone(&executor);
            let request = request.clone();
            async move { executor.measure(request).await }
        },
        |attempt, e: &MeasureError, will_retry| {
            tracing::warn!(run_id, point_id, attempt, will_retry, error = %e, "Measurement attempt failed");
        },
    )
    .await;

    match result {
        Ok(measurement) => TaskOutcome::Done {
            point_id,
            measurement,
        },
        Err(e) => TaskOutcome::Error {
            point_id,
            message: e.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
