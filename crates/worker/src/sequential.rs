//! Single-process measurement mode.
//!
//! Points are measured one after another inside the orchestrator itself.
//! There is no task isolation, so a point that exhausts its retries fails
//! the whole run. Points measured before it stay written.

use geogrid_core::measure::PointTarget;
use geogrid_core::retry::{retry_with, RetryPolicy};
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;
use crate::executor::{MeasureError, MeasureExecutor};
use crate::pool::{RunContext, SweepReport};
use crate::sink::PointSink;

/// Measure `points` in order with per-point retries.
///
/// Returns the first point that could not be measured or written as an
/// error. Cancellation stops before the next point and is not an error.
pub async fn measure_sequentially<E: MeasureExecutor, S: PointSink>(
    executor: &E,
    sink: &S,
    ctx: &RunContext,
    points: Vec<PointTarget>,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<SweepReport, OrchestratorError> {
    let mut report = SweepReport::default();
    let total = points.len();

    for (index, point) in points.into_iter().enumerate() {
        if cancel.is_cancelled() {
            report.skipped = total - index;
            tracing::warn!(run_id = ctx.run_id, skipped = report.skipped, "Sequential sweep cancelled");
            break;
        }

        let point_id = point.point_id;
        report.dispatched += 1;
        report.peak_in_flight = 1;

        let measurement = retry_with(
            policy,
            |_| executor.measure(ctx.request(&point)),
            |attempt, e: &MeasureError, will_retry| {
                tracing::warn!(
                    run_id = ctx.run_id,
                    point_id,
                    attempt,
                    will_retry,
                    error = %e,
                    "Measurement attempt failed",
                );
            },
        )
        .await
        .map_err(|source| OrchestratorError::Measurement { point_id, source })?;

        let rank = measurement.rank;
        sink.record(point_id, measurement).await?;
        match rank {
            Some(rank) => {
                tracing::info!(run_id = ctx.run_id, point_id, rank, "Point measured");
                report.measured += 1;
            }
            None => {
                tracing::info!(run_id = ctx.run_id, point_id, "Business not found at point, left unranked");
                report.not_found += 1;
            }
        }
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use geogrid_core::retry::MEASUREMENT_POLICY;

    use super::*;
    use crate::pool::tests::{ctx, points, FakeExecutor, MemorySink, Script};

    #[tokio::test]
    async fn measures_every_point_in_order() {
        let executor = FakeExecutor::new([(2, Script::NotFound)], Duration::ZERO);
        let sink = MemorySink::default();
        let report = measure_sequentially(
            &executor,
            &sink,
            &ctx(),
            points(3),
            MEASUREMENT_POLICY.without_delay(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(*executor.calls.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(report.measured, 2);
        assert_eq!(report.not_found, 1);
        assert_eq!(report.peak_in_flight, 1);
    }

    #[tokio::test]
    async fn exhausted_point_fails_the_run_but_keeps_earlier_results() {
        let executor = FakeExecutor::new([(2, Script::AlwaysFail)], Duration::ZERO);
        let sink = MemorySink::default();
        let result = measure_sequentially(
            &executor,
            &sink,
            &ctx(),
            points(3),
            MEASUREMENT_POLICY.without_delay(),
            &CancellationToken::new(),
        )
        .await;

        assert_matches!(result, Err(OrchestratorError::Measurement { point_id: 2, .. }));
        assert_eq!(executor.attempts_for(2), 3);
        assert_eq!(executor.attempts_for(3), 0);
        assert_eq!(sink.ranks.lock().unwrap()[&1], Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_wait_the_fixed_delay() {
        let executor = FakeExecutor::new([(1, Script::Flaky(2, 5))], Duration::ZERO);
        let sink = MemorySink::default();
        let start = tokio::time::Instant::now();
        measure_sequentially(
            &executor,
            &sink,
            &ctx(),
            points(1),
            MEASUREMENT_POLICY,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(4));
        assert_eq!(sink.ranks.lock().unwrap()[&1], Some(5));
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_point() {
        let executor = FakeExecutor::new([], Duration::ZERO);
        let sink = MemorySink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = measure_sequentially(
            &executor,
            &sink,
            &ctx(),
            points(2),
            MEASUREMENT_POLICY.without_delay(),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(report.dispatched, 0);
        assert_eq!(report.skipped, 2);
    }
}
