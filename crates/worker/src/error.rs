use geogrid_core::error::CoreError;
use geogrid_core::types::DbId;
use geogrid_db::persistence::PersistenceError;

use crate::config::ConfigError;
use crate::executor::MeasureError;

/// Errors surfaced by the orchestrator.
///
/// Per-point failures in pool mode never become an `OrchestratorError`; they
/// are reported as [`geogrid_core::measure::TaskOutcome::Error`] and counted.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Lock file error: {0}")]
    Lock(#[source] std::io::Error),

    /// A run or request cannot be satisfied as configured. Never retried.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Measurement of point {point_id} failed: {source}")]
    Measurement {
        point_id: DbId,
        #[source]
        source: MeasureError,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Sweep cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// Whether the run being processed should be ended with status `error`.
    ///
    /// Storage failures are not: the run keeps its status and is picked up
    /// again by the next sweep. Bad run configuration and, in sequential
    /// mode, a point that exhausted its retries are final.
    pub fn ends_run(&self) -> bool {
        match self {
            Self::Core(_) | Self::Config(_) | Self::Measurement { .. } => true,
            Self::Database(_)
            | Self::Persistence(_)
            | Self::Migration(_)
            | Self::Lock(_)
            | Self::Cancelled => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_leave_the_run_for_the_next_sweep() {
        assert!(!OrchestratorError::Database(sqlx::Error::PoolTimedOut).ends_run());
        assert!(!OrchestratorError::Persistence(PersistenceError::PointNotFound(3)).ends_run());
        assert!(!OrchestratorError::Cancelled.ends_run());
    }

    #[test]
    fn bad_configuration_and_exhausted_points_end_the_run() {
        assert!(OrchestratorError::Core(CoreError::Configuration("no origin".into())).ends_run());
        assert!(OrchestratorError::Measurement {
            point_id: 3,
            source: MeasureError::Timeout { elapsed_ms: 10 },
        }
        .ends_run());
    }
}
