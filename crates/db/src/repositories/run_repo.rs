//! Repository for the `geo_grid_runs` table.
//!
//! Status writes go through [`RunStatus`] only. Every transition is guarded
//! in SQL by the allowed predecessor statuses, so a run can never move
//! backwards even when two writers race.

use geogrid_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::run::{CreateGeoGridRun, GeoGridRun, RunOrigin};
use crate::models::status::RunStatus;

/// Column list for `geo_grid_runs` queries.
const COLUMNS: &str = "\
    id, business_id, keyword, origin_lat, origin_lng, radius_miles, \
    grid_rows, grid_cols, spacing_miles, status, \
    created_at, finished_at, updated_at";

/// Provides lifecycle and lookup operations for geo-grid runs.
pub struct GeoGridRunRepo;

impl GeoGridRunRepo {
    /// Insert a new run in `queued` status.
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        input: &CreateGeoGridRun,
    ) -> Result<GeoGridRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO geo_grid_runs \
                 (business_id, keyword, origin_lat, origin_lng, radius_miles, \
                  grid_rows, grid_cols, spacing_miles, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeoGridRun>(&query)
            .bind(input.business_id)
            .bind(&input.keyword)
            .bind(input.origin_lat)
            .bind(input.origin_lng)
            .bind(input.radius_miles)
            .bind(input.grid_rows)
            .bind(input.grid_cols)
            .bind(input.spacing_miles)
            .bind(RunStatus::Queued.as_str())
            .fetch_one(executor)
            .await
    }

    /// Find a run by its ID.
    pub async fn find_by_id<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<GeoGridRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM geo_grid_runs WHERE id = $1");
        sqlx::query_as::<_, GeoGridRun>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// All queued or running runs, oldest first.
    pub async fn list_active<'e>(
        executor: impl PgExecutor<'e>,
    ) -> Result<Vec<GeoGridRun>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM geo_grid_runs \
             WHERE status = ANY($1) \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, GeoGridRun>(&query)
            .bind(status_names(&RunStatus::ACTIVE))
            .fetch_all(executor)
            .await
    }

    /// Move a run to `status` if its current status allows it.
    ///
    /// Terminal statuses also stamp `finished_at`. Returns `false` when the
    /// guard rejected the transition (or the run does not exist).
    pub async fn update_status<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
        status: RunStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE geo_grid_runs \
             SET status = $2, \
                 finished_at = CASE WHEN $3 THEN NOW() ELSE finished_at END \
             WHERE id = $1 AND status = ANY($4)",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(status.is_terminal())
        .bind(status_names(status.allowed_predecessors()))
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a lazily resolved origin and the spacing derived from it.
    pub async fn set_origin<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
        origin: &RunOrigin,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE geo_grid_runs \
             SET origin_lat = $2, origin_lng = $3, radius_miles = $4, spacing_miles = $5 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(origin.coords.lat)
        .bind(origin.coords.lng)
        .bind(origin.radius_miles)
        .bind(origin.spacing_miles)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Record the spacing used for a grid built from a stored origin.
    pub async fn set_spacing<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
        spacing_miles: f64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE geo_grid_runs SET spacing_miles = $2 WHERE id = $1")
            .bind(id)
            .bind(spacing_miles)
            .execute(executor)
            .await?;
        Ok(())
    }
}

fn status_names(statuses: &[RunStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_status_names() {
        assert_eq!(status_names(&RunStatus::ACTIVE), vec!["queued", "running"]);
    }

    #[test]
    fn done_guard_only_accepts_running() {
        assert_eq!(status_names(RunStatus::Done.allowed_predecessors()), vec!["running"]);
    }
}
