//! Repository for the `geo_grid_points` table.
//!
//! Reads here touch only columns present in every schema version. Result
//! writes live in [`crate::persistence`].

use geogrid_core::grid::GridPoint;
use geogrid_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::point::{GeoGridPoint, UnrankedPoint};

/// Column list for full `geo_grid_points` rows (current schema).
const COLUMNS: &str = "\
    id, run_id, row_idx, col_idx, lat, lng, rank_pos, place_id, result_json, \
    measured_at, capture_path, search_url, landing_url, created_at, updated_at";

/// Provides grid creation and pending-work queries for points.
pub struct GeoGridPointRepo;

impl GeoGridPointRepo {
    /// Insert a freshly built grid for `run_id`.
    ///
    /// Cells that already exist are left untouched, so re-running a build
    /// never duplicates `(run_id, row_idx, col_idx)`. Returns the number of
    /// rows inserted.
    pub async fn insert_grid<'e>(
        executor: impl PgExecutor<'e>,
        run_id: DbId,
        points: &[GridPoint],
    ) -> Result<u64, sqlx::Error> {
        let rows: Vec<i32> = points.iter().map(|p| p.row_idx).collect();
        let cols: Vec<i32> = points.iter().map(|p| p.col_idx).collect();
        let lats: Vec<f64> = points.iter().map(|p| p.lat).collect();
        let lngs: Vec<f64> = points.iter().map(|p| p.lng).collect();

        let result = sqlx::query(
            "INSERT INTO geo_grid_points (run_id, row_idx, col_idx, lat, lng) \
             SELECT $1, t.row_idx, t.col_idx, t.lat, t.lng \
             FROM UNNEST($2::INTEGER[], $3::INTEGER[], $4::DOUBLE PRECISION[], $5::DOUBLE PRECISION[]) \
                  AS t(row_idx, col_idx, lat, lng) \
             ON CONFLICT (run_id, row_idx, col_idx) DO NOTHING",
        )
        .bind(run_id)
        .bind(&rows)
        .bind(&cols)
        .bind(&lats)
        .bind(&lngs)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Total points stored for a run.
    pub async fn count_for_run<'e>(
        executor: impl PgExecutor<'e>,
        run_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM geo_grid_points WHERE run_id = $1")
            .bind(run_id)
            .fetch_one(executor)
            .await
    }

    /// Points of a run that have no rank yet.
    pub async fn count_unranked<'e>(
        executor: impl PgExecutor<'e>,
        run_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM geo_grid_points WHERE run_id = $1 AND rank_pos IS NULL",
        )
        .bind(run_id)
        .fetch_one(executor)
        .await
    }

    /// Unranked points of a run in dispatch (insertion) order.
    pub async fn list_unranked<'e>(
        executor: impl PgExecutor<'e>,
        run_id: DbId,
    ) -> Result<Vec<UnrankedPoint>, sqlx::Error> {
        sqlx::query_as::<_, UnrankedPoint>(
            "SELECT id, row_idx, col_idx, lat, lng FROM geo_grid_points \
             WHERE run_id = $1 AND rank_pos IS NULL \
             ORDER BY id ASC",
        )
        .bind(run_id)
        .fetch_all(executor)
        .await
    }

    /// Find a point by its grid cell.
    pub async fn find_by_cell<'e>(
        executor: impl PgExecutor<'e>,
        run_id: DbId,
        row_idx: i32,
        col_idx: i32,
    ) -> Result<Option<GeoGridPoint>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM geo_grid_points \
             WHERE run_id = $1 AND row_idx = $2 AND col_idx = $3"
        );
        sqlx::query_as::<_, GeoGridPoint>(&query)
            .bind(run_id)
            .bind(row_idx)
            .bind(col_idx)
            .fetch_optional(executor)
            .await
    }

    /// All points of a run in row-major order.
    pub async fn list_for_run<'e>(
        executor: impl PgExecutor<'e>,
        run_id: DbId,
    ) -> Result<Vec<GeoGridPoint>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM geo_grid_points \
             WHERE run_id = $1 ORDER BY row_idx ASC, col_idx ASC"
        );
        sqlx::query_as::<_, GeoGridPoint>(&query)
            .bind(run_id)
            .fetch_all(executor)
            .await
    }
}
