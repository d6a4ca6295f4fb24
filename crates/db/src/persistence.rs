//! Schema-tolerant writes of point measurement results.
//!
//! Deployed databases carry one of three layouts of `geo_grid_points`:
//!
//! | Level            | Payload column | Artifact columns |
//! |------------------|----------------|------------------|
//! | `Full`           | `result_json`  | yes              |
//! | `CurrentPayload` | `result_json`  | no               |
//! | `Legacy`         | `results_json` | no               |
//!
//! [`PointWriter`] starts at `Full` and steps down one level each time
//! PostgreSQL rejects a write with `undefined_column` (SQLSTATE 42703). The
//! level is shared by every clone of the writer and only ever decreases.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use geogrid_core::types::DbId;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryScalar;
use sqlx::Postgres;

use crate::models::point::{PointKey, PointUpsert};
use crate::DbPool;

/// PostgreSQL SQLSTATE for `undefined_column`.
const UNDEFINED_COLUMN: &str = "42703";

/// Errors from the point write path.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Every schema fallback was tried; carries the error of the first attempt.
    #[error("No supported geo_grid_points layout: {source}")]
    SchemaExhausted { source: sqlx::Error },

    #[error("Geo-grid point {0} not found")]
    PointNotFound(DbId),
}

// ---------------------------------------------------------------------------
// Capability state
// ---------------------------------------------------------------------------

/// Write capability of the `geo_grid_points` table, richest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SchemaLevel {
    Legacy = 0,
    CurrentPayload = 1,
    Full = 2,
}

impl SchemaLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Legacy,
            1 => Self::CurrentPayload,
            _ => Self::Full,
        }
    }

    /// Whether the artifact columns are written at this level.
    pub fn writes_artifacts(self) -> bool {
        self == Self::Full
    }

    pub fn payload_column(self) -> &'static str {
        match self {
            Self::Legacy => "results_json",
            Self::CurrentPayload | Self::Full => "result_json",
        }
    }

    /// The next level down, or `None` once nothing is left to drop.
    pub fn degraded(self) -> Option<Self> {
        match self {
            Self::Full => Some(Self::CurrentPayload),
            Self::CurrentPayload => Some(Self::Legacy),
            Self::Legacy => None,
        }
    }
}

/// Monotonically degrading [`SchemaLevel`] shared across writers.
#[derive(Debug)]
struct Capabilities(AtomicU8);

impl Capabilities {
    fn new(level: SchemaLevel) -> Self {
        Self(AtomicU8::new(level as u8))
    }

    fn current(&self) -> SchemaLevel {
        SchemaLevel::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Lower the level to at most `level`. Never raises it.
    fn degrade_to(&self, level: SchemaLevel) {
        self.0.fetch_min(level as u8, Ordering::AcqRel);
    }
}

/// True if `err` is PostgreSQL's "column does not exist".
pub fn is_unknown_column(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNDEFINED_COLUMN),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

const ARTIFACT_COLUMNS: [&str; 3] = ["capture_path", "search_url", "landing_url"];

/// Build the upsert statement for one key shape at one schema level.
///
/// Update path parameters: `$1` id, `$2` rank, `$3` place id, `$4` payload,
/// `$5` measured at, then artifacts. Insert path parameters: `$1` run id,
/// `$2` row, `$3` col, `$4` lat, `$5` lng, `$6` rank, `$7` place id,
/// `$8` payload, `$9` measured at, then artifacts. Both return the point id.
fn upsert_sql(level: SchemaLevel, by_id: bool) -> String {
    let payload = level.payload_column();
    let artifacts: &[&str] = if level.writes_artifacts() {
        &ARTIFACT_COLUMNS
    } else {
        &[]
    };

    if by_id {
        let mut sets = vec![
            "rank_pos = COALESCE($2, rank_pos)".to_string(),
            "place_id = COALESCE($3, place_id)".to_string(),
            format!("{payload} = $4"),
            "measured_at = $5".to_string(),
        ];
        for (i, col) in artifacts.iter().enumerate() {
            sets.push(format!("{col} = COALESCE(${}, {col})", i + 6));
        }
        return format!(
            "UPDATE geo_grid_points SET {} WHERE id = $1 RETURNING id",
            sets.join(", ")
        );
    }

    let mut columns = vec![
        "run_id", "row_idx", "col_idx", "lat", "lng", "rank_pos", "place_id", payload,
        "measured_at",
    ];
    columns.extend_from_slice(artifacts);
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();

    let mut sets = vec![
        "rank_pos = COALESCE(EXCLUDED.rank_pos, geo_grid_points.rank_pos)".to_string(),
        "place_id = COALESCE(EXCLUDED.place_id, geo_grid_points.place_id)".to_string(),
        format!("{payload} = EXCLUDED.{payload}"),
        "measured_at = EXCLUDED.measured_at".to_string(),
    ];
    for col in artifacts {
        sets.push(format!("{col} = COALESCE(EXCLUDED.{col}, geo_grid_points.{col})"));
    }

    format!(
        "INSERT INTO geo_grid_points ({}) VALUES ({}) \
         ON CONFLICT (run_id, row_idx, col_idx) DO UPDATE SET {} \
         RETURNING id",
        columns.join(", "),
        placeholders.join(", "),
        sets.join(", ")
    )
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Writes measurement results, degrading to older table layouts on demand.
///
/// Each write checks out its own short-lived connection from the pool.
#[derive(Debug, Clone)]
pub struct PointWriter {
    pool: DbPool,
    capabilities: Arc<Capabilities>,
}

impl PointWriter {
    pub fn new(pool: DbPool) -> Self {
        Self::with_level(pool, SchemaLevel::Full)
    }

    /// Start from a known level instead of probing from `Full`.
    pub fn with_level(pool: DbPool, level: SchemaLevel) -> Self {
        Self {
            pool,
            capabilities: Arc::new(Capabilities::new(level)),
        }
    }

    /// The level the next write will use.
    pub fn schema_level(&self) -> SchemaLevel {
        self.capabilities.current()
    }

    /// Write one point's result and return its id.
    ///
    /// A rank that is not strictly positive is never written; an existing
    /// rank is kept when the new one is absent.
    pub async fn upsert_point(&self, upsert: &PointUpsert) -> Result<DbId, PersistenceError> {
        let mut first_error: Option<sqlx::Error> = None;

        loop {
            let level = self.capabilities.current();
            let err = match self.write_at(level, upsert).await {
                Ok(id) => return Ok(id),
                Err(PersistenceError::Database(err)) if is_unknown_column(&err) => err,
                Err(other) => return Err(other),
            };

            let Some(lower) = level.degraded() else {
                return Err(PersistenceError::SchemaExhausted {
                    source: first_error.unwrap_or(err),
                });
            };

            tracing::warn!(
                from = ?level,
                to = ?lower,
                error = %err,
                "geo_grid_points write rejected, falling back to older layout",
            );
            self.capabilities.degrade_to(lower);
            first_error.get_or_insert(err);
        }
    }

    async fn write_at(&self, level: SchemaLevel, upsert: &PointUpsert) -> Result<DbId, PersistenceError> {
        let rank = upsert.rank_pos.filter(|r| *r > 0);
        let sql = upsert_sql(level, matches!(upsert.key, PointKey::Id(_)));

        let query = match upsert.key {
            PointKey::Id(id) => sqlx::query_scalar::<_, DbId>(&sql).bind(id),
            PointKey::Cell {
                run_id,
                row_idx,
                col_idx,
                coords,
            } => sqlx::query_scalar::<_, DbId>(&sql)
                .bind(run_id)
                .bind(row_idx)
                .bind(col_idx)
                .bind(coords.lat)
                .bind(coords.lng),
        };
        let query = bind_result(query, level, rank, upsert);

        match query.fetch_optional(&self.pool).await? {
            Some(id) => Ok(id),
            None => match upsert.key {
                PointKey::Id(id) => Err(PersistenceError::PointNotFound(id)),
                // ON CONFLICT DO UPDATE always returns the row.
                PointKey::Cell { .. } => Err(PersistenceError::Database(sqlx::Error::RowNotFound)),
            },
        }
    }
}

fn bind_result<'q>(
    query: QueryScalar<'q, Postgres, DbId, PgArguments>,
    level: SchemaLevel,
    rank: Option<i32>,
    upsert: &'q PointUpsert,
) -> QueryScalar<'q, Postgres, DbId, PgArguments> {
    let query = query
        .bind(rank)
        .bind(upsert.place_id.as_deref())
        .bind(&upsert.payload)
        .bind(upsert.measured_at);

    if !level.writes_artifacts() {
        return query;
    }
    query
        .bind(upsert.artifacts.capture_path.as_deref())
        .bind(upsert.artifacts.search_url.as_deref())
        .bind(upsert.artifacts.landing_url.as_deref())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_degrade_in_order_and_stop() {
        assert_eq!(SchemaLevel::Full.degraded(), Some(SchemaLevel::CurrentPayload));
        assert_eq!(SchemaLevel::CurrentPayload.degraded(), Some(SchemaLevel::Legacy));
        assert_eq!(SchemaLevel::Legacy.degraded(), None);
    }

    #[test]
    fn capabilities_never_rise() {
        let caps = Capabilities::new(SchemaLevel::Full);
        caps.degrade_to(SchemaLevel::Legacy);
        caps.degrade_to(SchemaLevel::CurrentPayload);
        assert_eq!(caps.current(), SchemaLevel::Legacy);
    }

    #[test]
    fn full_update_writes_artifacts_and_current_payload() {
        let sql = upsert_sql(SchemaLevel::Full, true);
        assert!(sql.starts_with("UPDATE geo_grid_points SET"));
        assert!(sql.contains("result_json = $4"));
        assert!(sql.contains("capture_path = COALESCE($6, capture_path)"));
        assert!(sql.contains("landing_url = COALESCE($8, landing_url)"));
        assert!(sql.ends_with("WHERE id = $1 RETURNING id"));
    }

    #[test]
    fn current_payload_level_drops_artifacts() {
        let sql = upsert_sql(SchemaLevel::CurrentPayload, true);
        assert!(sql.contains("result_json = $4"));
        assert!(!sql.contains("capture_path"));
        assert!(!sql.contains("$6"));
    }

    #[test]
    fn legacy_level_uses_old_payload_column() {
        let sql = upsert_sql(SchemaLevel::Legacy, false);
        assert!(sql.contains("results_json = EXCLUDED.results_json"));
        assert!(!sql.contains("result_json,"));
        assert!(sql.contains("$9)"));
        assert!(!sql.contains("$10"));
    }

    #[test]
    fn insert_path_conflicts_on_cell() {
        let sql = upsert_sql(SchemaLevel::Full, false);
        assert!(sql.contains("ON CONFLICT (run_id, row_idx, col_idx) DO UPDATE"));
        assert!(sql.contains("$12)"));
        assert!(sql.contains("COALESCE(EXCLUDED.rank_pos, geo_grid_points.rank_pos)"));
        assert!(sql.ends_with("RETURNING id"));
    }

    #[test]
    fn only_undefined_column_is_classified() {
        assert!(!is_unknown_column(&sqlx::Error::RowNotFound));
        assert!(!is_unknown_column(&sqlx::Error::PoolTimedOut));
    }
}
