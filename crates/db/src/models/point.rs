//! Geo-grid point models and DTOs.

use geogrid_core::grid::Coordinates;
use geogrid_core::measure::{Artifacts, Measurement, PointTarget};
use geogrid_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `geo_grid_points` table (current schema).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeoGridPoint {
    pub id: DbId,
    pub run_id: DbId,
    pub row_idx: i32,
    pub col_idx: i32,
    pub lat: f64,
    pub lng: f64,
    pub rank_pos: Option<i32>,
    pub place_id: Option<String>,
    pub result_json: Option<serde_json::Value>,
    pub measured_at: Option<Timestamp>,
    pub capture_path: Option<String>,
    pub search_url: Option<String>,
    pub landing_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The columns needed to dispatch a measurement. Present in every schema
/// version, so loading pending work never depends on capability probing.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct UnrankedPoint {
    pub id: DbId,
    pub row_idx: i32,
    pub col_idx: i32,
    pub lat: f64,
    pub lng: f64,
}

impl From<UnrankedPoint> for PointTarget {
    fn from(p: UnrankedPoint) -> Self {
        PointTarget {
            point_id: p.id,
            row_idx: p.row_idx,
            col_idx: p.col_idx,
            coords: Coordinates::new(p.lat, p.lng),
        }
    }
}

/// How an upsert locates its row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointKey {
    /// Update an existing point.
    Id(DbId),
    /// Insert the cell, or update it if `(run_id, row_idx, col_idx)` exists.
    Cell {
        run_id: DbId,
        row_idx: i32,
        col_idx: i32,
        coords: Coordinates,
    },
}

/// A measurement result to write for one point.
#[derive(Debug, Clone)]
pub struct PointUpsert {
    pub key: PointKey,
    /// Positive rank or `None`; `None` never overwrites a stored rank.
    pub rank_pos: Option<i32>,
    pub place_id: Option<String>,
    pub payload: serde_json::Value,
    pub measured_at: Timestamp,
    pub artifacts: Artifacts,
}

impl PointUpsert {
    /// Build an update for an existing point from a normalized measurement.
    pub fn from_measurement(point_id: DbId, measurement: Measurement, measured_at: Timestamp) -> Self {
        Self {
            key: PointKey::Id(point_id),
            rank_pos: measurement.rank,
            place_id: measurement.place_id,
            payload: measurement.payload,
            measured_at,
            artifacts: measurement.artifacts,
        }
    }
}
