//! Geo-grid run models and DTOs.

use geogrid_core::grid::Coordinates;
use geogrid_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::RunStatus;

/// A row from the `geo_grid_runs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeoGridRun {
    pub id: DbId,
    pub business_id: DbId,
    pub keyword: String,
    pub origin_lat: Option<f64>,
    pub origin_lng: Option<f64>,
    pub radius_miles: Option<f64>,
    pub grid_rows: i32,
    pub grid_cols: i32,
    pub spacing_miles: Option<f64>,
    pub status: String,
    pub created_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl GeoGridRun {
    /// Parsed status, or `None` if the column holds something unexpected.
    pub fn run_status(&self) -> Option<RunStatus> {
        RunStatus::parse(&self.status)
    }

    /// Stored origin, if one was resolved when the run was created.
    pub fn origin(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.origin_lat, self.origin_lng)
    }
}

/// DTO for inserting a new run.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGeoGridRun {
    pub business_id: DbId,
    pub keyword: String,
    pub origin_lat: Option<f64>,
    pub origin_lng: Option<f64>,
    pub radius_miles: Option<f64>,
    pub grid_rows: i32,
    pub grid_cols: i32,
    pub spacing_miles: Option<f64>,
}

/// Origin written back to a run after lazy resolution.
#[derive(Debug, Clone, Copy)]
pub struct RunOrigin {
    pub coords: Coordinates,
    pub radius_miles: f64,
    pub spacing_miles: f64,
}
