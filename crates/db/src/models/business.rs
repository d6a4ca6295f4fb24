//! Business model: owner of runs and origin zones.

use geogrid_core::grid::Coordinates;
use geogrid_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `businesses` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Business {
    pub id: DbId,
    pub name: String,
    pub dest_lat: Option<f64>,
    pub dest_lng: Option<f64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Business {
    /// Destination coordinates used when no origin zone applies.
    pub fn destination(&self) -> Option<Coordinates> {
        Coordinates::from_parts(self.dest_lat, self.dest_lng)
    }
}
