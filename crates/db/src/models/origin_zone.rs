//! Origin zone rows.

use geogrid_core::origin::{OriginZone, ZoneKeyword};
use geogrid_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `origin_zones` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OriginZoneRow {
    pub id: DbId,
    pub business_id: DbId,
    pub name: String,
    pub canonical: Option<String>,
    pub zip: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_mi: Option<f64>,
    pub weight: f64,
    /// `[{"term": ..., "weight": ...}]` or bare strings.
    pub keywords: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl OriginZoneRow {
    /// Convert into the resolver's zone type.
    ///
    /// Malformed keyword JSON is treated as an empty list so one bad zone
    /// cannot break resolution for the whole business.
    pub fn into_zone(self) -> OriginZone {
        let keywords: Vec<ZoneKeyword> = match serde_json::from_value(self.keywords) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(zone_id = self.id, error = %e, "Ignoring malformed zone keywords");
                Vec::new()
            }
        };
        OriginZone {
            id: self.id,
            name: self.name,
            canonical: self.canonical,
            zip: self.zip,
            lat: self.lat,
            lng: self.lng,
            radius_mi: self.radius_mi,
            weight: self.weight,
            keywords,
        }
    }
}
