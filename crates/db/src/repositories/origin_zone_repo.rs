//! Repository for the `origin_zones` table.
//!
//! Zones are maintained by configuration imports and the dashboard; the
//! orchestrator only reads them.

use geogrid_core::origin::OriginZone;
use geogrid_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::origin_zone::OriginZoneRow;

/// Column list for `origin_zones` queries.
const COLUMNS: &str = "\
    id, business_id, name, canonical, zip, lat, lng, radius_mi, weight, \
    keywords, created_at, updated_at";

/// Read access to origin zones.
pub struct OriginZoneRepo;

impl OriginZoneRepo {
    /// All zones for a business in stable (insertion) order.
    ///
    /// Order matters: the origin resolver breaks score ties in favour of
    /// the earlier zone.
    pub async fn list_for_business<'e>(
        executor: impl PgExecutor<'e>,
        business_id: DbId,
    ) -> Result<Vec<OriginZoneRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM origin_zones WHERE business_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, OriginZoneRow>(&query)
            .bind(business_id)
            .fetch_all(executor)
            .await
    }

    /// Zones for a business converted to resolver input.
    pub async fn resolver_zones<'e>(
        executor: impl PgExecutor<'e>,
        business_id: DbId,
    ) -> Result<Vec<OriginZone>, sqlx::Error> {
        let rows = Self::list_for_business(executor, business_id).await?;
        Ok(rows.into_iter().map(OriginZoneRow::into_zone).collect())
    }
}
