//! Repository for the `businesses` table.

use geogrid_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::business::Business;

/// Column list for `businesses` queries.
const COLUMNS: &str = "id, name, dest_lat, dest_lng, created_at, updated_at";

/// Read access to businesses.
pub struct BusinessRepo;

impl BusinessRepo {
    /// Find a business by its ID.
    pub async fn find_by_id<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<Business>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM businesses WHERE id = $1");
        sqlx::query_as::<_, Business>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}
