//! Where measured results go.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use geogrid_core::measure::Measurement;
use geogrid_core::types::DbId;
use geogrid_db::models::point::PointUpsert;
use geogrid_db::persistence::{PersistenceError, PointWriter};

/// Records the measurement of one existing point.
pub trait PointSink: Send + Sync {
    fn record(
        &self,
        point_id: DbId,
        measurement: Measurement,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

impl PointSink for PointWriter {
    async fn record(&self, point_id: DbId, measurement: Measurement) -> Result<(), PersistenceError> {
        let upsert = PointUpsert::from_measurement(point_id, measurement, Utc::now());
        self.upsert_point(&upsert).await?;
        Ok(())
    }
}

impl<T: PointSink> PointSink for Arc<T> {
    fn record(
        &self,
        point_id: DbId,
        measurement: Measurement,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        (**self).record(point_id, measurement)
    }
}
