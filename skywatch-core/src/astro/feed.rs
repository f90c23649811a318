use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::Coordinates;

/// One independent astronomy data source.
///
/// Implementations return their slice of the snapshot or an error; the
/// aggregator folds any error into an absent sub-record, so no feed failure
/// ever crosses the aggregation boundary.
#[async_trait]
pub trait DataFeed<T>: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn fetch(&self, coordinates: Coordinates, date: NaiveDate) -> anyhow::Result<T>;
}
