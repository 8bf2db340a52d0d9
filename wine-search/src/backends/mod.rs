//! Retrieval backends the orchestrator falls through, in priority order.

pub mod dynamodb;
pub mod local_store;
pub mod local_vector;
pub mod opensearch;
pub mod sample_api;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{RawRecord, SearchFilters};
use crate::Result;

pub use dynamodb::DynamoWineTable;
pub use local_store::LocalWineStore;
pub use local_vector::LocalVectorIndex;
pub use opensearch::OpenSearchBackend;
pub use sample_api::SampleApiBackend;

/// A single data source that can answer a wine search.
///
/// Implementations return `Ok(vec![])` when nothing matches and reserve
/// `Err` for the backend being unreachable. Every returned record has a
/// name, an identifier and the backend's source tag.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        term: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<RawRecord>>;
}

/// Stamp the producing backend onto a record, replacing any stored tag.
pub(crate) fn tag_source(record: &mut RawRecord, source: &str) {
    record.insert("source".to_string(), Value::String(source.to_string()));
}

/// Give a record an `id` when none of the usual identifier keys is set.
pub(crate) fn ensure_id(record: &mut RawRecord, fallback: impl FnOnce() -> String) {
    let has_id = ["id", "wine_id", "WineID", "_id"]
        .iter()
        .any(|key| record.get(*key).is_some_and(|v| !v.is_null()));
    if !has_id {
        record.insert("id".to_string(), Value::String(fallback()));
    }
}

/// Convert a JSON value into a record, dropping non-objects.
pub(crate) fn into_record(value: Value) -> Option<RawRecord> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Float-or-missing view of a record field, tolerating numeric strings.
pub(crate) fn field_f64(record: &RawRecord, key: &str) -> Option<f64> {
    match record.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String view of a record field; empty when missing.
pub(crate) fn field_str<'a>(record: &'a RawRecord, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Case-insensitive filter check for local records.
pub(crate) fn matches_filters(wine: &RawRecord, filters: &SearchFilters) -> bool {
    let contains = |field: &str, wanted: &Option<String>| match wanted {
        Some(wanted) => field_str(wine, field)
            .to_lowercase()
            .contains(&wanted.to_lowercase()),
        None => true,
    };
    if !contains("type", &filters.wine_type)
        || !contains("region", &filters.region)
        || !contains("country", &filters.country)
    {
        return false;
    }

    let price = field_f64(wine, "price");
    let rating = field_f64(wine, "rating");
    if let (Some(max), Some(price)) = (filters.max_price, price) {
        if price > max {
            return false;
        }
    }
    if let (Some(min), Some(price)) = (filters.min_price, price) {
        if price < min {
            return false;
        }
    }
    if let Some(min) = filters.min_rating {
        if rating.unwrap_or(0.0) < min {
            return false;
        }
    }
    true
}

/// Sort records by rating, highest first; unrated records sink.
pub(crate) fn sort_by_rating(records: &mut [RawRecord]) {
    records.sort_by(|a, b| {
        let ra = field_f64(a, "rating").unwrap_or(0.0);
        let rb = field_f64(b, "rating").unwrap_or(0.0);
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });
}
