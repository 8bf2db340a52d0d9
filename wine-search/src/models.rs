//! Shared data models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A wine exactly as a backend produced it.
pub type RawRecord = Map<String, Value>;

/// Source tags stamped onto records by each backend.
pub mod source {
    pub const DYNAMODB: &str = "dynamodb";
    pub const LOCAL_VECTOR: &str = "local_vector";
    pub const OPENSEARCH: &str = "opensearch";
    pub const LOCAL_DATABASE: &str = "local_database";
    pub const SAMPLE_APIS: &str = "sample_apis";
    pub const UNKNOWN: &str = "unknown";
}

/// Canonical, backend-agnostic wine record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WineRecord {
    pub id: String,
    pub name: String,
    pub winery: String,
    #[serde(rename = "type")]
    pub wine_type: String,
    pub region: String,
    pub country: String,
    pub vintage: Option<String>,
    pub price: Option<f64>,
    pub rating: Option<f64>,
    pub alcohol_content: Option<f64>,
    pub description: String,
    pub tasting_notes: String,
    pub pairings: Vec<String>,
    pub image_url: Option<String>,
    /// Backend that produced the record
    pub source: String,
    /// Only comparable within one search call
    pub relevance: Option<f64>,
}

impl WineRecord {
    /// Convert back into a raw record using canonical keys.
    pub fn to_raw(&self) -> RawRecord {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => RawRecord::new(),
        }
    }
}

/// Optional structured constraints on a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(rename = "type")]
    pub wine_type: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub max_price: Option<f64>,
    pub min_price: Option<f64>,
    pub min_rating: Option<f64>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
