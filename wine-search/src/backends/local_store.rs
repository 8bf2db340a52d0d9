//! Last-resort search over a static JSON wine file.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{ensure_id, field_f64, field_str, matches_filters, tag_source, SearchBackend};
use crate::models::{source, RawRecord, SearchFilters};
use crate::Result;

/// On-disk layout of the wine file.
#[derive(Debug, Default, Deserialize)]
struct WineDatabase {
    #[serde(default)]
    wines: Vec<Value>,
    #[serde(default)]
    metadata: Option<Value>,
}

/// Fields a search term is matched against.
const SEARCH_FIELDS: &[&str] = &["name", "winery", "type", "region", "country", "description"];

/// In-memory wine list loaded from a JSON file.
pub struct LocalWineStore {
    wines: Vec<RawRecord>,
}

impl LocalWineStore {
    /// Load the store, falling back to an empty list if the file is unusable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load local wine database");
                Self::from_records(Vec::new())
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let database: WineDatabase = serde_json::from_str(&contents)?;
        let version = database
            .metadata
            .as_ref()
            .and_then(|m| m.get("version"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(
            path = %path.display(),
            total_wines = database.wines.len(),
            version,
            "Local wine database loaded"
        );
        Ok(Self::from_records(
            database.wines.into_iter().filter_map(super::into_record).collect(),
        ))
    }

    /// Build a store from records already in memory.
    pub fn from_records(wines: Vec<RawRecord>) -> Self {
        let wines = wines
            .into_iter()
            .filter(|w| !field_str(w, "name").trim().is_empty())
            .enumerate()
            .map(|(i, mut w)| {
                ensure_id(&mut w, || format!("local-{}", i));
                w
            })
            .collect();
        Self { wines }
    }

    pub fn len(&self) -> usize {
        self.wines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wines.is_empty()
    }

    fn matches_term(wine: &RawRecord, term: &str) -> bool {
        SEARCH_FIELDS
            .iter()
            .any(|field| field_str(wine, field).to_lowercase().contains(term))
    }
}

#[async_trait]
impl SearchBackend for LocalWineStore {
    fn name(&self) -> &'static str {
        "local_store"
    }

    async fn search(
        &self,
        term: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<RawRecord>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<RawRecord> = self
            .wines
            .iter()
            .filter(|w| Self::matches_term(w, &term) && matches_filters(w, filters))
            .cloned()
            .collect();

        // Exact name/type matches first, then by rating.
        results.sort_by(|a, b| {
            let exact = |w: &RawRecord| {
                field_str(w, "name").to_lowercase() == term
                    || field_str(w, "type").to_lowercase() == term
            };
            let ra = field_f64(a, "rating").unwrap_or(0.0);
            let rb = field_f64(b, "rating").unwrap_or(0.0);
            exact(b)
                .cmp(&exact(a))
                .then(rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal))
        });
        results.truncate(limit);

        for record in &mut results {
            tag_source(record, source::LOCAL_DATABASE);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn store() -> LocalWineStore {
        let wines = vec![
            json!({"name": "Test Pinot Noir", "winery": "Test Winery", "type": "Red Wine",
                   "region": "Napa Valley", "country": "USA", "price": 25.99, "rating": 4.5,
                   "description": "A delicious red wine", "pairings": ["beef", "cheese"]}),
            json!({"name": "Budget Chardonnay", "winery": "Valley Cellars", "type": "White Wine",
                   "region": "Sonoma", "country": "USA", "price": 9.0, "rating": 3.8}),
            json!({"name": "Grand Reserve", "winery": "Napa Estates", "type": "Red Wine",
                   "region": "Napa Valley", "country": "USA", "price": 80.0, "rating": 4.9}),
            json!({"winery": "Nameless"}),
        ];
        LocalWineStore::from_records(wines.into_iter().filter_map(crate::backends::into_record).collect())
    }

    #[tokio::test]
    async fn test_search_matches_any_field_case_insensitively() {
        let results = store()
            .search("napa", &SearchFilters::default(), 10)
            .await
            .unwrap();
        let names: Vec<&str> = results.iter().map(|r| field_str(r, "name")).collect();
        assert_eq!(names, vec!["Grand Reserve", "Test Pinot Noir"]);
        assert!(results.iter().all(|r| r["source"] == "local_database"));
    }

    #[tokio::test]
    async fn test_exact_name_match_ranks_first() {
        let results = store()
            .search("grand reserve", &SearchFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(field_str(&results[0], "name"), "Grand Reserve");
    }

    #[tokio::test]
    async fn test_filters_and_limit() {
        let filters = SearchFilters {
            max_price: Some(30.0),
            ..Default::default()
        };
        let results = store().search("usa", &filters, 10).await.unwrap();
        assert_eq!(results.len(), 2);

        let filters = SearchFilters {
            wine_type: Some("red".to_string()),
            min_rating: Some(4.6),
            ..Default::default()
        };
        let results = store().search("wine", &filters, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(field_str(&results[0], "name"), "Grand Reserve");

        let results = store()
            .search("usa", &SearchFilters::default(), 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let results = store()
            .search("retsina", &SearchFilters::default(), 5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_records_without_name_are_dropped_and_ids_assigned() {
        let store = store();
        assert_eq!(store.len(), 3);
        assert!(store.wines.iter().all(|w| w.contains_key("id")));
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"wines": [{{"name": "Origem Merlot"}}], "metadata": {{"version": "1.0"}}}}"#
        )
        .unwrap();
        assert_eq!(LocalWineStore::load(file.path()).len(), 1);

        let missing = LocalWineStore::load("/nonexistent/wine_data.json");
        assert!(missing.is_empty());
    }
}
