//! Public SampleAPIs wine lists, queried after the local file.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{ensure_id, field_f64, field_str, tag_source, SearchBackend};
use crate::config::Config;
use crate::models::{source, RawRecord, SearchFilters};
use crate::{Error, Result};

const BACKEND: &str = "sample_api";

/// How long a fetched and filtered endpoint result is reused.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Endpoint path and the wine type its entries belong to.
const ENDPOINTS: &[(&str, &str)] = &[
    ("reds", "Red"),
    ("whites", "White"),
    ("sparkling", "Sparkling"),
    ("rose", "Rosé"),
    ("dessert", "Dessert"),
    ("port", "Port"),
];

/// Endpoints to query; a type filter naming one endpoint narrows to it.
fn endpoints_for(filters: &SearchFilters) -> Vec<(&'static str, &'static str)> {
    if let Some(wanted) = filters.wine_type.as_deref().map(str::to_lowercase) {
        let wanted = wanted.trim();
        if let Some(hit) = ENDPOINTS
            .iter()
            .find(|(path, label)| *path == wanted || label.to_lowercase() == wanted)
        {
            return vec![*hit];
        }
    }
    ENDPOINTS.to_vec()
}

/// Term match on wine name, winery or location; only region filters apply.
fn matches(entry: &RawRecord, term: &str, filters: &SearchFilters) -> bool {
    let name = match field_str(entry, "wine") {
        "" => field_str(entry, "name"),
        wine => wine,
    };
    let location = field_str(entry, "location").to_lowercase();
    let hit = name.to_lowercase().contains(term)
        || field_str(entry, "winery").to_lowercase().contains(term)
        || location.contains(term);
    if !hit {
        return false;
    }
    match &filters.region {
        Some(region) => location.contains(&region.to_lowercase()),
        None => true,
    }
}

/// Map a SampleAPIs entry onto the wine record layout.
fn to_record(entry: &RawRecord, wine_type: &str) -> RawRecord {
    let name = match field_str(entry, "wine") {
        "" => field_str(entry, "name"),
        wine => wine,
    };
    let winery = match field_str(entry, "winery") {
        "" => "Unknown Winery",
        winery => winery,
    };
    let location = field_str(entry, "location").trim();
    let country = location.rsplit(',').next().map(str::trim).unwrap_or("");
    let rating = entry
        .get("rating")
        .and_then(Value::as_object)
        .and_then(|r| field_f64(r, "average"));
    let description = format!(
        "A wine from {} in {}",
        winery,
        if location.is_empty() { "Unknown Region" } else { location }
    );

    let mut record = match json!({
        "name": name,
        "winery": winery,
        "type": wine_type,
        "region": location,
        "country": country,
        "rating": rating,
        "description": description,
        "image_url": entry.get("image").cloned().unwrap_or(Value::Null),
    }) {
        Value::Object(map) => map,
        _ => RawRecord::new(),
    };
    if let Some(id) = entry.get("id").filter(|v| !v.is_null()) {
        let id = format!("sampleapi-{}-{}", wine_type.to_lowercase(), id_text(id));
        record.insert("id".to_string(), Value::String(id));
    }
    record
}

fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct CacheEntry {
    fetched: Instant,
    wines: Vec<RawRecord>,
}

/// Client for `https://api.sampleapis.com/wines/{reds,whites,...}`.
pub struct SampleApiBackend {
    client: reqwest::Client,
    base_url: String,
    ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl SampleApiBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            ttl: CACHE_TTL,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.sample_api_base_url, config.http_timeout)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn cached(&self, key: &str) -> Option<Vec<RawRecord>> {
        let cache = self.cache.read().await;
        cache
            .get(key)
            .filter(|entry| entry.fetched.elapsed() < self.ttl)
            .map(|entry| entry.wines.clone())
    }

    async fn fetch(&self, path: &str) -> Result<Vec<RawRecord>> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::unavailable(BACKEND, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::unavailable(
                BACKEND,
                format!("{} returned {}", url, status),
            ));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::unavailable(BACKEND, e))?;
        Ok(match body {
            Value::Array(items) => items.into_iter().filter_map(super::into_record).collect(),
            _ => Vec::new(),
        })
    }

    /// Matching wines from one endpoint, served from the cache when fresh.
    async fn search_endpoint(
        &self,
        path: &str,
        wine_type: &str,
        term: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<RawRecord>> {
        let key = format!("{}_{}_{:?}", path, term, filters);
        if let Some(wines) = self.cached(&key).await {
            debug!(endpoint = path, count = wines.len(), "SampleAPIs cache hit");
            return Ok(wines);
        }

        let wines: Vec<RawRecord> = self
            .fetch(path)
            .await?
            .iter()
            .filter(|entry| matches(entry, term, filters))
            .map(|entry| to_record(entry, wine_type))
            .collect();

        self.cache.write().await.insert(
            key,
            CacheEntry {
                fetched: Instant::now(),
                wines: wines.clone(),
            },
        );
        Ok(wines)
    }
}

#[async_trait]
impl SearchBackend for SampleApiBackend {
    fn name(&self) -> &'static str {
        BACKEND
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

        let endpoints = endpoints_for(filters);
        let mut failures = 0;
        let mut wines = Vec::new();
        for (path, wine_type) in &endpoints {
            match self.search_endpoint(path, wine_type, &term, filters).await {
                Ok(found) => wines.extend(found),
                Err(e) => {
                    warn!(endpoint = *path, error = %e, "SampleAPIs request failed");
                    failures += 1;
                }
            }
        }
        if failures == endpoints.len() {
            return Err(Error::unavailable(BACKEND, "every endpoint failed"));
        }

        wines.truncate(limit);
        for (i, wine) in wines.iter_mut().enumerate() {
            let fallback = format!("sampleapi-{}", i);
            ensure_id(wine, || fallback);
            tag_source(wine, source::SAMPLE_APIS);
        }
        info!(count = wines.len(), "SampleAPIs search complete");
        Ok(wines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn entries() -> Value {
        json!([
            {
                "id": 1,
                "wine": "Gran Reserva Malbec",
                "winery": "Bodega Norton",
                "location": "Mendoza, Argentina",
                "rating": {"average": "4.6", "reviews": "120 ratings"},
                "image": "https://images.example/malbec.png"
            },
            {
                "id": 2,
                "wine": "Estate Pinot Noir",
                "winery": "Domaine Serene",
                "location": "Oregon, United States",
                "rating": {"average": "4.4", "reviews": "80 ratings"}
            },
            {
                "id": 3,
                "wine": "Old Vine Zinfandel",
                "winery": "Malbec Hill",
                "location": "Lodi, United States",
                "rating": {"average": "4.1", "reviews": "40 ratings"}
            }
        ])
    }

    fn backend(url: &str) -> SampleApiBackend {
        SampleApiBackend::new(url, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_type_filter_selects_single_endpoint() {
        let filters = SearchFilters {
            wine_type: Some("Red".to_string()),
            ..Default::default()
        };
        assert_eq!(endpoints_for(&filters), vec![("reds", "Red")]);

        let filters = SearchFilters {
            wine_type: Some("sparkling".to_string()),
            ..Default::default()
        };
        assert_eq!(endpoints_for(&filters), vec![("sparkling", "Sparkling")]);

        let filters = SearchFilters {
            wine_type: Some("orange".to_string()),
            ..Default::default()
        };
        assert_eq!(endpoints_for(&filters).len(), ENDPOINTS.len());
    }

    #[test]
    fn test_entry_mapping() {
        let entry = super::super::into_record(entries()[0].clone()).unwrap();
        let record = to_record(&entry, "Red");
        assert_eq!(record["name"], "Gran Reserva Malbec");
        assert_eq!(record["country"], "Argentina");
        assert_eq!(record["region"], "Mendoza, Argentina");
        assert_eq!(record["rating"], 4.6);
        assert_eq!(record["description"], "A wine from Bodega Norton in Mendoza, Argentina");
        assert_eq!(record["id"], "sampleapi-red-1");

        let wine = normalize(&record);
        assert_eq!(wine.wine_type, "Red");
        assert_eq!(wine.rating, Some(4.6));
    }

    #[test]
    fn test_region_filter_checks_location() {
        let entry = super::super::into_record(entries()[1].clone()).unwrap();
        let oregon = SearchFilters {
            region: Some("oregon".to_string()),
            ..Default::default()
        };
        let napa = SearchFilters {
            region: Some("Napa".to_string()),
            ..Default::default()
        };
        assert!(matches(&entry, "pinot", &oregon));
        assert!(!matches(&entry, "pinot", &napa));
        assert!(matches(&entry, "serene", &SearchFilters::default()));
        assert!(!matches(&entry, "riesling", &SearchFilters::default()));
    }

    #[tokio::test]
    async fn test_search_matches_name_winery_and_location() {
        let mut server = mockito::Server::new_async().await;
        let reds = server
            .mock("GET", "/reds")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(entries().to_string())
            .expect(1)
            .create_async()
            .await;
        let whites = server
            .mock("GET", "/whites")
            .expect(0)
            .create_async()
            .await;

        let filters = SearchFilters {
            wine_type: Some("red".to_string()),
            ..Default::default()
        };
        let wines = backend(&server.url())
            .search("Malbec", &filters, 5)
            .await
            .unwrap();

        reds.assert_async().await;
        whites.assert_async().await;
        let names: Vec<&str> = wines.iter().map(|w| field_str(w, "name")).collect();
        assert_eq!(names, vec!["Gran Reserva Malbec", "Old Vine Zinfandel"]);
        assert!(wines.iter().all(|w| w["source"] == "sample_apis"));
    }

    #[tokio::test]
    async fn test_repeat_search_uses_cache() {
        let mut server = mockito::Server::new_async().await;
        let reds = server
            .mock("GET", "/reds")
            .with_status(200)
            .with_body(entries().to_string())
            .expect(1)
            .create_async()
            .await;

        let backend = backend(&server.url());
        let filters = SearchFilters {
            wine_type: Some("reds".to_string()),
            ..Default::default()
        };
        let first = backend.search("united states", &filters, 5).await.unwrap();
        let second = backend.search("united states", &filters, 5).await.unwrap();

        reds.assert_async().await;
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_expired_cache_refetches() {
        let mut server = mockito::Server::new_async().await;
        let reds = server
            .mock("GET", "/reds")
            .with_status(200)
            .with_body(entries().to_string())
            .expect(2)
            .create_async()
            .await;

        let backend = backend(&server.url()).with_ttl(Duration::ZERO);
        let filters = SearchFilters {
            wine_type: Some("Red".to_string()),
            ..Default::default()
        };
        backend.search("malbec", &filters, 5).await.unwrap();
        backend.search("malbec", &filters, 5).await.unwrap();
        reds.assert_async().await;
    }

    #[tokio::test]
    async fn test_failing_endpoint_is_skipped() {
        let mut server = mockito::Server::new_async().await;
        for (path, _) in ENDPOINTS {
            let route = format!("/{}", path);
            if *path == "whites" {
                server
                    .mock("GET", route.as_str())
                    .with_status(200)
                    .with_body(
                        json!([{
                            "id": 9,
                            "wine": "Malbec Rosado Blanc",
                            "winery": "Test",
                            "location": "Salta, Argentina",
                            "rating": {"average": "3.9"}
                        }])
                        .to_string(),
                    )
                    .create_async()
                    .await;
            } else {
                server
                    .mock("GET", route.as_str())
                    .with_status(500)
                    .create_async()
                    .await;
            }
        }

        let wines = backend(&server.url())
            .search("malbec", &SearchFilters::default(), 5)
            .await
            .unwrap();
        assert_eq!(wines.len(), 1);
        assert_eq!(wines[0]["id"], "sampleapi-white-9");
    }

    #[tokio::test]
    async fn test_all_endpoints_failing_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/reds")
            .with_status(503)
            .create_async()
            .await;

        let filters = SearchFilters {
            wine_type: Some("Red".to_string()),
            ..Default::default()
        };
        let err = backend(&server.url())
            .search("malbec", &filters, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { backend: "sample_api", .. }));
    }

    #[tokio::test]
    async fn test_results_truncated_to_limit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/reds")
            .with_status(200)
            .with_body(entries().to_string())
            .create_async()
            .await;

        let filters = SearchFilters {
            wine_type: Some("Red".to_string()),
            ..Default::default()
        };
        let wines = backend(&server.url())
            .search("united states", &filters, 1)
            .await
            .unwrap();
        assert_eq!(wines.len(), 1);
        assert_eq!(wines[0]["name"], "Estate Pinot Noir");
    }
}
