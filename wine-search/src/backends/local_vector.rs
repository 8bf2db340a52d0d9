//! Semantic search over precomputed embeddings and a local SQLite wine table.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::{matches_filters, tag_source, SearchBackend};
use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{source, RawRecord, SearchFilters};
use crate::{Error, Result};

const BACKEND: &str = "local_vector";

/// Candidates fetched per requested result, so filters still leave enough.
const CANDIDATE_FACTOR: usize = 4;

#[derive(Debug, Deserialize)]
struct EmbeddingEntry {
    wine_id: Value,
    embedding: Vec<f32>,
}

/// A row of the X-Wines `wines` table.
#[derive(Debug, sqlx::FromRow)]
struct WineRow {
    wine_id: i64,
    name: Option<String>,
    #[sqlx(rename = "type")]
    wine_type: Option<String>,
    country: Option<String>,
    region: Option<String>,
    winery: Option<String>,
    rating: Option<f64>,
    price: Option<f64>,
    vintage: Option<i64>,
    alcohol: Option<f64>,
    food_pairing: Option<String>,
    description: Option<String>,
}

impl WineRow {
    fn into_record(self, similarity: f32) -> RawRecord {
        let value = json!({
            "wine_id": self.wine_id,
            "name": self.name,
            "type": self.wine_type,
            "country": self.country,
            "region": self.region,
            "winery": self.winery,
            "rating": self.rating,
            "price": self.price,
            "vintage": self.vintage,
            "alcohol": self.alcohol,
            "food_pairing": self.food_pairing,
            "description": self.description,
            "_relevance": similarity,
        });
        super::into_record(value).unwrap_or_default()
    }
}

/// Nearest-neighbour search over embeddings held in memory.
pub struct LocalVectorIndex {
    pool: SqlitePool,
    embeddings: Vec<(String, Vec<f32>)>,
    embedder: Box<dyn Embedder>,
}

impl LocalVectorIndex {
    /// Open the SQLite database read-only and load the embeddings file.
    pub async fn open(
        db_path: impl AsRef<Path>,
        embeddings_path: impl AsRef<Path>,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self> {
        let contents = tokio::fs::read_to_string(embeddings_path.as_ref()).await?;
        let entries: Vec<EmbeddingEntry> = serde_json::from_str(&contents)?;
        let embeddings: Vec<(String, Vec<f32>)> = entries
            .into_iter()
            .filter(|e| !e.embedding.is_empty())
            .filter_map(|e| id_string(&e.wine_id).map(|id| (id, e.embedding)))
            .collect();

        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await?;

        info!(vectors = embeddings.len(), "Local vector index loaded");
        Ok(Self::new(pool, embeddings, embedder))
    }

    pub fn new(
        pool: SqlitePool,
        embeddings: Vec<(String, Vec<f32>)>,
        embedder: Box<dyn Embedder>,
    ) -> Self {
        Self {
            pool,
            embeddings,
            embedder,
        }
    }

    /// Ids of the `k` most similar wines, best first.
    fn nearest(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = self
            .embeddings
            .iter()
            .map(|(id, vector)| (id.clone(), cosine_similarity(query, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    async fn fetch_rows(&self, ids: &[i64]) -> Result<Vec<WineRow>> {
        let mut builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
            "SELECT wine_id, name, type, country, region, winery, rating, price, vintage, \
             alcohol, food_pairing, description FROM wines WHERE wine_id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        Ok(builder.build_query_as::<WineRow>().fetch_all(&self.pool).await?)
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(|i| i.to_string())
            .or_else(|| n.as_f64().map(|f| format!("{}", f as i64))),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[async_trait]
impl SearchBackend for LocalVectorIndex {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn search(
        &self,
        term: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<RawRecord>> {
        let term = term.trim();
        if term.is_empty() || self.embeddings.is_empty() {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(term).await?;
        let top = self.nearest(&query, limit.saturating_mul(CANDIDATE_FACTOR));
        let ids: Vec<i64> = top.iter().filter_map(|(id, _)| id.parse().ok()).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .fetch_rows(&ids)
            .await
            .map_err(|e| Error::unavailable(BACKEND, e))?;

        // Rows come back in table order; restore similarity order.
        let mut rows: HashMap<String, WineRow> = rows
            .into_iter()
            .map(|row| (row.wine_id.to_string(), row))
            .collect();
        let mut results: Vec<RawRecord> = top
            .iter()
            .filter_map(|(id, similarity)| rows.remove(id).map(|row| (row, *similarity)))
            .filter(|(row, _)| row.name.as_deref().is_some_and(|n| !n.trim().is_empty()))
            .map(|(row, similarity)| row.into_record(similarity))
            .filter(|record| matches_filters(record, filters))
            .collect();
        results.truncate(limit);

        for record in &mut results {
            tag_source(record, source::LOCAL_VECTOR);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    async fn seeded_index(query: Vec<f32>) -> (LocalVectorIndex, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("xwines.db");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&db_path)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE wines (wine_id INTEGER PRIMARY KEY, name TEXT, type TEXT, country TEXT, \
             region TEXT, winery TEXT, rating REAL, num_reviews INTEGER, price REAL, \
             vintage INTEGER, alcohol REAL, food_pairing TEXT, description TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        for (id, name, wine_type, price) in [
            (1, "Sparkling Brut", "Sparkling", 30.0),
            (2, "Old Vine Zinfandel", "Red", 22.0),
            (3, "Late Harvest Riesling", "Dessert", 45.0),
        ] {
            sqlx::query("INSERT INTO wines (wine_id, name, type, price) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind(name)
                .bind(wine_type)
                .bind(price)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;

        let emb_path = dir.path().join("embeddings.json");
        std::fs::write(
            &emb_path,
            r#"[{"wine_id": 1, "embedding": [1.0, 0.0]},
                {"wine_id": "2", "embedding": [0.0, 1.0]},
                {"wine_id": 3.0, "embedding": [0.7, 0.7]}]"#,
        )
        .unwrap();

        let index = LocalVectorIndex::open(&db_path, &emb_path, Box::new(FixedEmbedder(query)))
            .await
            .unwrap();
        (index, dir)
    }

    #[tokio::test]
    async fn test_results_follow_similarity_order() {
        let (index, _dir) = seeded_index(vec![0.0, 1.0]).await;
        let results = index
            .search("zinfandel", &SearchFilters::default(), 2)
            .await
            .unwrap();
        let names: Vec<&str> = results.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Old Vine Zinfandel", "Late Harvest Riesling"]);
        assert_eq!(results[0]["source"], "local_vector");
        assert!(results[0]["_relevance"].as_f64().unwrap() > results[1]["_relevance"].as_f64().unwrap());
    }

    #[tokio::test]
    async fn test_filters_apply_after_ranking() {
        let (index, _dir) = seeded_index(vec![0.0, 1.0]).await;
        let filters = SearchFilters {
            max_price: Some(35.0),
            ..Default::default()
        };
        let results = index.search("anything", &filters, 5).await.unwrap();
        let names: Vec<&str> = results.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Old Vine Zinfandel", "Sparkling Brut"]);
    }

    #[test]
    fn test_id_string_accepts_numbers_and_strings() {
        assert_eq!(id_string(&json!(12)).as_deref(), Some("12"));
        assert_eq!(id_string(&json!(12.0)).as_deref(), Some("12"));
        assert_eq!(id_string(&json!(" 7 ")).as_deref(), Some("7"));
        assert_eq!(id_string(&json!(null)), None);
    }
}
