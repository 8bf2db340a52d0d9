//! OpenSearch text, vector and hybrid search over the X-Wines index.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{ensure_id, field_str, matches_filters, tag_source, SearchBackend};
use crate::config::{Config, OpenSearchMode};
use crate::embedding::Embedder;
use crate::fusion::fuse_records;
use crate::models::{source, RawRecord, SearchFilters};
use crate::{Error, Result};

const BACKEND: &str = "opensearch";

/// Fields scored by the BM25 text query.
const TEXT_FIELDS: &[&str] = &["name^3", "winery", "type", "region", "country", "description"];

/// The text fields plus grapes and food pairings, used to prefilter vector search.
const PREFILTER_FIELDS: &[&str] = &[
    "name^3",
    "winery",
    "type",
    "region",
    "country",
    "description",
    "grapes",
    "food_pairing",
];

/// Candidates kept by the BM25 prefilter in vector mode.
const NUM_CANDIDATES: usize = 100;

const COSINE_SCRIPT: &str = "cosineSimilarity(params.query_vector, doc['embedding']) + 1.0";

#[derive(Debug, Default, Deserialize)]
struct Hit {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(rename = "_source", default)]
    source: Option<RawRecord>,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct HitList {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: HitList,
    /// Present on some `_plugins/_knn/knn_search` responses
    #[serde(default)]
    responses: Vec<SearchResponse>,
}

impl SearchResponse {
    fn into_hits(self) -> Vec<Hit> {
        if self.hits.hits.is_empty() {
            if let Some(first) = self.responses.into_iter().next() {
                return first.hits.hits;
            }
        }
        self.hits.hits
    }
}

/// An `(id, record)` pair with the hit score stored as `_relevance`.
fn into_scored(hit: Hit) -> (String, RawRecord) {
    let mut record = hit.source.unwrap_or_default();
    let score = hit.score.unwrap_or(0.0);
    record.insert("_relevance".to_string(), json!(score));
    if !hit.id.is_empty() {
        let id = hit.id.clone();
        ensure_id(&mut record, || id);
    }
    (hit.id, record)
}

/// BM25 `multi_match` over the given fields.
pub(crate) fn text_body(query: &str, size: usize, fields: &[&str]) -> Value {
    json!({
        "size": size,
        "query": {
            "multi_match": {
                "query": query,
                "fields": fields,
            }
        }
    })
}

/// Cosine `script_score` over whatever `base_query` selects.
pub(crate) fn script_score_body(base_query: Value, vector: &[f32], size: usize) -> Value {
    json!({
        "size": size,
        "query": {
            "script_score": {
                "query": base_query,
                "script": {
                    "source": COSINE_SCRIPT,
                    "params": { "query_vector": vector }
                }
            }
        }
    })
}

/// kNN query shapes, tried in order until a cluster accepts one.
pub(crate) fn knn_bodies(vector: &[f32], k: usize, num_candidates: usize) -> Vec<Value> {
    vec![
        json!({
            "size": k,
            "query": { "knn": { "embedding": {
                "vector": vector, "k": k, "num_candidates": num_candidates
            } } }
        }),
        json!({
            "size": k,
            "query": { "knn": {
                "field": "embedding", "query_vector": vector, "k": k, "num_candidates": num_candidates
            } }
        }),
        json!({
            "size": k,
            "query": { "knn": [{
                "field": "embedding", "query_vector": vector, "k": k, "num_candidates": num_candidates
            }] }
        }),
        json!({
            "size": k,
            "query": { "knn": { "field": "embedding", "query_vector": vector, "k": k } }
        }),
    ]
}

/// Body for the `_plugins/_knn/knn_search` endpoint.
pub(crate) fn knn_plugin_body(index: &str, vector: &[f32], k: usize, num_candidates: usize) -> Value {
    json!({
        "index": index,
        "queries": [{
            "field": "embedding",
            "query_vector": vector,
            "k": k,
            "num_candidates": num_candidates
        }]
    })
}

/// Search client for an OpenSearch domain.
pub struct OpenSearchBackend {
    client: reqwest::Client,
    endpoint: String,
    index: String,
    mode: OpenSearchMode,
    credentials: Option<(String, String)>,
    embedder: Option<Box<dyn Embedder>>,
}

impl OpenSearchBackend {
    pub fn new(
        endpoint: &str,
        index: &str,
        mode: OpenSearchMode,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(Error::Config("OPENSEARCH_ENDPOINT is not set".to_string()));
        }
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{}", endpoint)
        };

        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint,
            index: index.to_string(),
            mode,
            credentials: None,
            embedder: None,
        })
    }

    /// Build from configuration; vector modes need an embedder.
    pub fn from_config(config: &Config, embedder: Option<Box<dyn Embedder>>) -> Result<Self> {
        let endpoint = config
            .opensearch_endpoint
            .as_deref()
            .ok_or_else(|| Error::Config("OPENSEARCH_ENDPOINT is not set".to_string()))?;
        let mut backend = Self::new(
            endpoint,
            &config.opensearch_index,
            config.opensearch_mode,
            config.http_timeout,
        )?;
        if let (Some(user), Some(pass)) = (&config.opensearch_username, &config.opensearch_password) {
            backend = backend.with_basic_auth(user, pass);
        }
        if let Some(embedder) = embedder {
            backend = backend.with_embedder(embedder);
        }
        Ok(backend)
    }

    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn with_embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    async fn post(&self, path: &str, body: &Value) -> Result<SearchResponse> {
        let url = format!("{}/{}", self.endpoint, path.trim_start_matches('/'));
        debug!(url = %url, body = %truncated(body), "OpenSearch request");

        let mut request = self.client.post(&url).json(body);
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::unavailable(BACKEND, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::unavailable(
                BACKEND,
                format!("{} returned {}: {}", path, status, text.chars().take(200).collect::<String>()),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| Error::unavailable(BACKEND, e))
    }

    async fn search_index(&self, body: &Value) -> Result<Vec<Hit>> {
        let path = format!("{}/_search", self.index);
        Ok(self.post(&path, body).await?.into_hits())
    }

    fn embedder(&self) -> Result<&dyn Embedder> {
        self.embedder
            .as_deref()
            .ok_or_else(|| Error::Config("OpenSearch vector search needs an embedder".to_string()))
    }

    async fn text(&self, term: &str, size: usize, fields: &[&str]) -> Result<Vec<(String, RawRecord)>> {
        let hits = self.search_index(&text_body(term, size, fields)).await?;
        Ok(hits.into_iter().map(into_scored).collect())
    }

    /// BM25 prefilter, then cosine rescoring of the surviving ids.
    async fn vector(&self, term: &str, k: usize) -> Result<Vec<(String, RawRecord)>> {
        let candidate_ids: Vec<String> = match self
            .text(term, NUM_CANDIDATES.max(k), PREFILTER_FIELDS)
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .map(|(id, _)| id)
                .filter(|id| !id.is_empty())
                .collect(),
            Err(e) => {
                warn!(error = %e, "Text prefilter failed; scoring all documents");
                Vec::new()
            }
        };

        let vector = self.embedder()?.embed(term).await?;
        let (base_query, size) = if candidate_ids.is_empty() {
            (json!({ "match_all": {} }), k)
        } else {
            let size = candidate_ids.len().min(k.max(10));
            (json!({ "bool": { "filter": [{ "ids": { "values": candidate_ids } }] } }), size)
        };

        let hits = self
            .search_index(&script_score_body(base_query, &vector, size))
            .await?;
        Ok(hits.into_iter().take(k).map(into_scored).collect())
    }

    /// kNN hits, trying each query shape and then the fallbacks.
    async fn knn(&self, vector: &[f32], k: usize, num_candidates: usize) -> Result<Vec<(String, RawRecord)>> {
        let mut failures = Vec::new();

        for body in knn_bodies(vector, k, num_candidates) {
            match self.search_index(&body).await {
                Ok(hits) => return Ok(hits.into_iter().map(into_scored).collect()),
                Err(e) => {
                    warn!(error = %e, "kNN variant failed");
                    failures.push(e.to_string());
                }
            }
        }

        let fallback = script_score_body(json!({ "match_all": {} }), vector, k);
        match self.search_index(&fallback).await {
            Ok(hits) => return Ok(hits.into_iter().map(into_scored).collect()),
            Err(e) => {
                warn!(error = %e, "script_score fallback failed");
                failures.push(e.to_string());
            }
        }

        let body = knn_plugin_body(&self.index, vector, k, num_candidates);
        match self.post("_plugins/_knn/knn_search", &body).await {
            Ok(response) => Ok(response.into_hits().into_iter().map(into_scored).collect()),
            Err(e) => {
                warn!(error = %e, "knn_search plugin fallback failed");
                failures.push(e.to_string());
                Err(Error::unavailable(
                    BACKEND,
                    format!("All vector query variants failed: {}", failures.join(" | ")),
                ))
            }
        }
    }

    /// BM25 and kNN merged by reciprocal rank.
    async fn hybrid(&self, term: &str, size: usize) -> Result<Vec<RawRecord>> {
        let lexical = self.text(term, size, PREFILTER_FIELDS).await?;
        let vector = self.embedder()?.embed(term).await?;
        let semantic = self
            .knn(&vector, size, NUM_CANDIDATES.max(size * 20))
            .await?;
        debug!(lexical = lexical.len(), semantic = semantic.len(), "Fusing hybrid hits");
        Ok(fuse_records(lexical, semantic, size))
    }
}

fn truncated(body: &Value) -> String {
    body.to_string().chars().take(500).collect()
}

#[async_trait]
impl SearchBackend for OpenSearchBackend {
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
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<RawRecord> = match self.mode {
            OpenSearchMode::Text => self
                .text(term, limit, TEXT_FIELDS)
                .await?
                .into_iter()
                .map(|(_, record)| record)
                .collect(),
            OpenSearchMode::Vector => self
                .vector(term, limit)
                .await?
                .into_iter()
                .map(|(_, record)| record)
                .collect(),
            OpenSearchMode::Hybrid => self.hybrid(term, limit).await?,
        };

        let mut results: Vec<RawRecord> = records
            .into_iter()
            .filter(|r| !field_str(r, "name").trim().is_empty())
            .filter(|r| matches_filters(r, filters))
            .take(limit)
            .collect();
        for (i, record) in results.iter_mut().enumerate() {
            ensure_id(record, || format!("opensearch-{}", i));
            tag_source(record, source::OPENSEARCH);
        }

        info!(mode = ?self.mode, count = results.len(), "OpenSearch search complete");
        Ok(results)
    }
}
