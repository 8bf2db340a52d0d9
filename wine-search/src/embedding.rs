//! Query embeddings from Ollama or Amazon Bedrock.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, EmbedProvider};
use crate::{Error, Result};

const BACKEND: &str = "embedding";

/// Turns query text into a vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Build the embedder selected by `EMBED_PROVIDER`.
pub fn from_config(
    config: &Config,
    sdk_config: &aws_config::SdkConfig,
) -> Result<Box<dyn Embedder>> {
    Ok(match config.embed_provider {
        EmbedProvider::Ollama => Box::new(OllamaEmbedder::new(
            &config.ollama_base_url,
            &config.ollama_embed_model,
            config.embed_dim,
            config.http_timeout,
        )?),
        EmbedProvider::Bedrock => Box::new(BedrockEmbedder::new(
            BedrockClient::new(sdk_config),
            config.bedrock_embedding_model_id.clone(),
            config.embed_dim,
        )),
    })
}

fn check_dimension(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if vector.is_empty() || (expected > 0 && vector.len() != expected) {
        return Err(Error::unavailable(
            BACKEND,
            format!("Embedding length {} != EMBED_DIM={}", vector.len(), expected),
        ));
    }
    Ok(vector)
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaData {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    data: Option<Vec<OllamaData>>,
}

/// Embeddings from a local Ollama server.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, dimension: usize, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| Error::unavailable(BACKEND, e))?;

        if !response.status().is_success() {
            return Err(Error::unavailable(
                BACKEND,
                format!("Ollama returned {}", response.status()),
            ));
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| Error::unavailable(BACKEND, e))?;
        let vector = body
            .embedding
            .or_else(|| body.data.and_then(|d| d.into_iter().next()).map(|d| d.embedding))
            .ok_or_else(|| Error::unavailable(BACKEND, "No embedding in Ollama response"))?;

        debug!(provider = "ollama", dims = vector.len(), "Embedded query");
        check_dimension(vector, self.dimension)
    }
}

#[derive(Deserialize)]
struct TitanValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct TitanResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    embeddings: Option<TitanValues>,
}

/// Embeddings from a Bedrock Titan model.
pub struct BedrockEmbedder {
    client: BedrockClient,
    model_id: String,
    dimension: usize,
}

impl BedrockEmbedder {
    pub fn new(client: BedrockClient, model_id: String, dimension: usize) -> Self {
        Self {
            client,
            model_id,
            dimension,
        }
    }
}

#[async_trait]
impl Embedder for BedrockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::to_vec(&serde_json::json!({ "inputText": text }))?;

        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| Error::unavailable(BACKEND, format!("Bedrock invoke_model failed: {}", e)))?;

        let parsed: TitanResponse = serde_json::from_slice(response.body().as_ref())
            .map_err(|e| Error::unavailable(BACKEND, format!("Unexpected Bedrock response: {}", e)))?;
        let vector = parsed
            .embedding
            .or_else(|| parsed.embeddings.map(|e| e.values))
            .ok_or_else(|| Error::unavailable(BACKEND, "No embedding in Bedrock response"))?;

        debug!(provider = "bedrock", dims = vector.len(), "Embedded query");
        check_dimension(vector, self.dimension)
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
