//! Configuration management for the wine search Lambda.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Which service computes query embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedProvider {
    Ollama,
    Bedrock,
}

/// How the OpenSearch backend queries its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenSearchMode {
    /// BM25 multi_match only
    Text,
    /// BM25 prefilter, cosine rescore
    Vector,
    /// BM25 and kNN merged by reciprocal rank
    Hybrid,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// AWS region
    pub aws_region: String,
    /// Maximum wines returned by a search
    pub max_results: usize,
    /// Timeout applied to outbound HTTP calls
    pub http_timeout: Duration,
    /// Local JSON wine database (last-resort backend)
    pub wine_data_path: PathBuf,
    /// Query DynamoDB first
    pub use_dynamodb: bool,
    /// Prefix for DynamoDB table names
    pub dynamodb_table_prefix: String,
    /// Override endpoint, e.g. DynamoDB Local
    pub dynamodb_endpoint_url: Option<String>,
    /// Query the local embedding index
    pub use_local_vector_search: bool,
    /// SQLite database holding the wines table
    pub local_vector_db_path: PathBuf,
    /// Precomputed embeddings JSON
    pub local_vector_embeddings_path: PathBuf,
    /// Query OpenSearch
    pub use_opensearch: bool,
    pub opensearch_mode: OpenSearchMode,
    pub opensearch_endpoint: Option<String>,
    pub opensearch_index: String,
    pub opensearch_username: Option<String>,
    pub opensearch_password: Option<String>,
    pub embed_provider: EmbedProvider,
    pub ollama_base_url: String,
    pub ollama_embed_model: String,
    /// Expected embedding dimension (0 disables the check)
    pub embed_dim: usize,
    pub bedrock_embedding_model_id: String,
    /// Query the public SampleAPIs wine lists after the local file
    pub use_sample_apis: bool,
    pub sample_api_base_url: String,
    /// Apply food-pairing re-ranking to results
    pub use_pairing_rerank: bool,
    /// Phrase spoken answers with a Bedrock text model
    pub use_llm_phrasing: bool,
    pub bedrock_text_model_id: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let flag = |key: &str, default: bool| get(key).map(|v| parse_bool(&v)).unwrap_or(default);
        let number = |key: &str, default: usize| -> Result<usize> {
            match get(key) {
                Some(v) => v
                    .parse()
                    .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got {:?}", key, v))),
                None => Ok(default),
            }
        };

        let use_vector = flag("USE_VECTOR_SEARCH", false);
        let use_hybrid = flag("USE_HYBRID_SEARCH", true);
        let opensearch_mode = match (use_vector, use_hybrid) {
            (false, _) => OpenSearchMode::Text,
            (true, true) => OpenSearchMode::Hybrid,
            (true, false) => OpenSearchMode::Vector,
        };

        let embed_provider = match get("EMBED_PROVIDER").map(|v| v.to_lowercase()).as_deref() {
            None | Some("ollama") => EmbedProvider::Ollama,
            Some("bedrock") => EmbedProvider::Bedrock,
            Some(other) => {
                return Err(Error::Config(format!("Unknown EMBED_PROVIDER: {}", other)));
            }
        };

        let config = Self {
            aws_region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            max_results: number("WINE_API_MAX_RESULTS", 5)?.max(1),
            http_timeout: Duration::from_secs(number("WINE_API_TIMEOUT", 10)? as u64),
            wine_data_path: get("WINE_DATA_PATH")
                .unwrap_or_else(|| "wine_data.json".to_string())
                .into(),
            use_dynamodb: flag("USE_DYNAMODB", false),
            dynamodb_table_prefix: get("DYNAMODB_TABLE_PREFIX")
                .unwrap_or_else(|| "wine_skill_".to_string()),
            dynamodb_endpoint_url: get("DYNAMODB_ENDPOINT_URL"),
            use_local_vector_search: flag("USE_LOCAL_VECTOR_SEARCH", false),
            local_vector_db_path: get("XWINES_DB_PATH")
                .unwrap_or_else(|| "data/xwines.db".to_string())
                .into(),
            local_vector_embeddings_path: get("XWINES_EMB_PATH")
                .unwrap_or_else(|| "data/xwines_embeddings.json".to_string())
                .into(),
            use_opensearch: flag("USE_OPENSEARCH", false),
            opensearch_mode,
            opensearch_endpoint: get("OPENSEARCH_ENDPOINT"),
            opensearch_index: get("OPENSEARCH_INDEX").unwrap_or_else(|| "xwines".to_string()),
            opensearch_username: get("OPENSEARCH_USERNAME"),
            opensearch_password: get("OPENSEARCH_PASSWORD"),
            embed_provider,
            ollama_base_url: get("OLLAMA_BASE_URL")
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            ollama_embed_model: get("OLLAMA_EMBED_MODEL")
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            embed_dim: number("EMBED_DIM", 768)?,
            bedrock_embedding_model_id: get("BEDROCK_EMBEDDING_MODEL_ID")
                .unwrap_or_else(|| "amazon.titan-embed-text-v2:0".to_string()),
            use_sample_apis: flag("USE_SAMPLE_APIS", true),
            sample_api_base_url: get("SAMPLE_API_BASE_URL")
                .unwrap_or_else(|| "https://api.sampleapis.com/wines".to_string())
                .trim_end_matches('/')
                .to_string(),
            use_pairing_rerank: flag("USE_PAIRING_RERANK", true),
            use_llm_phrasing: flag("USE_LLM_PHRASING", false),
            bedrock_text_model_id: get("BEDROCK_TEXT_MODEL_ID")
                .unwrap_or_else(|| "anthropic.claude-3-haiku-20240307-v1:0".to_string()),
        };

        if config.use_opensearch && config.opensearch_endpoint.is_none() {
            return Err(Error::Config(
                "USE_OPENSEARCH is set but OPENSEARCH_ENDPOINT is not".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "y")
}
