//! Priority-ordered search across the configured backends.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::backends::{
    DynamoWineTable, LocalVectorIndex, LocalWineStore, OpenSearchBackend, SampleApiBackend,
    SearchBackend,
};
use crate::config::{Config, OpenSearchMode};
use crate::embedding;
use crate::models::{SearchFilters, WineRecord};
use crate::normalize::normalize;
use crate::rerank::{rerank, MealContext};
use crate::{Error, Result};

/// Longest accepted search term, in characters, after sanitizing.
pub const MAX_TERM_LEN: usize = 100;

const STRIPPED_CHARS: &[char] = &['<', '>', '"', '\'', '&'];

/// Trim a search term and strip markup characters.
pub fn sanitize_term(term: &str) -> Result<String> {
    let sanitized: String = term
        .trim()
        .chars()
        .filter(|c| !STRIPPED_CHARS.contains(c))
        .collect();
    let sanitized = sanitized.trim();

    if sanitized.is_empty() {
        return Err(Error::InvalidInput("Wine name is required".to_string()));
    }
    if sanitized.chars().count() > MAX_TERM_LEN {
        return Err(Error::InvalidInput("Wine name is too long".to_string()));
    }
    Ok(sanitized.to_string())
}

/// Tries each backend in order and returns the first non-empty result set.
pub struct SearchOrchestrator {
    backends: Vec<Box<dyn SearchBackend>>,
    max_results: usize,
    pairing_rerank: bool,
}

impl SearchOrchestrator {
    pub fn new(backends: Vec<Box<dyn SearchBackend>>, max_results: usize) -> Self {
        Self {
            backends,
            max_results: max_results.max(1),
            pairing_rerank: true,
        }
    }

    pub fn with_pairing_rerank(mut self, enabled: bool) -> Self {
        self.pairing_rerank = enabled;
        self
    }

    /// Build the backend chain the configuration enables.
    ///
    /// Optional backends that fail to initialize are logged and left out;
    /// the local wine file is always last.
    pub async fn from_config(config: &Config, sdk_config: &aws_config::SdkConfig) -> Self {
        let mut backends: Vec<Box<dyn SearchBackend>> = Vec::new();

        if config.use_dynamodb {
            backends.push(Box::new(DynamoWineTable::from_config(config, sdk_config)));
        }

        if config.use_local_vector_search {
            let index = match embedding::from_config(config, sdk_config) {
                Ok(embedder) => {
                    LocalVectorIndex::open(
                        &config.local_vector_db_path,
                        &config.local_vector_embeddings_path,
                        embedder,
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            match index {
                Ok(index) => backends.push(Box::new(index)),
                Err(e) => warn!(error = %e, "Local vector search disabled"),
            }
        }

        if config.use_opensearch {
            let embedder = match config.opensearch_mode {
                OpenSearchMode::Text => Ok(None),
                _ => embedding::from_config(config, sdk_config).map(Some),
            };
            match embedder.and_then(|e| OpenSearchBackend::from_config(config, e)) {
                Ok(backend) => backends.push(Box::new(backend)),
                Err(e) => warn!(error = %e, "OpenSearch disabled"),
            }
        }

        backends.push(Box::new(LocalWineStore::load(&config.wine_data_path)));

        if config.use_sample_apis {
            match SampleApiBackend::from_config(config) {
                Ok(backend) => backends.push(Box::new(backend)),
                Err(e) => warn!(error = %e, "SampleAPIs disabled"),
            }
        }

        let orchestrator =
            Self::new(backends, config.max_results).with_pairing_rerank(config.use_pairing_rerank);
        info!(backends = ?orchestrator.backend_names(), "Search chain ready");
        orchestrator
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Search with the meal context detected from the term.
    pub async fn search(&self, term: &str, filters: &SearchFilters) -> Result<Vec<WineRecord>> {
        let mut rng = StdRng::from_entropy();
        self.search_with_rng(term, filters, None, &mut rng).await
    }

    /// Search with an explicit meal context.
    pub async fn search_with_context(
        &self,
        term: &str,
        filters: &SearchFilters,
        context: MealContext,
    ) -> Result<Vec<WineRecord>> {
        let mut rng = StdRng::from_entropy();
        self.search_with_rng(term, filters, Some(context), &mut rng)
            .await
    }

    /// Search using the given RNG for the re-rank tie-break.
    ///
    /// The term is validated before any backend is called. A backend that
    /// fails is logged and skipped; the first non-empty result set wins.
    pub async fn search_with_rng<R: Rng + Send>(
        &self,
        term: &str,
        filters: &SearchFilters,
        context: Option<MealContext>,
        rng: &mut R,
    ) -> Result<Vec<WineRecord>> {
        let term = sanitize_term(term)?;

        for backend in &self.backends {
            let records = match backend.search(&term, filters, self.max_results).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(backend = backend.name(), query = %term, error = %e, "Backend search failed");
                    continue;
                }
            };
            if records.is_empty() {
                debug!(backend = backend.name(), query = %term, "No results");
                continue;
            }

            info!(backend = backend.name(), query = %term, count = records.len(), "Found wines");
            let mut wines: Vec<WineRecord> = records.iter().map(normalize).collect();
            wines.truncate(self.max_results);

            if self.pairing_rerank {
                let context = context.or_else(|| MealContext::detect(&term));
                rerank(&mut wines, context, rng);
            }
            return Ok(wines);
        }

        info!(query = %term, "No wines found in any backend");
        Ok(Vec::new())
    }
}
