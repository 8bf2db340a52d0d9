//! Wine search library for the Wine Assistant Alexa skill.
//!
//! Searches a chain of backends (DynamoDB, a local embedding index,
//! OpenSearch, a local JSON file and the public SampleAPIs wine lists),
//! normalizes whatever the first successful backend returns, and
//! optionally re-ranks for food pairing.

pub mod backends;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod phrasing;
pub mod rerank;
pub mod session;

pub use backends::SearchBackend;
pub use config::{Config, EmbedProvider, OpenSearchMode};
pub use error::{Error, Result};
pub use fusion::{reciprocal_rank_fusion, FusedScore};
pub use models::{RawRecord, SearchFilters, WineRecord};
pub use normalize::normalize;
pub use orchestrator::{sanitize_term, SearchOrchestrator};
pub use phrasing::{describe, ResponsePhraser, WineDetail};
pub use rerank::MealContext;
pub use session::{CursorMove, SessionCursor};
