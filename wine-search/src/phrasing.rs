//! Spoken answers about a wine's price, rating, location or description.

use std::fmt;
use std::str::FromStr;

use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message, SystemContentBlock,
};
use aws_sdk_bedrockruntime::Client as BedrockClient;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::WineRecord;
use crate::{Error, Result};

const SYSTEM_PROMPT: &str = "You are a friendly sommelier answering through a voice assistant. \
Reply in one or two short spoken sentences using only the facts provided. \
Do not use markdown, lists or emoji.";

/// A detail the user can ask about the current wine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WineDetail {
    Price,
    Rating,
    Location,
    Description,
}

impl WineDetail {
    pub const ALL: [WineDetail; 4] = [
        WineDetail::Price,
        WineDetail::Rating,
        WineDetail::Location,
        WineDetail::Description,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WineDetail::Price => "price",
            WineDetail::Rating => "rating",
            WineDetail::Location => "location",
            WineDetail::Description => "description",
        }
    }
}

impl fmt::Display for WineDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WineDetail {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|detail| detail.as_str() == wanted)
            .ok_or_else(|| {
                Error::InvalidInput(
                    "Invalid action. Valid actions are: price, rating, location, description"
                        .to_string(),
                )
            })
    }
}

fn format_rating(rating: f64) -> String {
    if rating.fract() == 0.0 {
        format!("{:.0}", rating)
    } else {
        format!("{:.1}", rating)
    }
}

/// Deterministic answer built from the record alone.
pub fn describe(wine: &WineRecord, detail: WineDetail) -> String {
    let name = &wine.name;
    match detail {
        WineDetail::Price => match wine.price {
            Some(price) => format!("The price of {} is ${:.2}.", name, price),
            None => format!("I don't have a price for {}.", name),
        },
        WineDetail::Rating => match wine.rating {
            Some(rating) => format!(
                "The rating of {} is {} out of 5 stars.",
                name,
                format_rating(rating)
            ),
            None => format!("I don't have a rating for {}.", name),
        },
        WineDetail::Location => format!("{} is from {}, {}.", name, wine.region, wine.country),
        WineDetail::Description => {
            format!("Here's the description of {}: {}", name, wine.description)
        }
    }
}

/// Phrases answers with a Bedrock text model when enabled.
pub struct ResponsePhraser {
    llm: Option<(BedrockClient, String)>,
}

impl ResponsePhraser {
    /// Template answers only.
    pub fn templates() -> Self {
        Self { llm: None }
    }

    pub fn bedrock(client: BedrockClient, model_id: impl Into<String>) -> Self {
        Self {
            llm: Some((client, model_id.into())),
        }
    }

    pub fn from_config(config: &Config, sdk_config: &aws_config::SdkConfig) -> Self {
        if config.use_llm_phrasing {
            Self::bedrock(
                BedrockClient::new(sdk_config),
                config.bedrock_text_model_id.clone(),
            )
        } else {
            Self::templates()
        }
    }

    /// Answer about `detail`, falling back to the template on any failure.
    pub async fn phrase(&self, wine: &WineRecord, detail: WineDetail) -> String {
        let Some((client, model_id)) = &self.llm else {
            return describe(wine, detail);
        };
        match converse(client, model_id, wine, detail).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => describe(wine, detail),
            Err(e) => {
                warn!(error = %e, detail = %detail, "LLM phrasing failed; using template");
                describe(wine, detail)
            }
        }
    }
}

async fn converse(
    client: &BedrockClient,
    model_id: &str,
    wine: &WineRecord,
    detail: WineDetail,
) -> Result<String> {
    let facts = json!({
        "name": wine.name,
        "winery": wine.winery,
        "type": wine.wine_type,
        "region": wine.region,
        "country": wine.country,
        "price": wine.price,
        "rating_out_of_5": wine.rating,
        "description": wine.description,
        "pairings": wine.pairings,
    });
    let prompt = format!(
        "The user asked about the {} of this wine.\nFacts: {}",
        detail, facts
    );

    let message = Message::builder()
        .role(ConversationRole::User)
        .content(ContentBlock::Text(prompt))
        .build()
        .map_err(|e| Error::Aws(format!("Failed to build Bedrock message: {}", e)))?;

    let response = client
        .converse()
        .model_id(model_id)
        .system(SystemContentBlock::Text(SYSTEM_PROMPT.to_string()))
        .messages(message)
        .inference_config(
            InferenceConfiguration::builder()
                .max_tokens(150)
                .temperature(0.3)
                .build(),
        )
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Bedrock converse failed: {}", e)))?;

    let text = response
        .output()
        .and_then(|output| output.as_message().ok())
        .map(|message| {
            message
                .content()
                .iter()
                .filter_map(|block| block.as_text().ok())
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    debug!(model_id, chars = text.len(), "LLM phrasing complete");
    Ok(text)
}
