//! Alexa Skill Lambda - Wine Assistant voice interactions.
//!
//! Searches for wines, keeps the results in the Alexa session, and answers
//! follow-up questions about the current wine.

use std::collections::HashMap;
use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wine_search::{
    Config, CursorMove, MealContext, ResponsePhraser, SearchFilters, SearchOrchestrator,
    SessionCursor, WineDetail,
};

const CARD_TITLE: &str = "Wine Assistant, your Sommelier";

const WELCOME: &str =
    "You can ask Wine Assistant for wine information. Say, Find a wine by its winery and name.";
const WELCOME_REPROMPT: &str =
    "You can ask me about a wine, then get details about the wine. What are you interested in?";
const HELP: &str = "Here are some things you can say: Find a wine by giving its name. \
Tell me its rating, price, location, or description. What would you like to do?";
const GOODBYE: &str = "Happy to help, goodbye!";
const WINE_NOT_FOUND: &str = "I'm sorry, I couldn't find that wine. \
Please try a different wine name or check the spelling.";
const API_ERROR: &str =
    "I'm having trouble connecting to the wine database right now. Please try again in a moment.";
const GENERAL_ERROR: &str = "I'm sorry, something went wrong. Please try again.";
const SEARCH_FIRST: &str = "Please search for a wine first.";
const DETAIL_PROMPT: &str =
    "You can ask for the price, rating, location, or description. What would you like to know?";
const ABOUT_THIS_WINE: &str = "What would you like to know about this wine?";

/// Searched when the wine slot is empty.
const DEFAULT_WINE: &str = "Goldeneye Pinot Noir Confluence 2014";

/// Alexa request envelope
#[derive(Debug, Deserialize)]
struct AlexaRequest {
    #[serde(default)]
    session: Option<Session>,
    request: Request,
}

#[derive(Debug, Default, Deserialize)]
struct Session {
    #[serde(default)]
    attributes: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Request {
    LaunchRequest,
    IntentRequest {
        intent: Intent,
    },
    SessionEndedRequest {
        #[serde(default)]
        reason: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct Intent {
    name: String,
    #[serde(default)]
    slots: HashMap<String, Slot>,
}

impl Intent {
    /// Non-empty value of a slot.
    fn slot(&self, name: &str) -> Option<&str> {
        self.slots
            .get(name)
            .and_then(|s| s.value.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct Slot {
    #[serde(default)]
    value: Option<String>,
}

/// Alexa response envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlexaResponse {
    version: String,
    session_attributes: Map<String, Value>,
    response: AlexaResponseBody,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlexaResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    output_speech: Option<OutputSpeech>,
    #[serde(skip_serializing_if = "Option::is_none")]
    card: Option<Card>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reprompt: Option<Reprompt>,
    should_end_session: bool,
}

#[derive(Debug, Serialize)]
struct OutputSpeech {
    #[serde(rename = "type")]
    speech_type: String,
    text: String,
}

impl OutputSpeech {
    fn plain(text: &str) -> Self {
        Self {
            speech_type: "PlainText".to_string(),
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Reprompt {
    output_speech: OutputSpeech,
}

#[derive(Debug, Serialize)]
struct Card {
    #[serde(rename = "type")]
    card_type: String,
    title: String,
    content: String,
}

impl AlexaResponseBody {
    /// Speak and end the session.
    fn tell(text: &str) -> Self {
        Self {
            output_speech: Some(OutputSpeech::plain(text)),
            should_end_session: true,
            ..Default::default()
        }
    }

    /// Speak and keep the session open for an answer.
    fn ask(text: &str, reprompt: &str) -> Self {
        Self {
            output_speech: Some(OutputSpeech::plain(text)),
            reprompt: Some(Reprompt {
                output_speech: OutputSpeech::plain(reprompt),
            }),
            should_end_session: false,
            ..Default::default()
        }
    }

    fn with_card(mut self, content: &str) -> Self {
        self.card = Some(Card {
            card_type: "Simple".to_string(),
            title: CARD_TITLE.to_string(),
            content: content.to_string(),
        });
        self
    }
}

/// Application state
struct AppState {
    orchestrator: SearchOrchestrator,
    phraser: ResponsePhraser,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.aws_region.clone()))
            .load()
            .await;

        Ok(Self {
            orchestrator: SearchOrchestrator::from_config(&config, &sdk_config).await,
            phraser: ResponsePhraser::from_config(&config, &sdk_config),
        })
    }

    async fn search(&self, intent: &Intent, cursor: &mut SessionCursor) -> AlexaResponseBody {
        let term = intent.slot("Wine").unwrap_or(DEFAULT_WINE);
        let context = intent.slot("Food").and_then(MealContext::detect);
        info!(search_term = term, context = ?context, "Searching for wine");

        let result = match context {
            Some(context) => {
                self.orchestrator
                    .search_with_context(term, &SearchFilters::default(), context)
                    .await
            }
            None => self.orchestrator.search(term, &SearchFilters::default()).await,
        };

        let wines = match result {
            Ok(wines) => wines,
            Err(wine_search::Error::InvalidInput(reason)) => {
                warn!(reason = %reason, "Rejected search term");
                return AlexaResponseBody::tell(GENERAL_ERROR);
            }
            Err(e) => {
                error!(error = %e, "Wine search failed");
                return AlexaResponseBody::tell(API_ERROR);
            }
        };

        if wines.is_empty() {
            return AlexaResponseBody::tell(WINE_NOT_FOUND);
        }

        let speech = if wines.len() == 1 {
            format!("I found {}. What would you like to know about it?", wines[0].name)
        } else {
            format!(
                "I found {} wines. The first wine is {}. What would you like to know about it?",
                wines.len(),
                wines[0].name
            )
        };
        cursor.set_results(wines);
        AlexaResponseBody::ask(&speech, DETAIL_PROMPT).with_card(&speech)
    }

    async fn detail(&self, intent: &Intent, cursor: &SessionCursor) -> AlexaResponseBody {
        let detail = match intent.slot("Action").map(str::parse::<WineDetail>) {
            Some(Ok(detail)) => detail,
            _ => {
                return AlexaResponseBody::ask(
                    "I didn't understand what you want to know. \
                     You can ask for price, rating, location, or description.",
                    ABOUT_THIS_WINE,
                );
            }
        };
        let Some(wine) = cursor.current() else {
            return AlexaResponseBody::tell(SEARCH_FIRST);
        };

        let speech = self.phraser.phrase(wine, detail).await;
        AlexaResponseBody::ask(&speech, "What else would you like to know about this wine?")
            .with_card(&speech)
    }
}

fn navigate(cursor: &mut SessionCursor, intent_name: &str) -> AlexaResponseBody {
    if cursor.is_empty() {
        return AlexaResponseBody::tell(SEARCH_FIRST);
    }

    let (moved, label, boundary) = match intent_name {
        "AMAZON.NextIntent" => (cursor.advance(), "next", "last"),
        "AMAZON.PreviousIntent" => (cursor.retreat(), "previous", "first"),
        _ => {
            cursor.reset();
            (CursorMove::Moved, "first", "first")
        }
    };
    let name = cursor.current().map(|w| w.name.as_str()).unwrap_or_default();

    let speech = match (moved, intent_name) {
        (CursorMove::AtBoundary, _) => format!(
            "You're already at the {} wine. The current wine is {}. What would you like to know about it?",
            boundary, name
        ),
        (CursorMove::Moved, "AMAZON.StartOverIntent") => format!(
            "Starting over. The first wine is {}. What would you like to know about it?",
            name
        ),
        (CursorMove::Moved, _) => format!(
            "The {} wine is {}. What would you like to know about it?",
            label, name
        ),
    };
    AlexaResponseBody::ask(&speech, ABOUT_THIS_WINE)
}

async fn handle(state: &AppState, request: AlexaRequest) -> AlexaResponse {
    let mut attributes = request
        .session
        .and_then(|s| s.attributes)
        .unwrap_or_default();
    let mut cursor = SessionCursor::from_attributes(&attributes);

    let body = match request.request {
        Request::LaunchRequest => {
            info!("LaunchRequest received");
            AlexaResponseBody::ask(WELCOME, WELCOME_REPROMPT).with_card(WELCOME)
        }
        Request::IntentRequest { intent } => {
            info!(intent = %intent.name, "IntentRequest received");
            match intent.name.as_str() {
                "wineSearchIntent" => state.search(&intent, &mut cursor).await,
                "wineActionDetailIntent" => state.detail(&intent, &cursor).await,
                "getWineDetailsIntent" => match cursor.current() {
                    Some(wine) => AlexaResponseBody::ask(
                        &format!(
                            "What would you like to know about {}? \
                             You can ask for the price, rating, location, or description.",
                            wine.name
                        ),
                        "What would you like to know?",
                    ),
                    None => AlexaResponseBody::tell(SEARCH_FIRST),
                },
                "AMAZON.NextIntent" | "AMAZON.PreviousIntent" | "AMAZON.StartOverIntent" => {
                    navigate(&mut cursor, &intent.name)
                }
                "AMAZON.CancelIntent" | "AMAZON.StopIntent" => AlexaResponseBody::tell(GOODBYE),
                _ => AlexaResponseBody::ask(HELP, HELP),
            }
        }
        Request::SessionEndedRequest { reason } => {
            info!(reason = ?reason, "SessionEndedRequest received");
            AlexaResponseBody {
                should_end_session: true,
                ..Default::default()
            }
        }
        Request::Unknown => {
            warn!("Unsupported request type");
            AlexaResponseBody::tell(GENERAL_ERROR)
        }
    };

    cursor.write_attributes(&mut attributes);
    AlexaResponse {
        version: "1.0".to_string(),
        session_attributes: attributes,
        response: body,
    }
}

async fn handler(state: Arc<AppState>, event: LambdaEvent<Value>) -> Result<AlexaResponse, Error> {
    let (payload, _context) = event.into_parts();

    let request: AlexaRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Failed to parse Alexa request");
            return Ok(AlexaResponse {
                version: "1.0".to_string(),
                session_attributes: Map::new(),
                response: AlexaResponseBody::tell(GENERAL_ERROR),
            });
        }
    };

    Ok(handle(&state, request).await)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    lambda_runtime::run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
