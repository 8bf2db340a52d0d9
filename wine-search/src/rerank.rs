//! Food-pairing re-ranking of search results.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::WineRecord;
use crate::{Error, Result};

/// Records within this fraction of the best relevance form the top tier.
const TOP_TIER_FRACTION: f64 = 0.10;

/// Tier size used when no record carries a relevance score.
const DEFAULT_TIER_SIZE: usize = 3;

/// A meal category detected from a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MealContext {
    RedMeat,
    Poultry,
    Seafood,
    Pork,
    Pasta,
    Cheese,
    Spicy,
    Dessert,
    Vegetarian,
}

impl MealContext {
    /// Every context, in detection priority order.
    pub const ALL: [MealContext; 9] = [
        MealContext::RedMeat,
        MealContext::Poultry,
        MealContext::Seafood,
        MealContext::Pork,
        MealContext::Pasta,
        MealContext::Cheese,
        MealContext::Spicy,
        MealContext::Dessert,
        MealContext::Vegetarian,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MealContext::RedMeat => "red meat",
            MealContext::Poultry => "poultry",
            MealContext::Seafood => "seafood",
            MealContext::Pork => "pork",
            MealContext::Pasta => "pasta",
            MealContext::Cheese => "cheese",
            MealContext::Spicy => "spicy",
            MealContext::Dessert => "dessert",
            MealContext::Vegetarian => "vegetarian",
        }
    }

    /// Words in a query that signal this context.
    fn triggers(self) -> &'static [&'static str] {
        match self {
            MealContext::RedMeat => &[
                "steak", "beef", "lamb", "burger", "burgers", "ribeye", "brisket", "venison",
                "red meat", "bbq", "barbecue",
            ],
            MealContext::Poultry => &["chicken", "turkey", "duck", "poultry", "quail"],
            MealContext::Seafood => &[
                "fish", "salmon", "shrimp", "oyster", "oysters", "lobster", "crab", "seafood",
                "sushi", "tuna", "scallops",
            ],
            MealContext::Pork => &["pork", "ham", "bacon", "sausage", "prosciutto"],
            MealContext::Pasta => &["pasta", "spaghetti", "lasagna", "pizza", "risotto"],
            MealContext::Cheese => &["cheese", "cheddar", "brie", "gouda", "parmesan", "charcuterie"],
            MealContext::Spicy => &["spicy", "curry", "thai", "indian", "szechuan", "tacos"],
            MealContext::Dessert => &["dessert", "chocolate", "cake", "pie", "ice cream", "tart"],
            MealContext::Vegetarian => &[
                "vegetarian", "vegan", "vegetables", "salad", "mushroom", "mushrooms", "tofu",
            ],
        }
    }

    /// Terms in a wine's text that earn a bonus under this context.
    fn pairing_terms(self) -> &'static [&'static str] {
        match self {
            MealContext::RedMeat => &[
                "beef", "lamb", "red meat", "steak", "game", "cabernet", "syrah", "malbec", "red",
            ],
            MealContext::Poultry => &["poultry", "chicken", "duck", "turkey", "pinot noir", "chardonnay"],
            MealContext::Seafood => &[
                "fish", "seafood", "shellfish", "salmon", "sauvignon blanc", "albarino", "white",
            ],
            MealContext::Pork => &["pork", "cured meat", "riesling", "pinot noir", "rose"],
            MealContext::Pasta => &["pasta", "pizza", "tomato", "sangiovese", "chianti", "barbera"],
            MealContext::Cheese => &["cheese", "port", "chardonnay", "champagne"],
            MealContext::Spicy => &["spicy", "riesling", "gewurztraminer", "off-dry", "zinfandel"],
            MealContext::Dessert => &["dessert", "sweet", "chocolate", "port", "sauternes", "late harvest"],
            MealContext::Vegetarian => &[
                "vegetarian", "vegetables", "mushrooms", "salad", "pinot grigio", "gruner",
            ],
        }
    }

    /// First context whose trigger words appear in the query.
    pub fn detect(query: &str) -> Option<Self> {
        let text = word_text(query);
        Self::ALL
            .into_iter()
            .find(|context| context.triggers().iter().any(|t| has_phrase(&text, t)))
    }
}

impl fmt::Display for MealContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MealContext {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace(['_', '-'], " ");
        Self::ALL
            .into_iter()
            .find(|context| context.name() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown meal context: {}", s)))
    }
}

/// Lowercased words separated by single spaces and padded at both ends.
fn word_text(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

fn has_phrase(word_text: &str, phrase: &str) -> bool {
    word_text.contains(&format!(" {} ", phrase))
}

/// Number of the context's pairing terms found in a wine's text fields.
pub fn pairing_bonus(wine: &WineRecord, context: MealContext) -> u32 {
    let haystack = word_text(&format!(
        "{} {} {} {}",
        wine.pairings.join(" "),
        wine.description,
        wine.tasting_notes,
        wine.wine_type
    ));
    context
        .pairing_terms()
        .iter()
        .filter(|term| has_phrase(&haystack, term))
        .count() as u32
}

/// Length of the leading run of records in the top relevance tier.
fn top_tier_len(wines: &[WineRecord]) -> usize {
    let best = wines
        .iter()
        .filter_map(|w| w.relevance)
        .fold(None, |best: Option<f64>, r| Some(best.map_or(r, |b| b.max(r))));

    match best {
        None => wines.len().min(DEFAULT_TIER_SIZE),
        Some(best) => {
            let threshold = best - best.abs() * TOP_TIER_FRACTION;
            wines
                .iter()
                .take_while(|w| w.relevance.is_some_and(|r| r >= threshold))
                .count()
        }
    }
}

/// Re-rank wines for a meal context.
///
/// Wines are stably re-sorted by pairing bonus. When no wine earns a bonus
/// (including when there is no context) the top relevance tier is shuffled.
pub fn rerank<R: Rng + ?Sized>(wines: &mut [WineRecord], context: Option<MealContext>, rng: &mut R) {
    if wines.len() < 2 {
        return;
    }

    let bonuses: Vec<u32> = match context {
        Some(context) => wines.iter().map(|w| pairing_bonus(w, context)).collect(),
        None => vec![0; wines.len()],
    };

    if bonuses.iter().all(|&b| b == 0) {
        let tier = top_tier_len(wines);
        wines[..tier].shuffle(rng);
        return;
    }

    let mut ranked: Vec<(u32, WineRecord)> = bonuses.into_iter().zip(wines.iter().cloned()).collect();
    ranked.sort_by_key(|(bonus, _)| Reverse(*bonus));
    for (slot, (_, wine)) in wines.iter_mut().zip(ranked) {
        *slot = wine;
    }
}
