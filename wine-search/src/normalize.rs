//! Schema normalization from backend records to [`WineRecord`].
//!
//! Backends disagree on key casing (`name` vs `Name`), nest extras under
//! `raw_data`, and use placeholder strings like `"N/A"` for missing values.
//! [`normalize`] folds all of that into one shape and never fails.

use serde_json::Value;

use crate::models::{source, RawRecord, WineRecord};

pub const UNKNOWN_WINE: &str = "Unknown Wine";
pub const UNKNOWN_WINERY: &str = "Unknown Winery";
pub const UNKNOWN_TYPE: &str = "Unknown Type";
pub const UNKNOWN_REGION: &str = "Unknown Region";
pub const UNKNOWN_COUNTRY: &str = "Unknown Country";
pub const NO_DESCRIPTION: &str = "No description available.";

const ID_KEYS: &[&str] = &["id", "wine_id", "WineID", "_id"];
const NAME_KEYS: &[&str] = &["name", "Name", "WineName", "wine"];
const WINERY_KEYS: &[&str] = &["winery", "Winery", "WineryName"];
const TYPE_KEYS: &[&str] = &["type", "Type"];
const REGION_KEYS: &[&str] = &["region", "Region", "RegionName", "location"];
const COUNTRY_KEYS: &[&str] = &["country", "Country"];
const VINTAGE_KEYS: &[&str] = &["vintage", "Vintage"];
const PRICE_KEYS: &[&str] = &["price", "Price"];
const RATING_KEYS: &[&str] = &["rating", "Rating"];
const ALCOHOL_KEYS: &[&str] = &[
    "alcohol_content",
    "alcoholContent",
    "AlcoholContent",
    "alcohol",
    "ABV",
];
const DESCRIPTION_KEYS: &[&str] = &["description", "Description"];
const TASTING_KEYS: &[&str] = &["tasting_notes", "tastingNotes"];
const PAIRING_KEYS: &[&str] = &["pairings", "Pairings", "food_pairing", "Harmonize"];
const IMAGE_KEYS: &[&str] = &["image_url", "imageUrl"];
const SOURCE_KEYS: &[&str] = &["source", "Source"];
const RELEVANCE_KEYS: &[&str] = &["relevance", "_relevance"];

/// Values that mean "missing" even though a string is present.
const PLACEHOLDERS: &[&str] = &["n/a", "na", "none", "null", "nan", "unknown"];

/// Normalize any backend record into the canonical shape.
pub fn normalize(raw: &RawRecord) -> WineRecord {
    let name = text(raw, NAME_KEYS).unwrap_or_else(|| UNKNOWN_WINE.to_string());
    let winery = text(raw, WINERY_KEYS).unwrap_or_else(|| UNKNOWN_WINERY.to_string());
    let description = text(raw, DESCRIPTION_KEYS).unwrap_or_else(|| NO_DESCRIPTION.to_string());
    let id = text(raw, ID_KEYS).unwrap_or_else(|| derived_id(&winery, &name));

    WineRecord {
        id,
        wine_type: text(raw, TYPE_KEYS).unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
        region: text(raw, REGION_KEYS).unwrap_or_else(|| UNKNOWN_REGION.to_string()),
        country: text(raw, COUNTRY_KEYS).unwrap_or_else(|| UNKNOWN_COUNTRY.to_string()),
        vintage: text(raw, VINTAGE_KEYS),
        price: number(raw, PRICE_KEYS),
        rating: number(raw, RATING_KEYS),
        alcohol_content: number(raw, ALCOHOL_KEYS),
        tasting_notes: text(raw, TASTING_KEYS).unwrap_or_else(|| description.clone()),
        pairings: list(raw, PAIRING_KEYS),
        image_url: text(raw, IMAGE_KEYS),
        source: text(raw, SOURCE_KEYS).unwrap_or_else(|| source::UNKNOWN.to_string()),
        relevance: number(raw, RELEVANCE_KEYS),
        name,
        winery,
        description,
    }
}

/// Stable identifier for records that arrive without one.
fn derived_id(winery: &str, name: &str) -> String {
    let slug = |s: &str| {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    };
    format!("{}:{}", slug(winery), slug(name))
}

/// Non-null value under `key`, top level before `raw_data`.
fn lookup<'a>(raw: &'a RawRecord, key: &str) -> Option<&'a Value> {
    raw.get(key).filter(|v| !v.is_null()).or_else(|| {
        raw.get("raw_data")
            .and_then(Value::as_object)
            .and_then(|inner| inner.get(key))
            .filter(|v| !v.is_null())
    })
}

fn text(raw: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| lookup(raw, key).and_then(value_text))
}

fn value_text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.is_finite() => format!("{}", f as i64),
            _ => n.to_string(),
        },
        _ => return None,
    };
    if s.is_empty() || PLACEHOLDERS.contains(&s.to_lowercase().as_str()) {
        None
    } else {
        Some(s)
    }
}

fn number(raw: &RawRecord, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| lookup(raw, key).and_then(value_number))
}

fn value_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .trim_end_matches('%')
            .replace(',', "")
            .trim()
            .parse()
            .ok()?,
        // SampleAPIs style {"average": "4.9", "reviews": "..."}
        Value::Object(map) => map.get("average").and_then(value_number)?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn list(raw: &RawRecord, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .find_map(|key| lookup(raw, key).map(value_list))
        .unwrap_or_default()
}

fn value_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        // X-Wines stores python-style lists: "['Beef', 'Lamb']"
        Value::String(s) => s
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(',')
            .map(|part| part.trim().trim_matches(|c| c == '\'' || c == '"'))
            .filter_map(|part| value_text(&Value::String(part.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}
