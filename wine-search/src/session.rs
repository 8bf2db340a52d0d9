//! Result list and cursor carried across conversational turns.

use serde_json::{Map, Value};
use tracing::warn;

use crate::models::WineRecord;

/// Session attribute holding the serialized result list.
pub const WINE_LIST_KEY: &str = "wine_list";

/// Session attribute holding the zero-based cursor.
pub const CURRENT_INDEX_KEY: &str = "current_wine_index";

/// Outcome of a cursor move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMove {
    Moved,
    /// Already at the first or last result; the index is unchanged
    AtBoundary,
}

/// The current search results and which one the user is looking at.
///
/// The index always points into `results` when it is non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionCursor {
    results: Vec<WineRecord>,
    index: usize,
}

impl SessionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the results and point at the first one.
    pub fn set_results(&mut self, results: Vec<WineRecord>) {
        self.results = results;
        self.index = 0;
    }

    pub fn results(&self) -> &[WineRecord] {
        &self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&WineRecord> {
        self.results.get(self.index)
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.results.len()
    }

    pub fn advance(&mut self) -> CursorMove {
        if self.is_last() {
            return CursorMove::AtBoundary;
        }
        self.index += 1;
        CursorMove::Moved
    }

    pub fn retreat(&mut self) -> CursorMove {
        if self.index == 0 {
            return CursorMove::AtBoundary;
        }
        self.index -= 1;
        CursorMove::Moved
    }

    /// Go back to the first result, keeping the list.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Restore from session attributes, clamping a stale index.
    pub fn from_attributes(attributes: &Map<String, Value>) -> Self {
        let results = match attributes.get(WINE_LIST_KEY) {
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!(error = %e, "Discarding unreadable wine list from session");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let stored = attributes
            .get(CURRENT_INDEX_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        let index = stored.min(results.len().saturating_sub(1));
        Self { results, index }
    }

    /// Write the list and index into session attributes.
    pub fn write_attributes(&self, attributes: &mut Map<String, Value>) {
        let list = serde_json::to_value(&self.results).unwrap_or(Value::Array(Vec::new()));
        attributes.insert(WINE_LIST_KEY.to_string(), list);
        attributes.insert(CURRENT_INDEX_KEY.to_string(), Value::from(self.index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;

    fn wines(names: &[&str]) -> Vec<WineRecord> {
        names
            .iter()
            .map(|name| match json!({ "name": name }) {
                Value::Object(map) => normalize(&map),
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_empty_cursor() {
        let mut cursor = SessionCursor::new();
        assert!(cursor.current().is_none());
        assert_eq!(cursor.advance(), CursorMove::AtBoundary);
        assert_eq!(cursor.retreat(), CursorMove::AtBoundary);
        assert_eq!(cursor.current_index(), 0);
    }

    #[test]
    fn test_navigation_clamps_at_both_ends() {
        let mut cursor = SessionCursor::new();
        cursor.set_results(wines(&["A", "B", "C"]));

        assert_eq!(cursor.retreat(), CursorMove::AtBoundary);
        assert_eq!(cursor.current_index(), 0);

        assert_eq!(cursor.advance(), CursorMove::Moved);
        assert_eq!(cursor.advance(), CursorMove::Moved);
        assert_eq!(cursor.current().unwrap().name, "C");
        assert_eq!(cursor.advance(), CursorMove::AtBoundary);
        assert_eq!(cursor.current_index(), 2);

        assert_eq!(cursor.retreat(), CursorMove::Moved);
        assert_eq!(cursor.current().unwrap().name, "B");

        cursor.reset();
        assert_eq!(cursor.current_index(), 0);
        assert_eq!(cursor.results().len(), 3);
    }

    #[test]
    fn test_new_results_reset_index() {
        let mut cursor = SessionCursor::new();
        cursor.set_results(wines(&["A", "B"]));
        cursor.advance();
        cursor.set_results(wines(&["C"]));
        assert_eq!(cursor.current_index(), 0);
        assert_eq!(cursor.current().unwrap().name, "C");
    }

    #[test]
    fn test_attributes_round_trip() {
        let mut cursor = SessionCursor::new();
        cursor.set_results(wines(&["A", "B"]));
        cursor.advance();

        let mut attributes = Map::new();
        cursor.write_attributes(&mut attributes);
        assert_eq!(attributes[CURRENT_INDEX_KEY], 1);

        let restored = SessionCursor::from_attributes(&attributes);
        assert_eq!(restored, cursor);
    }

    #[test]
    fn test_out_of_range_index_is_clamped_on_load() {
        let mut cursor = SessionCursor::new();
        cursor.set_results(wines(&["A", "B"]));
        let mut attributes = Map::new();
        cursor.write_attributes(&mut attributes);
        attributes.insert(CURRENT_INDEX_KEY.to_string(), json!(9));

        let restored = SessionCursor::from_attributes(&attributes);
        assert_eq!(restored.current_index(), 1);
    }

    #[test]
    fn test_garbage_attributes_give_empty_cursor() {
        let attributes = match json!({ "wine_list": "not a list", "current_wine_index": -3 }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let restored = SessionCursor::from_attributes(&attributes);
        assert!(restored.is_empty());
        assert_eq!(restored.current_index(), 0);
    }
}
