//! Reciprocal Rank Fusion of lexical and vector result lists.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use crate::models::RawRecord;

/// Offset added to the 1-based rank: score = Σ 1 / (rank + RANK_OFFSET).
pub const RANK_OFFSET: f64 = 1.0;

/// A fused item with its combined score and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    pub id: String,
    pub score: f64,
    /// 1-based position in the lexical list
    pub lexical_rank: Option<usize>,
    /// 1-based position in the vector list
    pub vector_rank: Option<usize>,
}

fn contribution(rank: usize) -> f64 {
    1.0 / (rank as f64 + RANK_OFFSET)
}

/// Merge two ranked id lists.
///
/// Items are summed by id and sorted by combined score, highest first. Ties
/// go to the better lexical rank; items missing from the lexical list sort
/// after those present, then by vector rank. Empty ids are ignored and only
/// the first occurrence of an id within one list counts.
pub fn reciprocal_rank_fusion<L, V>(lexical: &[L], vector: &[V]) -> Vec<FusedScore>
where
    L: AsRef<str>,
    V: AsRef<str>,
{
    let mut fused: Vec<FusedScore> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (i, id) in lexical.iter().map(AsRef::as_ref).enumerate() {
        if id.is_empty() || positions.contains_key(id) {
            continue;
        }
        positions.insert(id, fused.len());
        fused.push(FusedScore {
            id: id.to_string(),
            score: contribution(i + 1),
            lexical_rank: Some(i + 1),
            vector_rank: None,
        });
    }

    for (i, id) in vector.iter().map(AsRef::as_ref).enumerate() {
        if id.is_empty() {
            continue;
        }
        match positions.get(id) {
            Some(&slot) => {
                let entry = &mut fused[slot];
                if entry.vector_rank.is_none() {
                    entry.vector_rank = Some(i + 1);
                    entry.score += contribution(i + 1);
                }
            }
            None => {
                positions.insert(id, fused.len());
                fused.push(FusedScore {
                    id: id.to_string(),
                    score: contribution(i + 1),
                    lexical_rank: None,
                    vector_rank: Some(i + 1),
                });
            }
        }
    }

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| rank_key(a.lexical_rank).cmp(&rank_key(b.lexical_rank)))
            .then_with(|| rank_key(a.vector_rank).cmp(&rank_key(b.vector_rank)))
    });
    fused
}

fn rank_key(rank: Option<usize>) -> usize {
    rank.unwrap_or(usize::MAX)
}

/// Fuse two lists of `(id, record)` hits into at most `size` records.
///
/// Each returned record carries its fused score under `_relevance`. When an
/// id appears in both lists the vector copy of the record wins, matching the
/// order the hits are read in.
pub fn fuse_records(
    lexical: Vec<(String, RawRecord)>,
    vector: Vec<(String, RawRecord)>,
    size: usize,
) -> Vec<RawRecord> {
    let lexical_ids: Vec<&str> = lexical.iter().map(|(id, _)| id.as_str()).collect();
    let vector_ids: Vec<&str> = vector.iter().map(|(id, _)| id.as_str()).collect();
    let ranking = reciprocal_rank_fusion(&lexical_ids, &vector_ids);

    let mut records: HashMap<String, RawRecord> = HashMap::new();
    for (id, record) in lexical.iter().chain(vector.iter()) {
        if !id.is_empty() {
            records.insert(id.clone(), record.clone());
        }
    }

    ranking
        .into_iter()
        .take(size)
        .filter_map(|fused| {
            let mut record = records.remove(&fused.id)?;
            if let Some(score) = serde_json::Number::from_f64(fused.score) {
                record.insert("_relevance".to_string(), Value::Number(score));
            }
            Some(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(id: &str, name: &str) -> (String, RawRecord) {
        let record = json!({ "name": name }).as_object().cloned().unwrap();
        (id.to_string(), record)
    }

    #[test]
    fn test_item_in_both_lists_beats_single_list_item() {
        let results = reciprocal_rank_fusion(&["a", "b"], &["a", "c"]);
        let a = results.iter().find(|f| f.id == "a").unwrap();
        let b = results.iter().find(|f| f.id == "b").unwrap();
        let c = results.iter().find(|f| f.id == "c").unwrap();
        assert!(a.score >= b.score);
        assert!(a.score >= c.score);
        assert_eq!(results[0].id, "a");
        assert!((a.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_contribution_uses_one_based_rank() {
        let results = reciprocal_rank_fusion(&["x", "y", "z"], &[] as &[&str]);
        let scores: Vec<f64> = results.iter().map(|f| f.score).collect();
        assert!((scores[0] - 0.5).abs() < 1e-9);
        assert!((scores[1] - 1.0 / 3.0).abs() < 1e-9);
        assert!((scores[2] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_ties_break_by_lexical_rank() {
        // "b" (lexical #2) and "d" (vector #2) score the same; lexical wins.
        let results = reciprocal_rank_fusion(&["a", "b"], &["c", "d"]);
        let ids: Vec<&str> = results.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_one_empty_list_preserves_other_order() {
        let results = reciprocal_rank_fusion(&[] as &[&str], &["v1", "v2", "v3"]);
        let ids: Vec<&str> = results.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);

        assert!(reciprocal_rank_fusion(&[] as &[&str], &[] as &[&str]).is_empty());
    }

    #[test]
    fn test_duplicates_and_empty_ids_are_ignored() {
        let results = reciprocal_rank_fusion(&["a", "", "a"], &["a", "a"]);
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fuse_records_attaches_relevance_and_truncates() {
        let fused = fuse_records(
            vec![hit("1", "Alpha"), hit("2", "Beta")],
            vec![hit("2", "Beta"), hit("3", "Gamma")],
            2,
        );
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0]["name"], "Beta");
        assert!(fused[0]["_relevance"].as_f64().unwrap() > fused[1]["_relevance"].as_f64().unwrap());
        assert_eq!(fused[1]["name"], "Alpha");
    }
}
