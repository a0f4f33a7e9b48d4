use crate::config::{CompareKind, CompareRule};
use crate::models::{ComparisonVector, Record, RecordPair};
use crate::normalize::normalize_text;
use rayon::prelude::*;
use std::collections::HashMap;

/// Rank assigned when an identifier has no entry in the rank map.
pub const DEFAULT_RANK: f64 = 7.0;

/// Exact comparator: 1.0 iff both values are present and equal after
/// normalization, else 0.0.
fn score_exact(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if normalize_text(a) == normalize_text(b) => 1.0,
        _ => 0.0,
    }
}

/// String comparator: Damerau-Levenshtein distance normalized by the longer
/// length, converted to a similarity in [0,1]. Null either side scores 0.0.
fn score_string(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let a = normalize_text(a);
            let b = normalize_text(b);
            let max_len = a.chars().count().max(b.chars().count());
            if max_len == 0 {
                return 0.0;
            }
            let dist = strsim::damerau_levenshtein(&a, &b);
            1.0 - (dist as f64 / max_len as f64)
        }
        _ => 0.0,
    }
}

fn score_rule(rule: &CompareRule, left: &Record, right: &Record) -> f64 {
    let a = left.field(&rule.left_field);
    let b = right.field(&rule.right_field);
    match rule.kind {
        CompareKind::Exact => score_exact(a, b),
        CompareKind::String => score_string(a, b),
    }
}

/// Frequency rank of a field's values: the six most frequent values get ranks
/// 1..=6, everything else (and records without the field) ranks 7.
pub fn rank_by_frequency(records: &[Record], field: &str) -> HashMap<String, f64> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for r in records {
        if let Some(v) = r.field(field) {
            *counts.entry(normalize_text(v)).or_default() += 1;
        }
    }
    let mut ordered: Vec<(String, usize)> = counts.into_iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let value_rank: HashMap<&str, f64> = ordered
        .iter()
        .enumerate()
        .map(|(i, (v, _))| (v.as_str(), ((i + 1).min(7)) as f64))
        .collect();

    let mut ranks = HashMap::new();
    for r in records {
        if let Some(v) = r.field(field) {
            if let Some(&rank) = value_rank.get(normalize_text(v).as_str()) {
                ranks.insert(r.id.clone(), rank);
            }
        }
    }
    ranks
}

/// Compare one block of candidate pairs against the configured rule list.
///
/// Pairs are independent, so scoring runs on the rayon pool. A pair whose
/// identifiers cannot be resolved in the record index is skipped (it cannot
/// arise from blocking over the same record set). After scoring, every value
/// strictly below `threshold` is suppressed to exactly 0.0, and the rank
/// feature is joined on the pair's first identifier.
pub fn compare_block(
    index: &HashMap<&str, &Record>,
    pairs: &[RecordPair],
    rules: &[CompareRule],
    threshold: f64,
    ranks: &HashMap<String, f64>,
) -> Vec<ComparisonVector> {
    pairs
        .par_iter()
        .filter_map(|pair| {
            let left = index.get(pair.id1())?;
            let right = index.get(pair.id2())?;
            let scores: Vec<f64> = rules
                .iter()
                .map(|rule| {
                    let s = score_rule(rule, left, right);
                    if s < threshold { 0.0 } else { s }
                })
                .collect();
            let rank = ranks.get(pair.id1()).copied().unwrap_or(DEFAULT_RANK);
            Some(ComparisonVector { pair: pair.clone(), scores, rank })
        })
        .collect()
}

/// Index records by identifier for pair resolution during comparison.
pub fn index_records<'a>(sets: &[&'a [Record]]) -> HashMap<&'a str, &'a Record> {
    let mut index = HashMap::new();
    for set in sets {
        for r in *set {
            index.insert(r.id.as_str(), r);
        }
    }
    index
}
