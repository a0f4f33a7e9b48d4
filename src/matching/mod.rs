pub mod compare;

use crate::models::{LinkMode, Record, RecordPair};
use crate::normalize::normalize_text;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Sorted-neighborhood blocking over a single collection.
///
/// Records are grouped by blocking key; the distinct keys are sorted and two
/// records become a candidate pair when their keys sit within `(window-1)/2`
/// positions of each other. `window = 1` therefore degenerates to exact-key
/// blocking. Records with a null/empty blocking key never pair. Output is
/// canonicalized and has set semantics.
pub fn block_dedupe(records: &[Record], key_field: &str, window: usize) -> Vec<RecordPair> {
    let groups = group_by_key(records, key_field);
    let keys: Vec<&String> = groups.keys().collect();
    let radius = (window.max(1) - 1) / 2;

    let mut out: BTreeSet<RecordPair> = BTreeSet::new();
    for i in 0..keys.len() {
        let left = &groups[keys[i]];
        // same-key pairs
        for a in 0..left.len() {
            for b in (a + 1)..left.len() {
                out.insert(RecordPair::dedupe(left[a].clone(), left[b].clone()));
            }
        }
        // neighboring-key pairs within the window radius
        for j in (i + 1)..keys.len().min(i + radius + 1) {
            let right = &groups[keys[j]];
            for a in left {
                for b in right {
                    out.insert(RecordPair::dedupe(a.clone(), b.clone()));
                }
            }
        }
    }
    out.into_iter().collect()
}

/// Sorted-neighborhood blocking across two collections. Same window rule over
/// the merged distinct-key ordering, but pairs are directed (left, right) and
/// never reordered.
pub fn block_linkage(
    left: &[Record],
    left_key_field: &str,
    right: &[Record],
    right_key_field: &str,
    window: usize,
) -> Vec<RecordPair> {
    let left_groups = group_by_key(left, left_key_field);
    let right_groups = group_by_key(right, right_key_field);

    let mut keys: Vec<&String> = left_groups.keys().chain(right_groups.keys()).collect();
    keys.sort();
    keys.dedup();
    let radius = (window.max(1) - 1) / 2;

    let mut out: BTreeSet<RecordPair> = BTreeSet::new();
    for i in 0..keys.len() {
        let Some(lids) = left_groups.get(keys[i]) else { continue };
        let lo = i.saturating_sub(radius);
        let hi = keys.len().min(i + radius + 1);
        for key in &keys[lo..hi] {
            if let Some(rids) = right_groups.get(*key) {
                for a in lids {
                    for b in rids {
                        out.insert(RecordPair::linkage(a.clone(), b.clone()));
                    }
                }
            }
        }
    }
    out.into_iter().collect()
}

fn group_by_key(records: &[Record], key_field: &str) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for r in records {
        if let Some(raw) = r.field(key_field) {
            let key = normalize_text(raw);
            if !key.is_empty() {
                groups.entry(key).or_default().push(r.id.clone());
            }
        }
    }
    groups
}

/// Candidate filter: `candidates \ history`, keyed by the formatted pair key.
/// Pure set difference; the chunked history retrieval lives in `db::schema`.
pub fn exclude_pairs(candidates: Vec<RecordPair>, history: &HashSet<String>) -> Vec<RecordPair> {
    candidates.into_iter().filter(|p| !history.contains(&p.fmt_key())).collect()
}

/// Split the candidate set into `n` near-equal blocks for bounded-memory
/// comparison. Each block is re-built through the mode's own pair constructor,
/// which is idempotent, so the union over blocks equals the unsplit set.
pub fn split_pairs(pairs: Vec<RecordPair>, n: usize, mode: LinkMode) -> Vec<Vec<RecordPair>> {
    let n = n.max(1);
    let total = pairs.len();
    let base = total / n;
    let extra = total % n;

    let mut blocks = Vec::with_capacity(n);
    let mut it = pairs.into_iter();
    for i in 0..n {
        let take = base + usize::from(i < extra);
        let block: Vec<RecordPair> = it.by_ref().take(take).map(|p| p.rebuild(mode)).collect();
        blocks.push(block);
    }
    blocks
}
