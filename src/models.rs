use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A standardized record from one source collection. Fields are stored as a
/// name -> value map; a missing key means the field is null for this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub source: String,
    pub fields: HashMap<String, String>,
}

impl Record {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Record { id: id.into(), source: source.into(), fields: HashMap::new() }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str()).filter(|s| !s.is_empty())
    }
}

/// Whether two record sets are the same collection (unordered pairs) or two
/// distinct collections (directed pairs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkMode {
    Dedupe,
    Linkage,
}

/// An ordered pair of record identifiers.
///
/// `dedupe` canonicalizes (smaller id first) so `(A,B)` and `(B,A)` collapse
/// to one key; `linkage` keeps left/right as given since the namespaces are
/// disjoint. Construction is the only place ordering is decided.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordPair {
    id1: String,
    id2: String,
}

impl RecordPair {
    pub fn dedupe(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b { RecordPair { id1: a, id2: b } } else { RecordPair { id1: b, id2: a } }
    }

    pub fn linkage(left: impl Into<String>, right: impl Into<String>) -> Self {
        RecordPair { id1: left.into(), id2: right.into() }
    }

    pub fn rebuild(self, mode: LinkMode) -> Self {
        match mode {
            LinkMode::Dedupe => RecordPair::dedupe(self.id1, self.id2),
            LinkMode::Linkage => self,
        }
    }

    pub fn id1(&self) -> &str { &self.id1 }
    pub fn id2(&self) -> &str { &self.id2 }

    /// Formatted key used by the pair-history store and the result tables.
    pub fn fmt_key(&self) -> String { format!("{}-{}", self.id1, self.id2) }
}

/// Per-field similarity scores for one candidate pair, in comparator rule
/// order, plus the auxiliary name-frequency rank feature.
#[derive(Debug, Clone)]
pub struct ComparisonVector {
    pub pair: RecordPair,
    pub scores: Vec<f64>,
    pub rank: f64,
}

impl ComparisonVector {
    /// Numeric feature row in the fixed column order fed to the ensemble:
    /// rule scores first, rank feature last.
    pub fn features(&self) -> Vec<f64> {
        let mut row = self.scores.clone();
        row.push(self.rank);
        row
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchBucket {
    LikelyPositive,
    LikelyNegative,
}

/// One classified pair: the non-match probability from each ensemble member
/// and the resulting bucket. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub pair: RecordPair,
    pub probabilities: Vec<f64>,
    pub bucket: MatchBucket,
}
