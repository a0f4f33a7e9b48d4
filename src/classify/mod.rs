use crate::config::ModelPaths;
use crate::error::{LinkageError, LinkageResult};
use crate::models::{ClassificationResult, ComparisonVector, MatchBucket};
use serde::Deserialize;
use std::path::Path;

/// A pre-trained scoring model. `score` returns, per input row, the
/// probability the model assigns to the non-match class, row-aligned with the
/// batch. Training and serialization are out of scope; artifacts are opaque
/// weights loaded at construction.
pub trait ScoringModel: Send + Sync {
    fn score(&self, batch: &[Vec<f64>]) -> LinkageResult<Vec<f64>>;
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// One node of a serialized decision tree. Internal nodes carry a split
/// (feature index, threshold, child indices); leaves carry a value.
#[derive(Debug, Clone, Deserialize)]
struct TreeNode {
    #[serde(default)]
    feature: Option<usize>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    left: Option<usize>,
    #[serde(default)]
    right: Option<usize>,
    #[serde(default)]
    value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walk from the root to a leaf; `x[feature] <= threshold` goes left.
    fn evaluate(&self, x: &[f64]) -> LinkageResult<f64> {
        let mut idx = 0usize;
        loop {
            let node = self.nodes.get(idx).ok_or_else(|| {
                LinkageError::Inference(format!("tree node index {idx} out of bounds"))
            })?;
            match (node.feature, node.threshold, node.left, node.right) {
                (Some(f), Some(t), Some(l), Some(r)) => {
                    let xi = *x.get(f).ok_or_else(|| {
                        LinkageError::Inference(format!("feature index {f} out of bounds"))
                    })?;
                    idx = if xi <= t { l } else { r };
                }
                _ => {
                    return node.value.ok_or_else(|| {
                        LinkageError::Inference(format!("node {idx} has neither split nor value"))
                    });
                }
            }
        }
    }
}

/// Serialized model artifact. Leaf values mean:
/// - logistic regression: n/a (coefficients + intercept);
/// - random forest: per-tree probability of the match class, averaged;
/// - gradient boosted trees: additive raw scores, squashed by a sigmoid.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelArtifact {
    LogisticRegression {
        n_features: usize,
        coefficients: Vec<f64>,
        intercept: f64,
    },
    RandomForest {
        n_features: usize,
        trees: Vec<Tree>,
    },
    GradientBoostedTrees {
        n_features: usize,
        base_score: f64,
        learning_rate: f64,
        trees: Vec<Tree>,
    },
}

impl ModelArtifact {
    fn n_features(&self) -> usize {
        match self {
            ModelArtifact::LogisticRegression { n_features, .. } => *n_features,
            ModelArtifact::RandomForest { n_features, .. } => *n_features,
            ModelArtifact::GradientBoostedTrees { n_features, .. } => *n_features,
        }
    }

    /// Probability of the match class for one row.
    fn match_probability(&self, x: &[f64]) -> LinkageResult<f64> {
        match self {
            ModelArtifact::LogisticRegression { coefficients, intercept, .. } => {
                let z: f64 = coefficients.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + intercept;
                Ok(sigmoid(z))
            }
            ModelArtifact::RandomForest { trees, .. } => {
                if trees.is_empty() {
                    return Err(LinkageError::Inference("random forest has no trees".into()));
                }
                let mut total = 0.0;
                for t in trees {
                    total += t.evaluate(x)?;
                }
                Ok(total / trees.len() as f64)
            }
            ModelArtifact::GradientBoostedTrees { base_score, learning_rate, trees, .. } => {
                let mut raw = *base_score;
                for t in trees {
                    raw += learning_rate * t.evaluate(x)?;
                }
                Ok(sigmoid(raw))
            }
        }
    }
}

#[derive(Debug)]
pub struct LoadedModel {
    artifact: ModelArtifact,
}

impl LoadedModel {
    pub fn from_file(path: &Path) -> LinkageResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| LinkageError::Model {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let artifact: ModelArtifact = serde_json::from_str(&raw).map_err(|e| LinkageError::Model {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        match &artifact {
            ModelArtifact::LogisticRegression { n_features, coefficients, .. }
                if coefficients.len() != *n_features =>
            {
                return Err(LinkageError::Model {
                    path: path.display().to_string(),
                    reason: format!(
                        "coefficient count {} does not match n_features {}",
                        coefficients.len(),
                        n_features
                    ),
                });
            }
            _ => {}
        }
        Ok(LoadedModel { artifact })
    }
}

impl ScoringModel for LoadedModel {
    fn score(&self, batch: &[Vec<f64>]) -> LinkageResult<Vec<f64>> {
        let width = self.artifact.n_features();
        let mut out = Vec::with_capacity(batch.len());
        for row in batch {
            if row.len() != width {
                return Err(LinkageError::Inference(format!(
                    "feature row has {} columns, model expects {}",
                    row.len(),
                    width
                )));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(LinkageError::Inference("non-finite feature value".into()));
            }
            out.push(1.0 - self.artifact.match_probability(row)?);
        }
        Ok(out)
    }
}

/// The three-member classifier ensemble. Scoring is batched so large pair
/// sets never materialize one giant probability call per model.
pub struct Ensemble {
    members: Vec<(String, Box<dyn ScoringModel>)>,
    batch_size: usize,
}

impl Ensemble {
    /// Load the configured artifacts; any unreadable artifact is fatal.
    pub fn load(paths: &ModelPaths, batch_size: usize) -> LinkageResult<Self> {
        let members: Vec<(String, Box<dyn ScoringModel>)> = vec![
            ("GBT".into(), Box::new(LoadedModel::from_file(Path::new(&paths.gradient_boost))?) as Box<dyn ScoringModel>),
            ("RNF".into(), Box::new(LoadedModel::from_file(Path::new(&paths.random_forest))?)),
            ("LGT".into(), Box::new(LoadedModel::from_file(Path::new(&paths.logistic_regression))?)),
        ];
        Ok(Ensemble { members, batch_size: batch_size.max(1) })
    }

    /// Build an ensemble from arbitrary members (tests inject mocks here).
    pub fn from_members(members: Vec<(String, Box<dyn ScoringModel>)>, batch_size: usize) -> Self {
        Ensemble { members, batch_size: batch_size.max(1) }
    }

    pub fn member_labels(&self) -> Vec<&str> {
        self.members.iter().map(|(l, _)| l.as_str()).collect()
    }

    /// Score every vector with every member and bucket against `border`.
    pub fn classify(
        &self,
        vectors: &[ComparisonVector],
        border: f64,
    ) -> LinkageResult<Vec<ClassificationResult>> {
        let features: Vec<Vec<f64>> = vectors.iter().map(|v| v.features()).collect();

        // per-member probability columns, filled batch by batch
        let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(vectors.len()); self.members.len()];
        for chunk in features.chunks(self.batch_size) {
            for (col, (_, model)) in columns.iter_mut().zip(&self.members) {
                let probs = model.score(chunk)?;
                if probs.len() != chunk.len() {
                    return Err(LinkageError::Inference(format!(
                        "model returned {} probabilities for a batch of {}",
                        probs.len(),
                        chunk.len()
                    )));
                }
                col.extend(probs);
            }
        }

        let results = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let probabilities: Vec<f64> = columns.iter().map(|c| c[i]).collect();
                let bucket = bucket(&probabilities, border);
                ClassificationResult { pair: v.pair.clone(), probabilities, bucket }
            })
            .collect();
        Ok(results)
    }
}

/// Conjunctive any-model-veto rule: likely positive iff every member's
/// non-match probability is at or below the border (inclusive).
pub fn bucket(non_match_probs: &[f64], border: f64) -> MatchBucket {
    if non_match_probs.iter().all(|&p| p <= border) {
        MatchBucket::LikelyPositive
    } else {
        MatchBucket::LikelyNegative
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordPair;
    use std::io::Write;

    struct ConstModel(f64);
    impl ScoringModel for ConstModel {
        fn score(&self, batch: &[Vec<f64>]) -> LinkageResult<Vec<f64>> {
            Ok(vec![self.0; batch.len()])
        }
    }

    fn vector(id: usize) -> ComparisonVector {
        ComparisonVector {
            pair: RecordPair::dedupe(format!("a{id}"), format!("b{id}")),
            scores: vec![1.0, 0.5],
            rank: 7.0,
        }
    }

    #[test]
    fn bucket_rule_is_inclusive_at_border() {
        assert_eq!(bucket(&[0.2, 0.3, 0.1], 0.75), MatchBucket::LikelyPositive);
        assert_eq!(bucket(&[0.75, 0.75, 0.75], 0.75), MatchBucket::LikelyPositive);
        assert_eq!(bucket(&[0.2, 0.76, 0.1], 0.75), MatchBucket::LikelyNegative);
        assert_eq!(bucket(&[0.9, 0.9, 0.9], 0.75), MatchBucket::LikelyNegative);
    }

    #[test]
    fn ensemble_batches_and_aligns_probabilities() {
        let ensemble = Ensemble::from_members(
            vec![
                ("m1".into(), Box::new(ConstModel(0.2)) as Box<dyn ScoringModel>),
                ("m2".into(), Box::new(ConstModel(0.8))),
            ],
            2, // force several batches
        );
        let vectors: Vec<ComparisonVector> = (0..5).map(vector).collect();
        let results = ensemble.classify(&vectors, 0.75).unwrap();
        assert_eq!(results.len(), 5);
        for (r, v) in results.iter().zip(&vectors) {
            assert_eq!(r.pair, v.pair);
            assert_eq!(r.probabilities, vec![0.2, 0.8]);
            assert_eq!(r.bucket, MatchBucket::LikelyNegative);
        }
    }

    #[test]
    fn nan_feature_is_fatal() {
        let model = LoadedModel {
            artifact: ModelArtifact::LogisticRegression {
                n_features: 2,
                coefficients: vec![1.0, -1.0],
                intercept: 0.0,
            },
        };
        let err = model.score(&[vec![f64::NAN, 0.0]]).unwrap_err();
        assert!(matches!(err, LinkageError::Inference(_)));
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let model = LoadedModel {
            artifact: ModelArtifact::LogisticRegression {
                n_features: 3,
                coefficients: vec![0.0, 0.0, 0.0],
                intercept: 0.0,
            },
        };
        assert!(model.score(&[vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn logistic_regression_scores_non_match_class() {
        let model = LoadedModel {
            artifact: ModelArtifact::LogisticRegression {
                n_features: 1,
                coefficients: vec![0.0],
                intercept: 0.0,
            },
        };
        // sigmoid(0) = 0.5 match probability, so non-match is 0.5
        let probs = model.score(&[vec![3.0]]).unwrap();
        assert!((probs[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn tree_walk_reaches_expected_leaf() {
        let tree = Tree {
            nodes: vec![
                TreeNode { feature: Some(0), threshold: Some(0.5), left: Some(1), right: Some(2), value: None },
                TreeNode { feature: None, threshold: None, left: None, right: None, value: Some(0.1) },
                TreeNode { feature: None, threshold: None, left: None, right: None, value: Some(0.9) },
            ],
        };
        assert_eq!(tree.evaluate(&[0.2]).unwrap(), 0.1);
        assert_eq!(tree.evaluate(&[0.8]).unwrap(), 0.9);
    }

    #[test]
    fn missing_artifact_fails_load() {
        let err = LoadedModel::from_file(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, LinkageError::Model { .. }));
    }

    #[test]
    fn artifact_roundtrip_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"kind":"random_forest","n_features":1,"trees":[{{"nodes":[{{"value":0.25}}]}}]}}"#
        )
        .unwrap();
        let model = LoadedModel::from_file(f.path()).unwrap();
        let probs = model.score(&[vec![0.0]]).unwrap();
        assert!((probs[0] - 0.75).abs() < 1e-12);
    }
}
