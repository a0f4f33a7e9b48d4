use crate::error::{LinkageError, LinkageResult};
use crate::models::LinkMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite warehouse file, or ":memory:" for tests.
    pub path: String,
}

impl DatabaseConfig {
    pub fn to_url(&self) -> String {
        if self.path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", self.path)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareKind {
    Exact,
    String,
}

/// One field-comparison rule: which field to read on each side, how to score
/// it, and the label the score column carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareRule {
    pub left_field: String,
    pub right_field: String,
    pub kind: CompareKind,
    pub label: String,
}

impl CompareRule {
    pub fn exact(field: &str) -> Self {
        CompareRule { left_field: field.into(), right_field: field.into(), kind: CompareKind::Exact, label: field.into() }
    }
    pub fn string(field: &str) -> Self {
        CompareRule { left_field: field.into(), right_field: field.into(), kind: CompareKind::String, label: field.into() }
    }
}

fn default_one() -> usize { 1 }
fn default_suppression() -> f64 { 0.60 }
fn default_border() -> f64 { 0.75 }
fn default_classify_batch() -> usize { 6000 }
fn default_insert_batch() -> usize { 500 }
fn default_history_chunk() -> usize { 500 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPaths {
    pub gradient_boost: String,
    pub random_forest: String,
    pub logistic_regression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkageConfig {
    pub mode: LinkMode,
    /// Blocking key field for the (left) collection.
    pub blocking_field: String,
    /// Blocking key field for the right collection; linkage mode only.
    pub right_blocking_field: Option<String>,
    /// Sorted-neighborhood window; odd, 1 = exact-key blocking.
    pub window: usize,
    pub comparators: Vec<CompareRule>,
    /// Field whose value frequency drives the auxiliary rank feature.
    pub rank_field: Option<String>,
    #[serde(default = "default_suppression")]
    pub suppression_threshold: f64,
    #[serde(default = "default_border")]
    pub border_threshold: f64,
    #[serde(default = "default_one")]
    pub number_of_blocks: usize,
    #[serde(default = "default_classify_batch")]
    pub classify_batch: usize,
    #[serde(default = "default_insert_batch")]
    pub insert_batch: usize,
    #[serde(default = "default_history_chunk")]
    pub history_chunk: usize,
    pub models: ModelPaths,
}

impl LinkageConfig {
    /// Default dedupe profile used against a single standardized collection:
    /// exact rules on the identity and birth-date fields, edit-distance rules
    /// on the name fields, phonetic blocking with window 3.
    pub fn default_dedupe(models: ModelPaths) -> Self {
        LinkageConfig {
            mode: LinkMode::Dedupe,
            blocking_field: "name_phonetic".into(),
            right_blocking_field: None,
            window: 3,
            comparators: vec![
                CompareRule::exact("national_id"),
                CompareRule::exact("health_card"),
                CompareRule::exact("postal_code"),
                CompareRule::exact("sex"),
                CompareRule::string("neighborhood"),
                CompareRule::exact("birth_day"),
                CompareRule::exact("birth_month"),
                CompareRule::exact("birth_year"),
                CompareRule::string("first_name"),
                CompareRule::string("mother_first_name"),
                CompareRule::string("rest_of_name"),
                CompareRule::string("mother_rest_of_name"),
            ],
            rank_field: Some("first_name".into()),
            suppression_threshold: default_suppression(),
            border_threshold: default_border(),
            number_of_blocks: 1,
            classify_batch: default_classify_batch(),
            insert_batch: default_insert_batch(),
            history_chunk: default_history_chunk(),
            models,
        }
    }

    pub fn from_json_file(path: &Path) -> LinkageResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LinkageError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let cfg: LinkageConfig = serde_json::from_str(&raw)
            .map_err(|e| LinkageError::Config(format!("invalid config {}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fails fast, before any I/O against the history or result stores.
    pub fn validate(&self) -> LinkageResult<()> {
        if self.blocking_field.trim().is_empty() {
            return Err(LinkageError::Config("blocking_field must not be empty".into()));
        }
        if self.mode == LinkMode::Linkage
            && self.right_blocking_field.as_deref().map_or(true, |f| f.trim().is_empty())
        {
            return Err(LinkageError::Config("linkage mode requires right_blocking_field".into()));
        }
        if self.window == 0 || self.window % 2 == 0 {
            return Err(LinkageError::Config(format!("window must be a positive odd integer, got {}", self.window)));
        }
        if self.comparators.is_empty() {
            return Err(LinkageError::Config("comparator list must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.suppression_threshold) {
            return Err(LinkageError::Config(format!("suppression_threshold out of [0,1]: {}", self.suppression_threshold)));
        }
        if !(0.0..=1.0).contains(&self.border_threshold) {
            return Err(LinkageError::Config(format!("border_threshold out of [0,1]: {}", self.border_threshold)));
        }
        if self.number_of_blocks == 0 {
            return Err(LinkageError::Config("number_of_blocks must be >= 1".into()));
        }
        if self.classify_batch == 0 || self.insert_batch == 0 || self.history_chunk == 0 {
            return Err(LinkageError::Config("batch sizes must be >= 1".into()));
        }
        for (label, path) in [
            ("gradient_boost", &self.models.gradient_boost),
            ("random_forest", &self.models.random_forest),
            ("logistic_regression", &self.models.logistic_regression),
        ] {
            if path.trim().is_empty() {
                return Err(LinkageError::Config(format!("model path {label} must not be empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models() -> ModelPaths {
        ModelPaths { gradient_boost: "gbt.json".into(), random_forest: "rnf.json".into(), logistic_regression: "lgt.json".into() }
    }

    #[test]
    fn default_profile_validates() {
        assert!(LinkageConfig::default_dedupe(models()).validate().is_ok());
    }

    #[test]
    fn even_window_rejected() {
        let mut cfg = LinkageConfig::default_dedupe(models());
        cfg.window = 4;
        assert!(matches!(cfg.validate(), Err(LinkageError::Config(_))));
    }

    #[test]
    fn empty_comparators_rejected() {
        let mut cfg = LinkageConfig::default_dedupe(models());
        cfg.comparators.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn linkage_needs_right_blocking_field() {
        let mut cfg = LinkageConfig::default_dedupe(models());
        cfg.mode = LinkMode::Linkage;
        assert!(cfg.validate().is_err());
        cfg.right_blocking_field = Some("name_phonetic".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_model_path_rejected() {
        let mut cfg = LinkageConfig::default_dedupe(models());
        cfg.models.random_forest = String::new();
        assert!(matches!(cfg.validate(), Err(LinkageError::Config(_))));
    }

    #[test]
    fn memory_url() {
        let db = DatabaseConfig { path: ":memory:".into() };
        assert_eq!(db.to_url(), "sqlite::memory:");
    }
}
