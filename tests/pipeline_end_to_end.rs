use record_linker::classify::{Ensemble, ScoringModel};
use record_linker::config::{CompareRule, LinkageConfig, ModelPaths};
use record_linker::engine::run_linkage;
use record_linker::error::LinkageResult;
use record_linker::matching::compare::{compare_block, index_records};
use record_linker::matching::block_dedupe;
use record_linker::models::{LinkMode, Record, RecordPair};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

// One connection: pooled in-memory SQLite databases are per-connection.
async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

/// Mock member: one probability for rows whose first feature (birth-year
/// score) is 1.0, another for everything else.
struct BirthYearGate {
    on_match: f64,
    on_mismatch: f64,
}

impl ScoringModel for BirthYearGate {
    fn score(&self, batch: &[Vec<f64>]) -> LinkageResult<Vec<f64>> {
        Ok(batch
            .iter()
            .map(|row| if row[0] == 1.0 { self.on_match } else { self.on_mismatch })
            .collect())
    }
}

fn mock_ensemble(probs: [f64; 3], mismatch: f64) -> Ensemble {
    let members: Vec<(String, Box<dyn ScoringModel>)> = probs
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            (
                format!("m{}", i + 1),
                Box::new(BirthYearGate { on_match: p, on_mismatch: mismatch }) as Box<dyn ScoringModel>,
            )
        })
        .collect();
    Ensemble::from_members(members, 6000)
}

fn scenario_records() -> Vec<Record> {
    vec![
        Record::new("r1", "notif")
            .with_field("name_phonetic", "SM0")
            .with_field("birth_year", "1990")
            .with_field("full_name", "JOHN SMITH"),
        Record::new("r2", "notif")
            .with_field("name_phonetic", "SM0")
            .with_field("birth_year", "1990")
            .with_field("full_name", "JON SMITH"),
        Record::new("r3", "notif")
            .with_field("name_phonetic", "KW4")
            .with_field("birth_year", "1985")
            .with_field("full_name", "ANA KOWALSKI"),
        Record::new("r4", "notif")
            .with_field("name_phonetic", "ZZ9")
            .with_field("birth_year", "1972")
            .with_field("full_name", "PEDRO ZUZARTE"),
    ]
}

fn scenario_config(blocks: usize) -> LinkageConfig {
    LinkageConfig {
        mode: LinkMode::Dedupe,
        blocking_field: "name_phonetic".into(),
        right_blocking_field: None,
        window: 3,
        comparators: vec![CompareRule::exact("birth_year"), CompareRule::string("full_name")],
        rank_field: None,
        suppression_threshold: 0.60,
        border_threshold: 0.75,
        number_of_blocks: blocks,
        classify_batch: 6000,
        insert_batch: 500,
        history_chunk: 500,
        models: ModelPaths {
            gradient_boost: "unused".into(),
            random_forest: "unused".into(),
            logistic_regression: "unused".into(),
        },
    }
}

#[test]
fn matching_pair_vector_reflects_field_scores() {
    let records = scenario_records();
    let pairs = block_dedupe(&records, "name_phonetic", 3);
    assert!(pairs.contains(&RecordPair::dedupe("r1", "r2")));

    let index = index_records(&[&records]);
    let cfg = scenario_config(1);
    let vectors = compare_block(&index, &pairs, &cfg.comparators, cfg.suppression_threshold, &HashMap::new());
    let v = vectors.iter().find(|v| v.pair == RecordPair::dedupe("r1", "r2")).unwrap();
    assert_eq!(v.scores[0], 1.0);
    // JOHN SMITH vs JON SMITH: one deletion over ten characters
    assert!((v.scores[1] - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn agreeing_ensemble_buckets_likely_positive() {
    let pool = memory_pool().await;
    let records = scenario_records();
    let cfg = scenario_config(1);
    let ensemble = mock_ensemble([0.2, 0.3, 0.1], 0.9);

    let summary = run_linkage(&pool, &cfg, &ensemble, &records, None, |_| {}, |_| Ok(()))
        .await
        .unwrap();
    assert!(summary.filtered >= 1);
    assert_eq!(summary.positives, 1);

    let rows = sqlx::query("SELECT fmt_id, proba_model_1, proba_model_2, proba_model_3 FROM pairs_positive")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let key: String = rows[0].try_get("fmt_id").unwrap();
    assert_eq!(key, "r1-r2");
    let p1: f64 = rows[0].try_get("proba_model_1").unwrap();
    let p2: f64 = rows[0].try_get("proba_model_2").unwrap();
    let p3: f64 = rows[0].try_get("proba_model_3").unwrap();
    assert_eq!((p1, p2, p3), (0.2, 0.3, 0.1));
}

#[tokio::test]
async fn vetoing_ensemble_buckets_likely_negative() {
    let pool = memory_pool().await;
    let records = scenario_records();
    let cfg = scenario_config(1);
    let ensemble = mock_ensemble([0.9, 0.9, 0.9], 0.9);

    let summary = run_linkage(&pool, &cfg, &ensemble, &records, None, |_| {}, |_| Ok(()))
        .await
        .unwrap();
    assert_eq!(summary.positives, 0);
    assert_eq!(summary.negatives, summary.filtered);

    let rows = sqlx::query("SELECT fmt_id FROM pairs_negative").fetch_all(&pool).await.unwrap();
    assert!(rows.iter().any(|r| r.try_get::<String, _>("fmt_id").unwrap() == "r1-r2"));
}

#[tokio::test]
async fn second_run_excludes_already_compared_pairs() {
    let pool = memory_pool().await;
    let records = scenario_records();
    let cfg = scenario_config(1);
    let ensemble = mock_ensemble([0.2, 0.3, 0.1], 0.9);

    let first = run_linkage(&pool, &cfg, &ensemble, &records, None, |_| {}, |_| Ok(()))
        .await
        .unwrap();
    assert!(first.filtered > 0);

    let second = run_linkage(&pool, &cfg, &ensemble, &records, None, |_| {}, |_| Ok(()))
        .await
        .unwrap();
    assert_eq!(second.candidates, first.candidates);
    assert_eq!(second.filtered, 0);
    assert_eq!(second.positives + second.negatives, 0);
}

#[tokio::test]
async fn result_hook_sees_every_persisted_pair() {
    let pool = memory_pool().await;
    let records = scenario_records();
    let cfg = scenario_config(1);
    let ensemble = mock_ensemble([0.2, 0.3, 0.1], 0.9);

    let mut seen = Vec::new();
    let summary = run_linkage(&pool, &cfg, &ensemble, &records, None, |_| {}, |r| {
        seen.push(r.pair.fmt_key());
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(seen.len(), summary.positives + summary.negatives);
    assert!(seen.contains(&"r1-r2".to_string()));
}
