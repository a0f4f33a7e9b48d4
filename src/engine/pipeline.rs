use crate::classify::Ensemble;
use crate::config::LinkageConfig;
use crate::db::{ensure_result_tables, insert_results, lookup_pair_history};
use crate::error::LinkageError;
use crate::matching::compare::{compare_block, index_records, rank_by_frequency};
use crate::matching::{block_dedupe, block_linkage, exclude_pairs, split_pairs};
use crate::metrics::memory_stats_mb;
use crate::models::{ClassificationResult, LinkMode, MatchBucket, Record};
use anyhow::{bail, Result};
use log::info;
use sqlx::SqlitePool;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub stage: &'static str,
    pub processed: usize,
    pub total: usize,
    pub percent: f32,
    pub mem_used_mb: u64,
    pub mem_avail_mb: u64,
}

fn update(stage: &'static str, processed: usize, total: usize) -> ProgressUpdate {
    let mem = memory_stats_mb();
    let percent = if total == 0 { 100.0 } else { (processed as f32 / total as f32) * 100.0 };
    ProgressUpdate { stage, processed, total, percent, mem_used_mb: mem.used_mb, mem_avail_mb: mem.avail_mb }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub candidates: usize,
    pub filtered: usize,
    pub blocks: usize,
    pub positives: usize,
    pub negatives: usize,
}

/// One full linkage run: block, subtract history, partition, then per block
/// compare, classify, bucket and persist. Stages are strictly sequential and
/// the first error aborts the run; a block is persisted only after its
/// bucketing completed, so there is no partial-stage output in the store.
///
/// `right` must be `Some` in linkage mode and is ignored in dedupe mode.
/// `on_result` is invoked for every classified pair after its block has been
/// persisted (export hooks go here).
pub async fn run_linkage<P, S>(
    pool: &SqlitePool,
    cfg: &LinkageConfig,
    ensemble: &Ensemble,
    left: &[Record],
    right: Option<&[Record]>,
    on_progress: P,
    mut on_result: S,
) -> Result<RunSummary>
where
    P: Fn(ProgressUpdate),
    S: FnMut(&ClassificationResult) -> Result<()>,
{
    cfg.validate()?;
    on_progress(update("loaded", 0, left.len()));

    // -- blocking
    let candidates = match cfg.mode {
        LinkMode::Dedupe => block_dedupe(left, &cfg.blocking_field, cfg.window),
        LinkMode::Linkage => {
            let Some(right) = right else { bail!("linkage mode requires a right record set") };
            let right_field = cfg
                .right_blocking_field
                .as_deref()
                .ok_or_else(|| LinkageError::Config("linkage mode requires right_blocking_field".into()))?;
            block_linkage(left, &cfg.blocking_field, right, right_field, cfg.window)
        }
    };
    info!("Number of pairs: {}", candidates.len());
    on_progress(update("blocked", candidates.len(), candidates.len()));

    // -- history exclusion
    ensure_result_tables(pool).await?;
    let keys: Vec<String> = candidates.iter().map(|p| p.fmt_key()).collect();
    let history = lookup_pair_history(pool, &keys, cfg.history_chunk).await?;
    let filtered = exclude_pairs(candidates, &history);
    info!("Pairs to be effectively compared: {}", filtered.len());
    on_progress(update("filtered", filtered.len(), keys.len()));

    let mut summary = RunSummary {
        candidates: keys.len(),
        filtered: filtered.len(),
        ..RunSummary::default()
    };

    // -- partitioning
    let blocks = split_pairs(filtered, cfg.number_of_blocks, cfg.mode);
    summary.blocks = blocks.len();

    // -- per-block comparison, classification, persistence
    let index = match right {
        Some(right) => index_records(&[left, right]),
        None => index_records(&[left]),
    };
    let ranks: HashMap<String, f64> = match &cfg.rank_field {
        Some(field) => rank_by_frequency(left, field),
        None => HashMap::new(),
    };

    let total_blocks = blocks.len();
    for (bi, block) in blocks.into_iter().enumerate() {
        if block.is_empty() {
            continue;
        }
        info!("Matching subset batch {}/{} of size {} ...", bi + 1, total_blocks, block.len());

        let vectors = compare_block(&index, &block, &cfg.comparators, cfg.suppression_threshold, &ranks);
        on_progress(update("compared", bi + 1, total_blocks));

        let results = ensemble.classify(&vectors, cfg.border_threshold)?;
        on_progress(update("classified", bi + 1, total_blocks));

        let (positives, negatives): (Vec<ClassificationResult>, Vec<ClassificationResult>) =
            results.into_iter().partition(|r| r.bucket == MatchBucket::LikelyPositive);

        insert_results(pool, MatchBucket::LikelyPositive, &positives, cfg.insert_batch)
            .await
            .map_err(|e| LinkageError::Persist { block: bi, cause: e })?;
        insert_results(pool, MatchBucket::LikelyNegative, &negatives, cfg.insert_batch)
            .await
            .map_err(|e| LinkageError::Persist { block: bi, cause: e })?;

        summary.positives += positives.len();
        summary.negatives += negatives.len();
        for r in positives.iter().chain(negatives.iter()) {
            on_result(r)?;
        }
        on_progress(update("persisted", bi + 1, total_blocks));
    }

    info!(
        "Run complete: {} candidates, {} compared, {} likely positive, {} likely negative",
        summary.candidates, summary.filtered, summary.positives, summary.negatives
    );
    Ok(summary)
}
