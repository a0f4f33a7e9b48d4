use crate::error::LinkageError;
use crate::models::{ClassificationResult, MatchBucket, Record};
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use sqlx::{Column, Row, SqlitePool};
use std::collections::HashSet;

pub const POSITIVE_TABLE: &str = "pairs_positive";
pub const NEGATIVE_TABLE: &str = "pairs_negative";

pub fn validate_ident(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("Invalid identifier: {}", name);
    }
    Ok(())
}

/// Result tables, one per bucket. The formatted pair key is the primary key,
/// which makes re-inserts after an aborted block idempotent.
pub async fn ensure_result_tables(pool: &SqlitePool) -> Result<()> {
    for table in [POSITIVE_TABLE, NEGATIVE_TABLE] {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                fmt_id TEXT PRIMARY KEY,
                id_1 TEXT NOT NULL,
                id_2 TEXT NOT NULL,
                proba_model_1 REAL,
                proba_model_2 REAL,
                proba_model_3 REAL,
                created_at TEXT NOT NULL
            )"
        );
        sqlx::query(&ddl)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create table {table}"))?;
    }
    Ok(())
}

/// Fetch standardized records from a collection table, optionally restricted
/// to a notification-date period. Every column becomes a field; rows without
/// an identifier are skipped. Non-text columns that fail to decode as text
/// are treated as null rather than aborting the fetch.
pub async fn fetch_records(
    pool: &SqlitePool,
    table: &str,
    id_col: &str,
    date_col: &str,
    period: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<Record>> {
    validate_ident(table)?;
    validate_ident(id_col)?;
    validate_ident(date_col)?;

    let rows = if let Some((from, to)) = period {
        let sql = format!("SELECT * FROM {table} WHERE {date_col} BETWEEN ? AND ? ORDER BY {id_col}");
        sqlx::query(&sql)
            .bind(from.to_string())
            .bind(to.to_string())
            .fetch_all(pool)
            .await
            .with_context(|| format!("Failed to fetch rows from {table} for period"))?
    } else {
        let sql = format!("SELECT * FROM {table} ORDER BY {id_col}");
        sqlx::query(&sql)
            .fetch_all(pool)
            .await
            .with_context(|| format!("Failed to fetch rows from {table}"))?
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut rec = Record::new(String::new(), table);
        for (i, col) in row.columns().iter().enumerate() {
            let value: Option<String> = row.try_get::<Option<String>, _>(i).ok().flatten();
            if let Some(v) = value {
                if !v.is_empty() {
                    rec.fields.insert(col.name().to_string(), v);
                }
            }
        }
        match rec.fields.get(id_col) {
            Some(id) => rec.id = id.clone(),
            None => continue,
        }
        records.push(rec);
    }
    Ok(records)
}

/// Chunked existence query against both bucket tables: which of `keys` were
/// already evaluated in a previous run. Any chunk failure is fatal; a partial
/// history would silently re-score or skip pairs.
pub async fn lookup_pair_history(
    pool: &SqlitePool,
    keys: &[String],
    chunk_size: usize,
) -> Result<HashSet<String>, LinkageError> {
    let chunk_size = chunk_size.max(1);
    let mut present = HashSet::new();
    for chunk in keys.chunks(chunk_size) {
        for table in [POSITIVE_TABLE, NEGATIVE_TABLE] {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("SELECT fmt_id FROM {table} WHERE fmt_id IN ({placeholders})");
            let mut query = sqlx::query(&sql);
            for key in chunk {
                query = query.bind(key);
            }
            let rows = query
                .fetch_all(pool)
                .await
                .map_err(|e| LinkageError::History(anyhow::Error::new(e).context(format!("chunk lookup against {table}"))))?;
            for row in rows {
                let key: String = row
                    .try_get("fmt_id")
                    .map_err(|e| LinkageError::History(anyhow::Error::new(e)))?;
                present.insert(key);
            }
        }
    }
    Ok(present)
}

fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

/// Batched insert of one bucket's results. Each batch runs in its own
/// transaction; `INSERT OR REPLACE` keeps reruns idempotent on the key.
pub async fn insert_results(
    pool: &SqlitePool,
    bucket: MatchBucket,
    results: &[ClassificationResult],
    batch_size: usize,
) -> Result<usize> {
    let table = match bucket {
        MatchBucket::LikelyPositive => POSITIVE_TABLE,
        MatchBucket::LikelyNegative => NEGATIVE_TABLE,
    };
    let batch_size = batch_size.max(1);
    let mut written = 0usize;
    for batch in results.chunks(batch_size) {
        let mut tx = pool.begin().await.context("begin insert transaction")?;
        for r in batch {
            let created_at = chrono::Utc::now().to_rfc3339();
            sqlx::query(&format!(
                "INSERT OR REPLACE INTO {table}
                 (fmt_id, id_1, id_2, proba_model_1, proba_model_2, proba_model_3, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(r.pair.fmt_key())
            .bind(r.pair.id1())
            .bind(r.pair.id2())
            .bind(r.probabilities.first().copied().map(round5))
            .bind(r.probabilities.get(1).copied().map(round5))
            .bind(r.probabilities.get(2).copied().map(round5))
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("insert into {table} failed for {}", r.pair.fmt_key()))?;
        }
        tx.commit().await.context("commit insert transaction")?;
        written += batch.len();
    }
    Ok(written)
}
