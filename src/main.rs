use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use env_logger::Env;
use log::{error, info};
use std::env;
use std::path::Path;

use record_linker::classify::Ensemble;
use record_linker::config::{DatabaseConfig, LinkageConfig, ModelPaths};
use record_linker::db::{fetch_records, make_pool};
use record_linker::engine::{run_linkage, ProgressUpdate};
use record_linker::export::csv_export::CsvStreamWriter;
use record_linker::models::LinkMode;
use record_linker::util::{load_dotenv_if_present, parse_env_file};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

async fn run() -> Result<()> {
    load_dotenv_if_present()?;
    let env_map = parse_env_file().unwrap_or_default();
    let args: Vec<String> = env::args().collect();

    let get = |idx: usize, key: &str| -> Option<String> {
        args.get(idx)
            .cloned()
            .or_else(|| env_map.get(key).cloned())
            .or_else(|| std::env::var(key).ok())
    };

    let db_path = get(1, "DB_PATH");
    let table = get(2, "TABLE");
    let id_col = get(3, "ID_COLUMN").unwrap_or_else(|| "rec_id".into());
    let date_col = get(4, "DATE_COLUMN").unwrap_or_else(|| "notified_at".into());
    let gbt = get(5, "MODEL_GBT");
    let rnf = get(6, "MODEL_RNF");
    let lgt = get(7, "MODEL_LGT");
    let config_path = get(8, "LINKAGE_CONFIG");

    let (Some(db_path), Some(table), Some(gbt), Some(rnf), Some(lgt)) = (db_path, table, gbt, rnf, lgt) else {
        eprintln!(
            "Usage: {} <db_path> <table> <id_column> <date_column> <gbt.json> <rnf.json> <lgt.json> [config.json]",
            args.first().map(String::as_str).unwrap_or("record_linker")
        );
        eprintln!("Environment (or .env): DB_PATH, TABLE, ID_COLUMN, DATE_COLUMN, MODEL_GBT, MODEL_RNF, MODEL_LGT, LINKAGE_CONFIG");
        eprintln!("  RECORD_LINKER_BLOCKS=<N>        partition the candidate set into N blocks");
        eprintln!("  RECORD_LINKER_FROM/TO=YYYY-MM-DD restrict the notification-date period");
        eprintln!("  RECORD_LINKER_EXPORT_CSV=<path>  also dump bucketed pairs to CSV");
        std::process::exit(2);
    };

    // Configuration is validated before any I/O against the store.
    let models = ModelPaths { gradient_boost: gbt, random_forest: rnf, logistic_regression: lgt };
    let mut cfg = match &config_path {
        Some(p) => LinkageConfig::from_json_file(Path::new(p))?,
        None => LinkageConfig::default_dedupe(models),
    };
    if let Some(n) = std::env::var("RECORD_LINKER_BLOCKS").ok().and_then(|s| s.parse().ok()) {
        cfg.number_of_blocks = n;
    }
    cfg.validate()?;

    // Models load before touching the warehouse; unreadable artifacts abort.
    let ensemble = Ensemble::load(&cfg.models, cfg.classify_batch)?;
    info!("Loaded ensemble members: {:?}", ensemble.member_labels());

    let from = std::env::var("RECORD_LINKER_FROM")
        .ok()
        .and_then(|s| parse_date(&s))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid date"));
    let to = std::env::var("RECORD_LINKER_TO")
        .ok()
        .and_then(|s| parse_date(&s))
        .unwrap_or_else(|| Utc::now().date_naive());

    info!("Opening warehouse at {}", db_path);
    let pool = make_pool(&DatabaseConfig { path: db_path }).await?;

    info!("Fetching records from {} for {}..{}", table, from, to);
    let left = fetch_records(&pool, &table, &id_col, &date_col, Some((from, to))).await?;
    let right = match (cfg.mode, std::env::var("RIGHT_TABLE").ok().or_else(|| env_map.get("RIGHT_TABLE").cloned())) {
        (LinkMode::Linkage, Some(rt)) => {
            Some(fetch_records(&pool, &rt, &id_col, &date_col, Some((from, to))).await?)
        }
        (LinkMode::Linkage, None) => {
            anyhow::bail!("linkage mode requires RIGHT_TABLE");
        }
        _ => None,
    };
    info!("Loaded {} records", left.len() + right.as_ref().map_or(0, Vec::len));

    let mut csv_writer = match std::env::var("RECORD_LINKER_EXPORT_CSV") {
        Ok(path) => Some(CsvStreamWriter::create(&path).context("create CSV export")?),
        Err(_) => None,
    };

    let t = std::time::Instant::now();
    let summary = run_linkage(
        &pool,
        &cfg,
        &ensemble,
        &left,
        right.as_deref(),
        |u: ProgressUpdate| {
            info!(
                "[{}] {:.1}% ({}/{}) | Mem used: {} MB | Avail: {} MB",
                u.stage, u.percent, u.processed, u.total, u.mem_used_mb, u.mem_avail_mb
            );
        },
        |r| {
            if let Some(w) = csv_writer.as_mut() {
                w.write(r)?;
            }
            Ok(())
        },
    )
    .await?;

    if let Some(w) = csv_writer {
        w.flush()?;
    }
    info!(
        "Done in {:?}: {} candidate pairs, {} compared in {} block(s), {} likely positive, {} likely negative",
        t.elapsed(), summary.candidates, summary.filtered, summary.blocks, summary.positives, summary.negatives
    );
    Ok(())
}
