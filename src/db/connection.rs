use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::time::Duration;

pub async fn make_pool(cfg: &DatabaseConfig) -> Result<SqlitePool> {
    make_pool_with_size(cfg, None).await
}

pub async fn make_pool_with_size(cfg: &DatabaseConfig, max: Option<u32>) -> Result<SqlitePool> {
    let url = cfg.to_url();
    let max_conn: u32 = max
        .or_else(|| std::env::var("RECORD_LINKER_POOL_SIZE").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(8);
    let max_conn = if max_conn == 0 { 8 } else { max_conn };
    let acquire_ms: u64 = std::env::var("RECORD_LINKER_ACQUIRE_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5_000);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_conn)
        .acquire_timeout(Duration::from_millis(acquire_ms))
        .connect(&url)
        .await?;
    Ok(pool)
}
