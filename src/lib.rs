pub mod classify;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod matching;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod util;
