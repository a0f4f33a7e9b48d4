pub mod connection;
pub mod schema;

pub use connection::make_pool;
pub use schema::{ensure_result_tables, fetch_records, insert_results, lookup_pair_history};
