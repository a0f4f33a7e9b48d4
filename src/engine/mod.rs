pub mod pipeline;

pub use pipeline::{run_linkage, ProgressUpdate, RunSummary};
