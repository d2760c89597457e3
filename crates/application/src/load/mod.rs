//! Load generation: virtual users, shared ids, statistics and the runner.

mod id_cache;
mod runner;
mod session;
mod stats;

pub use id_cache::{IdCache, created_id, extract_ids};
pub use runner::{LoadRunner, RunOptions};
pub use session::{SessionContext, TaskOutcome, VirtualUser};
pub use stats::{AGGREGATED, LoadSummary, RequestRecord, StatsRecorder, TaskSummary};
