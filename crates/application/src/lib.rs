//! Scoreload Application - Token cache, ports and load harness
//!
//! This crate contains the application logic:
//! - `SharedTokenCache`, the process-wide client-credentials token
//! - Port traits implemented by the infrastructure layer
//! - Virtual users, statistics and the load runner

pub mod auth;
pub mod error;
pub mod load;
pub mod ports;

#[cfg(test)]
mod testing;

pub use auth::{CacheStatus, SharedTokenCache, TokenError};
pub use error::{ApplicationError, ApplicationResult};
pub use load::{LoadRunner, LoadSummary, RunOptions, TaskSummary};
pub use ports::{Clock, HttpClient, HttpClientError, HttpFuture, SettingsSource};
