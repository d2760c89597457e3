//! Scoreload Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer, plus configuration and logging setup.

pub mod adapters;
pub mod config;
pub mod telemetry;

pub use adapters::{ReqwestHttpClient, SystemClock};
pub use config::{Settings, SettingsError, SharedSettings, load_dotenv};
pub use telemetry::init_tracing;
