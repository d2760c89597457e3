//! Shared authentication for all virtual users.
//!
//! A single [`SharedTokenCache`] per process performs the OAuth2
//! client-credentials exchange and hands the resulting bearer token to every
//! caller until it nears expiry or the configured identity changes.

mod token_cache;

pub use token_cache::{CacheStatus, SharedTokenCache, TokenError};
