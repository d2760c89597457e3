//! Scoreload Domain - Core types
//!
//! This crate defines the domain model for the Scoreload API load tester.
//! All types here are pure Rust with no I/O dependencies.

pub mod auth;
pub mod error;
pub mod payload;
pub mod request;
pub mod resource;
pub mod response;
pub mod scenario;

pub use auth::{AccessToken, AuthSettings, CachedToken, ClientIdentity, TokenResponse};
pub use error::{DomainError, DomainResult};
pub use payload::{PayloadContext, PayloadKind};
pub use request::{HttpMethod, RequestSpec};
pub use resource::{Resource, TaskTag};
pub use response::{ResponseSpec, StatusCode};
pub use scenario::{IdSource, Scenario, TaskDefinition, TaskFilter, catalogue, find_scenario};
