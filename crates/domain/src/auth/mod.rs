//! Authentication domain types

mod types;

pub use types::{
    AccessToken, AuthSettings, CLIENT_CREDENTIALS_GRANT, CachedToken, ClientIdentity,
    TokenGrantRequest, TokenResponse,
};
