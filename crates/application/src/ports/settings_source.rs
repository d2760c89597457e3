//! Settings port

use scoreload_domain::AuthSettings;

/// Source of the authentication settings currently in effect.
///
/// The token cache asks for a fresh snapshot on every call, which is how it
/// notices a changed client id, secret or host.
pub trait SettingsSource: Send + Sync {
    /// Returns a snapshot of the current settings.
    fn auth_settings(&self) -> AuthSettings;
}

impl SettingsSource for AuthSettings {
    fn auth_settings(&self) -> AuthSettings {
        self.clone()
    }
}
