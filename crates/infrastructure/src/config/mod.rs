//! Configuration loading.

mod settings;

pub use settings::{
    DEFAULT_API_HOST, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SCOPE, Settings, SettingsError,
    SharedSettings, keys, load_dotenv,
};
