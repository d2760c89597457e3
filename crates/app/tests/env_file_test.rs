//! `.env` loading feeds the settings used by the commands.
//!
//! Kept in its own test binary because it mutates the process environment.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;

use scoreload::commands::{CommandError, load_settings};
use scoreload_infrastructure::{SettingsError, load_dotenv};
use tempfile::tempdir;

#[test]
fn test_env_file_provides_credentials() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("scoreload.env");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "# credentials for the staging tenant").unwrap();
    writeln!(file, "CLIENT_ID=from-env-file").unwrap();
    writeln!(file, "CLIENT_SECRET=also-from-env-file").unwrap();
    writeln!(file, "SCORELOAD_ENV_FILE_MARKER=present").unwrap();
    drop(file);

    assert_eq!(load_dotenv(Some(&path)).unwrap(), Some(path.clone()));
    assert_eq!(std::env::var("SCORELOAD_ENV_FILE_MARKER").unwrap(), "present");

    let settings = load_settings(Some("http://localhost:8080/api/v1")).unwrap();
    assert_eq!(settings.auth.api_host, "http://localhost:8080/api/v1");
    assert!(!settings.auth.client_id.is_empty());
    assert!(!settings.auth.client_secret.is_empty());

    let err = load_settings(Some("localhost:8080")).unwrap_err();
    assert!(matches!(err, CommandError::Settings(SettingsError::InvalidHost { .. })));
}

#[test]
fn test_missing_explicit_env_file_is_an_error() {
    let dir = tempdir().expect("temp dir");
    let err = load_dotenv(Some(&dir.path().join("nope.env"))).unwrap_err();
    assert!(err.to_string().contains("nope.env"));
}
