//! Command implementations behind the CLI.

use std::sync::Arc;

use scoreload_application::ports::{Clock, HttpClient, HttpClientError, SettingsSource};
use scoreload_application::{
    ApplicationError, CacheStatus, LoadRunner, LoadSummary, SharedTokenCache, TokenError,
};
use scoreload_domain::{DomainError, catalogue, find_scenario};
use scoreload_infrastructure::{
    ReqwestHttpClient, Settings, SettingsError, SharedSettings, SystemClock,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::report::render_scenarios;

/// Anything a command can fail with.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Configuration is missing or invalid.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Bad scenario name or filter.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The HTTP client could not be built or a request failed.
    #[error(transparent)]
    Http(#[from] HttpClientError),

    /// No token could be obtained.
    #[error(transparent)]
    Auth(#[from] TokenError),

    /// The load run failed.
    #[error(transparent)]
    Application(#[from] ApplicationError),

    /// Output could not be encoded.
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Loads settings from the environment, applies `host` and validates.
///
/// # Errors
///
/// Returns the loading or validation error.
pub fn load_settings(host: Option<&str>) -> Result<Settings, CommandError> {
    let mut settings = Settings::from_env()?;
    if let Some(host) = host {
        settings = settings.with_host(host);
    }
    settings.validate()?;
    Ok(settings)
}

/// The shared pieces every command that talks to the API needs.
pub struct Wiring<C: ?Sized> {
    /// Transport
    pub client: Arc<C>,
    /// Live settings
    pub settings: Arc<SharedSettings>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Process-wide token cache
    pub tokens: Arc<SharedTokenCache>,
}

impl<C> Wiring<C>
where
    C: HttpClient + ?Sized + 'static,
{
    /// Builds one token cache over `settings`, shared by everything that follows.
    #[must_use]
    pub fn new(client: Arc<C>, settings: Settings, clock: Arc<dyn Clock>) -> Self {
        let settings = Arc::new(SharedSettings::new(settings));
        let source: Arc<dyn SettingsSource> = settings.clone();
        let tokens = Arc::new(SharedTokenCache::new(source, clock.clone()));
        Self {
            client,
            settings,
            clock,
            tokens,
        }
    }

    /// A load runner sharing this wiring's token cache.
    #[must_use]
    pub fn runner(&self) -> LoadRunner<C> {
        LoadRunner::new(
            self.client.clone(),
            self.tokens.clone(),
            self.settings.clone(),
            self.clock.clone(),
        )
    }
}

/// Production wiring over reqwest and the system clock.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn live_wiring(settings: Settings) -> Result<Wiring<ReqwestHttpClient>, CommandError> {
    Ok(Wiring::new(
        Arc::new(ReqwestHttpClient::new()?),
        settings,
        Arc::new(SystemClock),
    ))
}

/// Runs a load test, stopping early on Ctrl-C.
///
/// # Errors
///
/// Returns an error for an unknown scenario, bad options or bad settings.
pub async fn run<C>(wiring: &Wiring<C>, args: &RunArgs) -> Result<LoadSummary, CommandError>
where
    C: HttpClient + ?Sized + 'static,
{
    let scenario = find_scenario(&args.scenario)?;
    let options = args.run_options(wiring.settings.snapshot().request_timeout)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping virtual users");
            let _ = stop_tx.send(true);
        }
    });

    let summary = wiring.runner().run(scenario, options, stop_rx).await;
    interrupt.abort();
    Ok(summary?)
}

/// Authenticates once and describes the cached token.
///
/// # Errors
///
/// Returns the token error if authentication fails.
pub async fn token<C>(wiring: &Wiring<C>) -> Result<String, CommandError>
where
    C: HttpClient + ?Sized + 'static,
{
    let token = match wiring.tokens.try_get_token(wiring.client.as_ref()).await {
        Ok(token) => token,
        Err(err) => {
            warn!(error = %err, "Authentication failed");
            return Err(err.into());
        }
    };

    let mut out = format!("Token: {}\n", token.preview());
    if let CacheStatus::Valid {
        expires_at,
        seconds_remaining,
    } = wiring.tokens.status()
    {
        out.push_str(&format!(
            "Refresh due: {} ({seconds_remaining}s)\n",
            expires_at.to_rfc3339()
        ));
    }
    Ok(out)
}

/// Lists the built-in scenarios as text or JSON.
///
/// # Errors
///
/// Returns an error if JSON encoding fails.
pub fn scenarios(json: bool) -> Result<String, CommandError> {
    let scenarios = catalogue();
    if json {
        let mut text = serde_json::to_string_pretty(&scenarios)?;
        text.push('\n');
        Ok(text)
    } else {
        Ok(render_scenarios(&scenarios))
    }
}
