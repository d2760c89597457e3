//! Drives a scenario with a pool of virtual users.

use std::sync::Arc;
use std::time::Duration;

use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scoreload_domain::request::DEFAULT_TIMEOUT;
use scoreload_domain::{Scenario, TaskDefinition, TaskFilter};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use super::id_cache::IdCache;
use super::session::{SessionContext, VirtualUser};
use super::stats::{LoadSummary, StatsRecorder};
use crate::auth::SharedTokenCache;
use crate::error::{ApplicationError, ApplicationResult};
use crate::ports::{Clock, HttpClient, SettingsSource};

/// How a load run is shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Number of concurrent virtual users
    pub users: u64,
    /// Users started per second during ramp-up
    pub spawn_rate: f64,
    /// Total run duration
    pub run_time: Duration,
    /// Shortest pause between tasks
    pub wait_min: Duration,
    /// Longest pause between tasks
    pub wait_max: Duration,
    /// Delete created items straight away
    pub cleanup: bool,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Restricts the scenario's tasks
    pub filter: TaskFilter,
    /// Seed for reproducible task selection
    pub seed: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            users: 1,
            spawn_rate: 1.0,
            run_time: Duration::from_secs(60),
            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(3),
            cleanup: true,
            request_timeout: DEFAULT_TIMEOUT,
            filter: TaskFilter::default(),
            seed: None,
        }
    }
}

impl RunOptions {
    /// Checks that the options describe a runnable test.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::InvalidOptions` naming the offending option.
    pub fn validate(&self) -> ApplicationResult<()> {
        if self.users == 0 {
            return Err(ApplicationError::InvalidOptions(
                "users must be at least 1".to_string(),
            ));
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate <= 0.0 {
            return Err(ApplicationError::InvalidOptions(format!(
                "spawn rate must be positive, got {}",
                self.spawn_rate
            )));
        }
        self.spawn_interval()?;
        if self.run_time.is_zero() {
            return Err(ApplicationError::InvalidOptions(
                "run time must be positive".to_string(),
            ));
        }
        if self.wait_min > self.wait_max {
            return Err(ApplicationError::InvalidOptions(format!(
                "minimum wait {:?} exceeds maximum wait {:?}",
                self.wait_min, self.wait_max
            )));
        }
        Ok(())
    }

    /// Pause between two user starts.
    fn spawn_interval(&self) -> ApplicationResult<Duration> {
        Duration::try_from_secs_f64(1.0 / self.spawn_rate).map_err(|_| {
            ApplicationError::InvalidOptions(format!(
                "spawn rate {} is too small",
                self.spawn_rate
            ))
        })
    }
}

/// Runs scenarios against the API through a shared token cache.
pub struct LoadRunner<C: ?Sized> {
    client: Arc<C>,
    tokens: Arc<SharedTokenCache>,
    settings: Arc<dyn SettingsSource>,
    clock: Arc<dyn Clock>,
}

impl<C> LoadRunner<C>
where
    C: HttpClient + ?Sized + 'static,
{
    /// Creates a runner. `tokens` must read the same `settings`.
    #[must_use]
    pub fn new(
        client: Arc<C>,
        tokens: Arc<SharedTokenCache>,
        settings: Arc<dyn SettingsSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            tokens,
            settings,
            clock,
        }
    }

    /// Runs `scenario` until the run time elapses or `shutdown` turns true.
    ///
    /// Users are started at `spawn_rate` per second and each loops through
    /// weighted tasks with a random pause in between. All users are joined
    /// before the summary is built.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or the filter leaves the
    /// scenario without tasks.
    pub async fn run(
        &self,
        scenario: Scenario,
        options: RunOptions,
        shutdown: watch::Receiver<bool>,
    ) -> ApplicationResult<LoadSummary> {
        options.validate()?;
        let spawn_interval = options.spawn_interval()?;
        let scenario = scenario.filtered(&options.filter)?;
        let weights = WeightedIndex::new(scenario.tasks.iter().map(|t| t.weight))
            .map_err(|e| ApplicationError::InvalidOptions(format!("task weights: {e}")))?;
        let tasks: Arc<[TaskDefinition]> = scenario.tasks.into();

        let ctx = Arc::new(SessionContext {
            client: self.client.clone(),
            tokens: self.tokens.clone(),
            settings: self.settings.clone(),
            clock: self.clock.clone(),
            ids: IdCache::new(),
            stats: StatsRecorder::new(),
            request_timeout: options.request_timeout,
            cleanup: options.cleanup,
        });

        info!(
            scenario = %scenario.name,
            users = options.users,
            spawn_rate = options.spawn_rate,
            run_time_secs = options.run_time.as_secs(),
            tasks = tasks.len(),
            "Starting load test"
        );

        let started = Instant::now();
        let deadline = started.checked_add(options.run_time).ok_or_else(|| {
            ApplicationError::InvalidOptions(format!("run time {:?} is too long", options.run_time))
        })?;
        let mut seeds = options
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let mut stop = shutdown.clone();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for number in 1..=options.users {
            if *stop.borrow() || Instant::now() >= deadline {
                break;
            }

            let user = VirtualUser::new(number, ctx.clone(), StdRng::seed_from_u64(seeds.random()));
            handles.push(tokio::spawn(user_loop(
                user,
                tasks.clone(),
                weights.clone(),
                (options.wait_min, options.wait_max),
                deadline,
                shutdown.clone(),
            )));

            if number < options.users {
                let next = Instant::now()
                    .checked_add(spawn_interval)
                    .map_or(deadline, |next| next.min(deadline));
                tokio::select! {
                    () = tokio::time::sleep_until(next) => {}
                    () = wait_for_shutdown(&mut stop) => break,
                }
            }
        }
        info!(spawned = handles.len(), "All users started");

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Virtual user task ended abnormally");
            }
        }

        let summary = ctx.stats.summary(started.elapsed());
        info!(
            requests = summary.total_requests(),
            failures = summary.aggregated.failures,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            auth_requests = self.tokens.auth_requests(),
            "Load test finished"
        );
        Ok(summary)
    }
}

async fn user_loop<C>(
    mut user: VirtualUser<C>,
    tasks: Arc<[TaskDefinition]>,
    weights: WeightedIndex<u32>,
    (wait_min, wait_max): (Duration, Duration),
    deadline: Instant,
    mut shutdown: watch::Receiver<bool>,
) where
    C: HttpClient + ?Sized,
{
    user.on_start().await;

    loop {
        if *shutdown.borrow() || Instant::now() >= deadline {
            break;
        }

        let task = tasks[user.pick_task(&weights)];
        user.run_task(&task).await;

        let pause = user.think_time(wait_min, wait_max);
        if pause.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }
        let wake = Instant::now()
            .checked_add(pause)
            .map_or(deadline, |wake| wake.min(deadline));
        tokio::select! {
            () = tokio::time::sleep_until(wake) => {}
            () = wait_for_shutdown(&mut shutdown) => break,
        }
    }
}

/// Resolves once shutdown is requested; never if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, MockHttpClient};
    use pretty_assertions::assert_eq;
    use scoreload_domain::{AuthSettings, DomainError, ResponseSpec, find_scenario};
    use serde_json::json;

    fn runner(client: MockHttpClient) -> (LoadRunner<MockHttpClient>, Arc<MockHttpClient>) {
        let client = Arc::new(client);
        let settings: Arc<dyn SettingsSource> = Arc::new(AuthSettings::new(
            "https://api.example.com/v1",
            "client",
            "secret",
            "users:read",
        ));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at(0));
        let tokens = Arc::new(SharedTokenCache::new(settings.clone(), clock.clone()));
        (LoadRunner::new(client.clone(), tokens, settings, clock), client)
    }

    fn ok_api() -> MockHttpClient {
        MockHttpClient::new(|request, _| {
            if request.url.ends_with("/authorisation/token") {
                Ok(ResponseSpec::json_body(
                    200,
                    &json!({"access_token": "tok", "expires_in": 3600}),
                ))
            } else {
                Ok(ResponseSpec::json_body(200, &json!([])))
            }
        })
    }

    fn quick(users: u64) -> RunOptions {
        RunOptions {
            users,
            spawn_rate: 200.0,
            run_time: Duration::from_millis(300),
            wait_min: Duration::ZERO,
            wait_max: Duration::from_millis(5),
            seed: Some(7),
            ..RunOptions::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_shares_one_token_across_users() {
        let (runner, client) = runner(ok_api());
        let (_tx, rx) = watch::channel(false);

        let summary = runner
            .run(find_scenario("smoke").unwrap(), quick(8), rx)
            .await
            .unwrap();

        assert_eq!(client.calls_to("/authorisation/token"), 1);
        assert!(summary.total_requests() > 0);
        assert_eq!(summary.aggregated.failures, 0);
        let smoke = find_scenario("smoke").unwrap();
        for row in &summary.tasks {
            assert!(smoke.tasks.iter().any(|t| t.name == row.name), "{}", row.name);
        }
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_run_early() {
        let (runner, _) = runner(ok_api());
        let (tx, rx) = watch::channel(false);
        let options = RunOptions {
            run_time: Duration::from_secs(60),
            ..quick(3)
        };

        let run = tokio::spawn(async move {
            runner.run(find_scenario("users-get").unwrap(), options, rx).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run did not stop")
            .unwrap()
            .unwrap();
        assert!(summary.elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_filter_restricts_tasks() {
        let (runner, client) = runner(ok_api());
        let (_tx, rx) = watch::channel(false);
        let options = RunOptions {
            filter: TaskFilter::parse(&["teams"]).unwrap(),
            ..quick(2)
        };

        let summary = runner
            .run(find_scenario("smoke").unwrap(), options, rx)
            .await
            .unwrap();

        assert_eq!(summary.tasks.len(), 1);
        assert_eq!(summary.tasks[0].name, "Teams List");
        assert!(
            client
                .requests()
                .iter()
                .all(|r| r.url.ends_with("/teams") || r.url.ends_with("/authorisation/token"))
        );
    }

    #[tokio::test]
    async fn test_empty_filter_result_is_an_error() {
        let (runner, _) = runner(ok_api());
        let (_tx, rx) = watch::channel(false);
        let options = RunOptions {
            filter: TaskFilter::parse(&["delete"]).unwrap(),
            ..quick(1)
        };

        let err = runner
            .run(find_scenario("smoke").unwrap(), options, rx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::EmptyScenario(_))
        ));
    }

    #[test]
    fn test_tiny_spawn_rate_is_rejected() {
        let options = RunOptions {
            users: 2,
            spawn_rate: 1e-300,
            ..RunOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ApplicationError::InvalidOptions(message)) if message.contains("too small")
        ));

        let slow = RunOptions {
            spawn_rate: 0.001,
            ..RunOptions::default()
        };
        assert_eq!(slow.spawn_interval().unwrap(), Duration::from_secs(1000));
        assert!(RunOptions { spawn_rate: 1e300, ..RunOptions::default() }.validate().is_ok());
    }

    #[tokio::test]
    async fn test_tiny_spawn_rate_fails_before_spawning() {
        let (runner, client) = runner(ok_api());
        let (_tx, rx) = watch::channel(false);
        let options = RunOptions {
            users: 2,
            spawn_rate: 1e-300,
            ..RunOptions::default()
        };

        let result = runner.run(find_scenario("smoke").unwrap(), options, rx).await;

        assert!(matches!(result, Err(ApplicationError::InvalidOptions(_))));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unrepresentable_run_time_is_rejected() {
        let (runner, client) = runner(ok_api());
        let (_tx, rx) = watch::channel(false);
        let options = RunOptions {
            run_time: Duration::MAX,
            ..RunOptions::default()
        };

        let result = runner.run(find_scenario("smoke").unwrap(), options, rx).await;

        assert!(matches!(result, Err(ApplicationError::InvalidOptions(message)) if message.contains("too long")));
        assert!(client.requests().is_empty());
    }

    #[test]
    fn test_options_validation() {
        assert!(RunOptions::default().validate().is_ok());
        assert!(RunOptions { users: 0, ..RunOptions::default() }.validate().is_err());
        assert!(RunOptions { spawn_rate: 0.0, ..RunOptions::default() }.validate().is_err());
        assert!(RunOptions { spawn_rate: f64::NAN, ..RunOptions::default() }.validate().is_err());
        assert!(
            RunOptions {
                wait_min: Duration::from_secs(5),
                wait_max: Duration::from_secs(1),
                ..RunOptions::default()
            }
            .validate()
            .is_err()
        );
    }
}
