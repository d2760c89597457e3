//! A single simulated API client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use scoreload_domain::payload::{self, PayloadContext};
use scoreload_domain::request::join_url;
use scoreload_domain::scenario::{ID_PLACEHOLDER, USER_ID_PLACEHOLDER};
use scoreload_domain::{
    AccessToken, HttpMethod, IdSource, RequestSpec, Resource, ResponseSpec, TaskDefinition,
    TaskTag,
};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::id_cache::{IdCache, created_id};
use super::stats::{RequestRecord, StatsRecorder};
use crate::auth::SharedTokenCache;
use crate::ports::{Clock, HttpClient, SettingsSource};

/// Longest response excerpt written to failure logs.
const LOG_BODY_LIMIT: usize = 200;

/// Everything the virtual users of one run share.
pub struct SessionContext<C: ?Sized> {
    /// Transport for every request
    pub client: Arc<C>,
    /// Process-wide token cache
    pub tokens: Arc<SharedTokenCache>,
    /// Settings in effect, read for the API host on every request
    pub settings: Arc<dyn SettingsSource>,
    /// Time source for unique payload suffixes
    pub clock: Arc<dyn Clock>,
    /// Ids harvested or created so far
    pub ids: IdCache,
    /// Request statistics
    pub stats: StatsRecorder,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Delete created items straight away
    pub cleanup: bool,
}

/// What happened when a user ran a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The request was sent and the status was acceptable.
    Succeeded,
    /// The request was sent but failed.
    Failed,
    /// No token was available, so nothing was sent.
    Unauthenticated,
    /// The task needs an id this run has not created yet.
    Skipped,
}

/// One simulated client working through weighted tasks.
pub struct VirtualUser<C: ?Sized> {
    id: Uuid,
    number: u64,
    ctx: Arc<SessionContext<C>>,
    rng: StdRng,
    token: Option<AccessToken>,
}

impl<C> VirtualUser<C>
where
    C: HttpClient + ?Sized,
{
    /// Creates user number `number` (1-based).
    #[must_use]
    pub fn new(number: u64, ctx: Arc<SessionContext<C>>, rng: StdRng) -> Self {
        Self {
            id: Uuid::now_v7(),
            number,
            ctx,
            rng,
            token: None,
        }
    }

    /// Session id, for log correlation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Whether a token is currently attached.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Fetches the shared token; returns whether one was attached.
    pub async fn on_start(&mut self) -> bool {
        self.refresh_token().await;
        if self.token.is_none() {
            warn!(
                user = self.number,
                session = %self.id,
                "Failed to get authentication token, check CLIENT_ID, CLIENT_SECRET and API_HOST"
            );
        }
        self.token.is_some()
    }

    /// Picks the next task index according to `weights`.
    pub fn pick_task(&mut self, weights: &WeightedIndex<u32>) -> usize {
        weights.sample(&mut self.rng)
    }

    /// Random pause in `min..=max`.
    pub fn think_time(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(self.rng.random_range(min_ms..=max_ms))
    }

    /// Runs one task and records its outcome.
    ///
    /// A created id claimed by the task goes back to the pool unless the
    /// item was actually deleted.
    pub async fn run_task(&mut self, task: &TaskDefinition) -> TaskOutcome {
        self.refresh_token().await;
        let Some(token) = self.token.clone() else {
            warn!(task = task.name, user = self.number, "No authentication token, request not sent");
            self.ctx
                .stats
                .record(task.name, task.method, RequestRecord::failed(Duration::ZERO));
            return TaskOutcome::Unauthenticated;
        };

        let Some((path, claimed)) = self.resolve_path(task) else {
            debug!(task = task.name, "No created id available, skipping");
            return TaskOutcome::Skipped;
        };

        let body = payload::build(
            task.payload,
            &PayloadContext::new(self.number, self.unique_suffix()),
        );
        let request = self.request(task.method, &path, &token, body);

        let sent = self.send(task.name, &request).await;
        let accepted = sent
            .as_ref()
            .is_some_and(|response| task.method.accepts(response.status.as_u16()));
        if let Some(id) = claimed
            && !(accepted && task.method == HttpMethod::Delete)
        {
            debug!(task = task.name, id = %id, "Returning created id to the pool");
            self.ctx.ids.remember_created(task.resource, id);
        }

        let Some(response) = sent.filter(|_| accepted) else {
            return TaskOutcome::Failed;
        };

        if task.lists_collection() {
            self.harvest_ids(task.resource, &response);
        } else if task.tag == TaskTag::Create && !task.needs_id() {
            self.handle_created(task, &token, &response).await;
        }
        TaskOutcome::Succeeded
    }

    /// Re-reads the shared token; the cache answers from memory while it is valid.
    async fn refresh_token(&mut self) {
        self.token = match self.ctx.tokens.get_token(self.ctx.client.as_ref()).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, user = self.number, "Token request failed");
                None
            }
        };
    }

    /// The concrete path, plus the created id it claimed from the pool.
    fn resolve_path(&mut self, task: &TaskDefinition) -> Option<(String, Option<String>)> {
        let mut path = task.path.to_string();
        let mut claimed = None;
        if path.contains(ID_PLACEHOLDER) {
            let id = match task.id_source {
                IdSource::Created => {
                    let id = self.ctx.ids.take_created(task.resource, &mut self.rng)?;
                    claimed = Some(id.clone());
                    id
                }
                IdSource::Known => self.ctx.ids.pick(task.resource, &mut self.rng),
            };
            path = path.replace(ID_PLACEHOLDER, &id);
        }
        if path.contains(USER_ID_PLACEHOLDER) {
            let user_id = self.ctx.ids.pick(Resource::Users, &mut self.rng);
            path = path.replace(USER_ID_PLACEHOLDER, &user_id);
        }
        Some((path, claimed))
    }

    /// Four digits of the clock plus four random digits.
    fn unique_suffix(&mut self) -> String {
        let millis = self.ctx.clock.now().timestamp_millis().rem_euclid(10_000);
        let random: u16 = self.rng.random_range(1000..=9999);
        format!("{millis:04}{random}")
    }

    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        token: &AccessToken,
        body: Option<Value>,
    ) -> RequestSpec {
        let host = self.ctx.settings.auth_settings().api_host;
        let mut request = RequestSpec::new(method, join_url(&host, path))
            .with_timeout(self.ctx.request_timeout)
            .with_header("Authorization", token.bearer_header())
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json");
        request.body = body;
        request
    }

    /// Sends and records a request; `None` if no response arrived.
    async fn send(&self, name: &str, request: &RequestSpec) -> Option<ResponseSpec> {
        let started = Instant::now();
        match self.ctx.client.execute(request).await {
            Ok(response) => {
                let status = response.status.as_u16();
                let success = request.method.accepts(status);
                self.ctx.stats.record(
                    name,
                    request.method,
                    RequestRecord::response(started.elapsed(), status, response.size(), success),
                );
                if success {
                    debug!(task = name, status, "Request succeeded");
                } else {
                    warn!(
                        task = name,
                        method = %request.method,
                        status,
                        body = %excerpt(&response.text()),
                        "Request failed"
                    );
                }
                Some(response)
            }
            Err(err) => {
                self.ctx
                    .stats
                    .record(name, request.method, RequestRecord::failed(started.elapsed()));
                warn!(task = name, method = %request.method, error = %err, "Request error");
                None
            }
        }
    }

    fn harvest_ids(&self, resource: Resource, response: &ResponseSpec) {
        if let Ok(body) = response.json::<Value>() {
            let added = self.ctx.ids.remember_listed(resource, &body);
            if added > 0 {
                debug!(%resource, added, "Harvested ids");
            }
        }
    }

    async fn handle_created(
        &self,
        task: &TaskDefinition,
        token: &AccessToken,
        response: &ResponseSpec,
    ) {
        let Some(id) = response.json::<Value>().ok().as_ref().and_then(created_id) else {
            return;
        };

        if task.cleanup && self.ctx.cleanup {
            let path = task.resource.item_path(&id);
            let request = self.request(HttpMethod::Delete, &path, token, None);
            let name = format!("{} (cleanup)", task.name);
            let deleted = self
                .send(&name, &request)
                .await
                .is_some_and(|response| HttpMethod::Delete.accepts(response.status.as_u16()));
            if !deleted {
                // Left for a later delete task to retry.
                self.ctx.ids.remember_created(task.resource, id);
            }
        } else {
            self.ctx.ids.remember_created(task.resource, id);
        }
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() > LOG_BODY_LIMIT {
        format!("{}...", text.chars().take(LOG_BODY_LIMIT).collect::<String>())
    } else {
        text.to_string()
    }
}
