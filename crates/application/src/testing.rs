//! Test doubles shared by the unit tests of this crate.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use scoreload_domain::{AuthSettings, RequestSpec, ResponseSpec};
use serde_json::Value;

use crate::ports::{Clock, HttpClient, HttpClientError, HttpFuture, SettingsSource};

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Starts at `secs` after the Unix epoch.
    pub fn at(secs: i64) -> Self {
        Self {
            now: Mutex::new(Self::instant(secs)),
        }
    }

    /// The instant `secs` after the Unix epoch.
    pub fn instant(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// Moves the clock to `secs`.
    pub fn set(&self, secs: i64) {
        *self.now.lock() = Self::instant(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Settings that can be swapped mid-test.
pub struct SwitchableSettings {
    current: RwLock<AuthSettings>,
}

impl SwitchableSettings {
    /// Starts with `settings`.
    pub fn new(settings: AuthSettings) -> Self {
        Self {
            current: RwLock::new(settings),
        }
    }

    /// Swaps in new settings.
    pub fn replace(&self, settings: AuthSettings) {
        *self.current.write() = settings;
    }
}

impl SettingsSource for SwitchableSettings {
    fn auth_settings(&self) -> AuthSettings {
        self.current.read().clone()
    }
}

type Responder =
    Box<dyn Fn(&RequestSpec, usize) -> Result<ResponseSpec, HttpClientError> + Send + Sync>;

/// Records every request and answers from a closure.
pub struct MockHttpClient {
    responder: Responder,
    requests: Mutex<Vec<RequestSpec>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl MockHttpClient {
    /// Answers with `responder`, which also gets the zero-based call number.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RequestSpec, usize) -> Result<ResponseSpec, HttpClientError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Same JSON answer to every request.
    pub fn always(status: u16, body: Value) -> Self {
        Self::new(move |_, _| Ok(ResponseSpec::json_body(status, &body)))
    }

    /// Answers in order, repeating the last answer once exhausted.
    pub fn sequence(answers: Vec<(u16, Value)>) -> Self {
        assert!(!answers.is_empty());
        Self::new(move |_, n| {
            let (status, body) = &answers[n.min(answers.len() - 1)];
            Ok(ResponseSpec::json_body(*status, body))
        })
    }

    /// Same non-JSON body to every request.
    pub fn raw(status: u16, body: Vec<u8>) -> Self {
        Self::new(move |_, _| {
            Ok(ResponseSpec::new(
                status,
                std::collections::HashMap::new(),
                body.clone(),
                Duration::ZERO,
            ))
        })
    }

    /// Fails every request with `error`.
    pub fn failing(error: HttpClientError) -> Self {
        Self::new(move |_, _| Err(error.clone()))
    }

    /// Delays every answer by `delay`.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RequestSpec> {
        self.requests.lock().clone()
    }

    /// Requests whose URL contains `path`.
    pub fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.contains(path))
            .count()
    }
}

impl HttpClient for MockHttpClient {
    fn execute<'a>(&'a self, request: &'a RequestSpec) -> HttpFuture<'a> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let result = (self.responder)(request, n);
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}
