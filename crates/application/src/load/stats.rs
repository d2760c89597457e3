//! Per-task request statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use scoreload_domain::HttpMethod;

/// Name of the row summing every task.
pub const AGGREGATED: &str = "Aggregated";

/// Outcome of one request as seen by a virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRecord {
    /// Time from send to fully read body
    pub latency: Duration,
    /// Response status, `None` if no response arrived
    pub status: Option<u16>,
    /// Response body size
    pub bytes: usize,
    /// Whether the status was acceptable for the method
    pub success: bool,
}

impl RequestRecord {
    /// A request that got a response.
    #[must_use]
    pub const fn response(latency: Duration, status: u16, bytes: usize, success: bool) -> Self {
        Self {
            latency,
            status: Some(status),
            bytes,
            success,
        }
    }

    /// A request that never got a response (no token, transport error).
    #[must_use]
    pub const fn failed(latency: Duration) -> Self {
        Self {
            latency,
            status: None,
            bytes: 0,
            success: false,
        }
    }
}

#[derive(Debug)]
struct EndpointStats {
    method: HttpMethod,
    failures: u64,
    no_response: u64,
    bytes: u64,
    statuses: BTreeMap<u16, u64>,
    latencies: Vec<Duration>,
}

impl EndpointStats {
    const fn new(method: HttpMethod) -> Self {
        Self {
            method,
            failures: 0,
            no_response: 0,
            bytes: 0,
            statuses: BTreeMap::new(),
            latencies: Vec::new(),
        }
    }

    fn record(&mut self, record: &RequestRecord) {
        if !record.success {
            self.failures += 1;
        }
        match record.status {
            Some(status) => *self.statuses.entry(status).or_insert(0) += 1,
            None => self.no_response += 1,
        }
        self.bytes += record.bytes as u64;
        self.latencies.push(record.latency);
    }
}

/// Collects request outcomes from all virtual users.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    endpoints: Mutex<BTreeMap<String, EndpointStats>>,
}

impl StatsRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one request under `name`.
    pub fn record(&self, name: &str, method: HttpMethod, record: RequestRecord) {
        let mut endpoints = self.endpoints.lock();
        if let Some(stats) = endpoints.get_mut(name) {
            stats.record(&record);
        } else {
            let mut stats = EndpointStats::new(method);
            stats.record(&record);
            endpoints.insert(name.to_string(), stats);
        }
    }

    /// Total requests recorded so far.
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.endpoints
            .lock()
            .values()
            .map(|s| s.latencies.len() as u64)
            .sum()
    }

    /// Summarizes everything recorded, over a run lasting `elapsed`.
    #[must_use]
    pub fn summary(&self, elapsed: Duration) -> LoadSummary {
        let endpoints = self.endpoints.lock();

        let tasks: Vec<TaskSummary> = endpoints
            .iter()
            .map(|(name, stats)| {
                let mut latencies = stats.latencies.clone();
                TaskSummary::build(
                    name.clone(),
                    Some(stats.method),
                    &mut latencies,
                    stats.failures,
                    stats.no_response,
                    stats.bytes,
                    stats.statuses.clone(),
                    elapsed,
                )
            })
            .collect();

        let mut all_latencies: Vec<Duration> = endpoints
            .values()
            .flat_map(|s| s.latencies.iter().copied())
            .collect();
        let mut statuses = BTreeMap::new();
        for stats in endpoints.values() {
            for (status, count) in &stats.statuses {
                *statuses.entry(*status).or_insert(0) += count;
            }
        }
        let aggregated = TaskSummary::build(
            AGGREGATED.to_string(),
            None,
            &mut all_latencies,
            endpoints.values().map(|s| s.failures).sum(),
            endpoints.values().map(|s| s.no_response).sum(),
            endpoints.values().map(|s| s.bytes).sum(),
            statuses,
            elapsed,
        );

        LoadSummary {
            tasks,
            aggregated,
            elapsed,
        }
    }
}

/// Statistics for one task, or for all of them.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
    /// Task name, or [`AGGREGATED`]
    pub name: String,
    /// Method, `None` for the aggregated row
    pub method: Option<HttpMethod>,
    /// Requests sent
    pub requests: u64,
    /// Requests that did not succeed
    pub failures: u64,
    /// Failures without any response
    pub no_response: u64,
    /// Response bytes received
    pub bytes: u64,
    /// Count per response status
    pub statuses: BTreeMap<u16, u64>,
    /// Mean latency
    pub average: Duration,
    /// Fastest request
    pub min: Duration,
    /// Slowest request
    pub max: Duration,
    /// Median latency
    pub p50: Duration,
    /// 95th percentile latency
    pub p95: Duration,
    /// 99th percentile latency
    pub p99: Duration,
    /// Throughput over the whole run
    pub requests_per_sec: f64,
}

impl TaskSummary {
    #[allow(clippy::too_many_arguments, clippy::cast_precision_loss)]
    fn build(
        name: String,
        method: Option<HttpMethod>,
        latencies: &mut [Duration],
        failures: u64,
        no_response: u64,
        bytes: u64,
        statuses: BTreeMap<u16, u64>,
        elapsed: Duration,
    ) -> Self {
        latencies.sort_unstable();
        let requests = latencies.len() as u64;

        let average = if latencies.is_empty() {
            Duration::ZERO
        } else {
            let total: Duration = latencies.iter().sum();
            total / u32::try_from(latencies.len()).unwrap_or(u32::MAX)
        };
        let requests_per_sec = if elapsed.is_zero() {
            0.0
        } else {
            requests as f64 / elapsed.as_secs_f64()
        };

        Self {
            name,
            method,
            requests,
            failures,
            no_response,
            bytes,
            statuses,
            average,
            min: latencies.first().copied().unwrap_or_default(),
            max: latencies.last().copied().unwrap_or_default(),
            p50: percentile(latencies, 50),
            p95: percentile(latencies, 95),
            p99: percentile(latencies, 99),
            requests_per_sec,
        }
    }

    /// Fraction of requests that failed, between 0 and 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }
}

/// Nearest-rank percentile of sorted samples.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

/// Result of a load run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    /// One row per task, ordered by name
    pub tasks: Vec<TaskSummary>,
    /// Totals across all tasks
    pub aggregated: TaskSummary,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl LoadSummary {
    /// Looks up a task row by name.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskSummary> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Total requests across all tasks.
    #[must_use]
    pub const fn total_requests(&self) -> u64 {
        self.aggregated.requests
    }
}
