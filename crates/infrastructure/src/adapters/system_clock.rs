//! Wall-clock time for token expiry and payload suffixes.

use chrono::{DateTime, Utc};
use scoreload_application::ports::Clock;

/// Reads the host's UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
