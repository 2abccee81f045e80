//! Per-host circuit breaker.
//!
//! Statistical agencies answer abuse with HTTP 403 or repeated 429s. When a
//! host does that, its breaker trips and every further request to that host
//! is refused for a cooldown period. Other hosts keep working.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// State of one host's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { tripped_at: Instant },
}

impl Default for BreakerState {
    fn default() -> Self {
        BreakerState::Closed {
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    hosts: Mutex<HashMap<String, BreakerState>>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// 30-minute cooldown, trips after 3 consecutive failures.
    pub fn default_hosts() -> Self {
        Self::new(Duration::from_secs(30 * 60), 3)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BreakerState>> {
        self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        let mut hosts = self.lock();
        match hosts.get(host).copied().unwrap_or_default() {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { tripped_at } => {
                if tripped_at.elapsed() >= self.cooldown {
                    hosts.insert(host.to_string(), BreakerState::default());
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, host: &str) {
        self.lock().insert(host.to_string(), BreakerState::default());
    }

    pub fn record_failure(&self, host: &str) {
        let mut hosts = self.lock();
        let state = hosts.entry(host.to_string()).or_default();
        if let BreakerState::Closed {
            consecutive_failures,
        } = *state
        {
            let failures = consecutive_failures + 1;
            *state = if failures >= self.failure_threshold {
                tracing::warn!(host, failures, "circuit breaker tripped");
                BreakerState::Open {
                    tripped_at: Instant::now(),
                }
            } else {
                BreakerState::Closed {
                    consecutive_failures: failures,
                }
            };
        }
    }

    /// Trip immediately (HTTP 403).
    pub fn trip(&self, host: &str) {
        tracing::warn!(host, "circuit breaker tripped by hard refusal");
        self.lock().insert(
            host.to_string(),
            BreakerState::Open {
                tripped_at: Instant::now(),
            },
        );
    }

    pub fn remaining_cooldown(&self, host: &str) -> Duration {
        match self.lock().get(host) {
            Some(BreakerState::Open { tripped_at }) => {
                self.cooldown.saturating_sub(tripped_at.elapsed())
            }
            _ => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_hosts_start_closed() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        assert!(cb.is_allowed("files.zillowstatic.com"));
    }

    #[test]
    fn trips_after_threshold_failures() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        cb.record_failure("api.bls.gov");
        cb.record_failure("api.bls.gov");
        assert!(cb.is_allowed("api.bls.gov"));
        cb.record_failure("api.bls.gov");
        assert!(!cb.is_allowed("api.bls.gov"));
    }

    #[test]
    fn hosts_are_isolated() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        cb.trip("www2.census.gov");
        assert!(!cb.is_allowed("www2.census.gov"));
        assert!(cb.is_allowed("www.fhfa.gov"));
        assert!(cb.remaining_cooldown("www2.census.gov") > Duration::ZERO);
        assert_eq!(cb.remaining_cooldown("www.fhfa.gov"), Duration::ZERO);
    }

    #[test]
    fn success_resets_counter() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        cb.record_failure("h");
        cb.record_failure("h");
        cb.record_success("h");
        cb.record_failure("h");
        assert!(cb.is_allowed("h"));
    }

    #[test]
    fn expires_after_cooldown() {
        let cb = CircuitBreaker::new(Duration::from_millis(10), 3);
        cb.trip("h");
        assert!(!cb.is_allowed("h"));
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.is_allowed("h"));
    }
}
