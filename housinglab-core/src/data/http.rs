//! Blocking HTTP source with bounded retry and the per-host circuit breaker.
//!
//! Every outbound request in the toolkit (catalog GETs and BLS API POSTs)
//! goes through `HttpSource::send_with_retry`.

use super::catalog::DatasetDescriptor;
use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, DatasetSource};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy: `max_retries` extra attempts, delays doubling from `base_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Sleep before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay * 2u32.saturating_pow(attempt - 1)
    }
}

pub struct HttpSource {
    client: Client,
    circuit_breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

impl HttpSource {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>, policy: RetryPolicy) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(policy.timeout)
            .user_agent(concat!("housinglab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Client(e.to_string()))?;

        Ok(Self {
            client,
            circuit_breaker,
            policy,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET a URL and return the body.
    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DataError> {
        let resp = self.send_with_retry(url, |c| c.get(url))?;
        let body = resp
            .bytes()
            .map_err(|e| DataError::NetworkUnreachable(format!("reading body of {url}: {e}")))?;
        Ok(body.to_vec())
    }

    /// POST a JSON body and decode a JSON response.
    pub fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, DataError> {
        let resp = self.send_with_retry(url, |c| c.post(url).json(body))?;
        resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response from {url}: {e}"))
        })
    }

    fn send_with_retry(
        &self,
        url: &str,
        build: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<Response, DataError> {
        let host = host_of(url);
        if !self.circuit_breaker.is_allowed(&host) {
            return Err(DataError::CircuitBreakerTripped { host });
        }

        let mut last_error = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.policy.delay_for(attempt);
                tracing::warn!(
                    url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error.as_ref().map(ToString::to_string).unwrap_or_default(),
                    "retrying request"
                );
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed(&host) {
                return Err(DataError::CircuitBreakerTripped { host });
            }

            match build(&self.client).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::FORBIDDEN {
                        self.circuit_breaker.trip(&host);
                        return Err(DataError::CircuitBreakerTripped { host });
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure(&host);
                        last_error = Some(DataError::RateLimited { host: host.clone() });
                        continue;
                    }

                    if status == StatusCode::UNAUTHORIZED {
                        return Err(DataError::AuthenticationRequired(format!(
                            "{host} rejected the request credentials"
                        )));
                    }

                    if status == StatusCode::NOT_FOUND {
                        return Err(DataError::NotFound {
                            url: url.to_string(),
                        });
                    }

                    if !status.is_success() {
                        self.circuit_breaker.record_failure(&host);
                        last_error = Some(DataError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                        continue;
                    }

                    self.circuit_breaker.record_success(&host);
                    return Ok(resp);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(DataError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::NetworkUnreachable(format!("{url}: max retries exceeded"))))
    }
}

impl DatasetSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self, dataset: &DatasetDescriptor) -> Result<Vec<u8>, DataError> {
        self.get_bytes(dataset.url)
    }

    fn is_available(&self, dataset: &DatasetDescriptor) -> bool {
        self.circuit_breaker.is_allowed(&host_of(dataset.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://api.bls.gov/publicAPI/v2/timeseries/data/"), "api.bls.gov");
        assert_eq!(host_of("not a url"), "not a url");
    }

    #[test]
    fn tripped_host_refuses_without_network() {
        let breaker = Arc::new(CircuitBreaker::default_hosts());
        breaker.trip("www.fhfa.gov");
        let source = HttpSource::new(breaker, RetryPolicy::default()).unwrap();
        let err = source
            .get_bytes("https://www.fhfa.gov/hpi/download/monthly/hpi_master.csv")
            .unwrap_err();
        assert!(matches!(err, DataError::CircuitBreakerTripped { .. }));
    }
}
