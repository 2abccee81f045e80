//! Dataset source trait and structured error types.
//!
//! The DatasetSource trait abstracts over where raw files come from (live
//! HTTP, a local mirror, a test double) so the downloader never talks to
//! reqwest directly.

use super::catalog::DatasetDescriptor;
use thiserror::Error;

/// Structured error types for acquisition operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by {host} (HTTP 429)")]
    RateLimited { host: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("hard stop: {host} has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped { host: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("'{name}' must be downloaded manually")]
    ManualDownload { name: String },

    #[error("BLS API request budget exhausted ({limit} requests per day)")]
    BudgetExhausted { limit: usize },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http client error: {0}")]
    Client(String),
}

impl DataError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Trait for raw dataset sources.
pub trait DatasetSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the full body of a dataset.
    fn fetch(&self, dataset: &DatasetDescriptor) -> Result<Vec<u8>, DataError>;

    /// False while the dataset's host is blocked.
    fn is_available(&self, dataset: &DatasetDescriptor) -> bool;
}

/// Progress callback for multi-dataset downloads. Called from worker threads.
pub trait DownloadProgress: Send + Sync {
    fn on_start(&self, name: &str, index: usize, total: usize);

    fn on_complete(&self, name: &str, index: usize, total: usize, result: &Result<(), DataError>);

    fn on_batch_complete(&self, downloaded: usize, failed: usize, total: usize);
}

/// Progress reporter that prints to stdout.
pub struct StdoutProgress;

impl DownloadProgress for StdoutProgress {
    fn on_start(&self, name: &str, index: usize, total: usize) {
        println!("[{}/{}] Fetching {name}...", index + 1, total);
    }

    fn on_complete(&self, name: &str, _index: usize, _total: usize, result: &Result<(), DataError>) {
        match result {
            Ok(()) => println!("  OK: {name}"),
            Err(e) => println!("  FAIL: {name}: {e}"),
        }
    }

    fn on_batch_complete(&self, downloaded: usize, failed: usize, total: usize) {
        println!("\nDownload complete: {downloaded}/{total} downloaded, {failed} failed");
    }
}

/// Progress reporter that stays silent (tests, library callers).
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn on_start(&self, _name: &str, _index: usize, _total: usize) {}

    fn on_complete(&self, _name: &str, _index: usize, _total: usize, _result: &Result<(), DataError>) {}

    fn on_batch_complete(&self, _downloaded: usize, _failed: usize, _total: usize) {}
}
