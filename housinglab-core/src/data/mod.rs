//! Data acquisition: catalog, HTTP download, BLS API, raw table loading.

pub mod bls_api;
pub mod catalog;
pub mod circuit_breaker;
pub mod download;
pub mod http;
pub mod layout;
pub mod provider;
pub mod table;

pub use bls_api::{fetch_metro_series, BlsApiConfig, BlsFetchSummary};
pub use catalog::{default_catalog, Availability, DatasetDescriptor, SourceCategory};
pub use circuit_breaker::CircuitBreaker;
pub use download::{download_datasets, write_download_metadata, DownloadOptions, DownloadSummary};
pub use http::{HttpSource, RetryPolicy};
pub use layout::DataLayout;
pub use provider::{DataError, DatasetSource, DownloadProgress, NoProgress, StdoutProgress};
pub use table::{RawTable, Row, TableError};
