//! HousingLab Core: domain types, data acquisition, key reconciliation.
//!
//! This crate contains the data side of the toolkit:
//! - Domain types (CBSA/county keys, monthly records, metro reference)
//! - Dataset catalog, HTTP download with retry and per-host circuit breaker
//! - BLS API client
//! - Per-source normalizers and the outer join onto (key, month)

pub mod data;
pub mod domain;
pub mod reconcile;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed across the download worker pool and
    /// returned from stages are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::MasterRecord>();
        require_sync::<domain::MasterRecord>();
        require_send::<domain::CountyRecord>();
        require_sync::<domain::CountyRecord>();
        require_send::<domain::MetroReference>();
        require_sync::<domain::MetroReference>();

        require_send::<data::DataError>();
        require_sync::<data::DataError>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
        require_send::<data::HttpSource>();
        require_sync::<data::HttpSource>();
        require_send::<data::DownloadSummary>();
        require_sync::<data::DownloadSummary>();

        require_send::<reconcile::MetroReconciliation>();
        require_sync::<reconcile::MetroReconciliation>();
        require_send::<reconcile::ReconcileError>();
        require_sync::<reconcile::ReconcileError>();
    }

    /// Normalizers are plain functions of a table; none of them sees the layout.
    #[test]
    fn normalizers_take_tables_not_paths() {
        fn _check(
            table: &data::RawTable,
            matcher: &reconcile::RegionMatcher,
        ) -> Result<reconcile::NormalizedTable<domain::CbsaCode>, reconcile::ReconcileError> {
            reconcile::zillow::normalize_metro(table, &reconcile::zillow::METRO_FILES[0], matcher)
        }
    }
}
