//! Per-source debug trace, written as `processed/debug/{source}_trace.json`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const SAMPLE_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTrace {
    pub source: String,
    pub file: String,
    pub present: bool,
    pub rows_in: usize,
    pub observations_out: usize,
    /// Rows whose key did not resolve to a target.
    pub unmatched_rows: usize,
    /// Distinct unresolved keys.
    pub unmatched_keys: usize,
    pub sample_unmatched: Vec<String>,
    /// Dropped rows or cells, by reason.
    pub dropped: BTreeMap<String, usize>,
    #[serde(skip)]
    unmatched: BTreeSet<String>,
}

impl SourceTrace {
    pub fn new(source: &str, file: &str) -> Self {
        Self {
            source: source.to_string(),
            file: file.to_string(),
            present: true,
            ..Self::default()
        }
    }

    pub fn absent(source: &str, file: &str) -> Self {
        Self {
            present: false,
            ..Self::new(source, file)
        }
    }

    pub fn unmatched(&mut self, key: &str) {
        self.unmatched_rows += 1;
        if self.unmatched.insert(key.to_string()) {
            self.unmatched_keys = self.unmatched.len();
            if self.sample_unmatched.len() < SAMPLE_LIMIT {
                self.sample_unmatched.push(key.to_string());
            }
        }
    }

    pub fn record_drop(&mut self, reason: &str) {
        *self.dropped.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    pub fn log_summary(&self) {
        if !self.present {
            tracing::warn!(source = %self.source, file = %self.file, "source file absent; columns will be null");
            return;
        }
        tracing::info!(
            source = %self.source,
            rows_in = self.rows_in,
            observations = self.observations_out,
            unmatched_rows = self.unmatched_rows,
            dropped = self.dropped_total(),
            "normalized source"
        );
        for (reason, count) in &self.dropped {
            tracing::debug!(source = %self.source, reason = %reason, count, "dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_counts_rows_and_distinct_keys() {
        let mut trace = SourceTrace::new("zhvi_metro", "zillow/zhvi_metro.csv");
        trace.unmatched("Gotham, NY");
        trace.unmatched("Gotham, NY");
        trace.unmatched("Metropolis, IL");
        assert_eq!(trace.unmatched_rows, 3);
        assert_eq!(trace.unmatched_keys, 2);
        assert_eq!(trace.sample_unmatched, vec!["Gotham, NY", "Metropolis, IL"]);
    }

    #[test]
    fn json_omits_internal_set() {
        let mut trace = SourceTrace::new("bls", "bls/metro_employment.csv");
        trace.record_drop("annual average");
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["dropped"]["annual average"], 1);
        assert!(json.get("unmatched").is_none());
        assert_eq!(json["present"], true);
    }
}
