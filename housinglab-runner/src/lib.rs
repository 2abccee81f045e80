//! HousingLab Runner: pipeline stages, feature engineering, scoring, exports.
//!
//! This crate builds on `housinglab-core` to provide:
//! - Layered configuration (TOML file, CLI overrides, environment)
//! - Data verification with a readiness verdict
//! - Momentum, yield and growth features per (key, month)
//! - Weighted investment scoring with named weight profiles
//! - CSV / Parquet / Markdown exports
//! - Stage orchestration: download → verify → clean → features → score

pub mod config;
pub mod export;
pub mod features;
pub mod pipeline;
pub mod scoring;
pub mod verify;

pub use config::{ConfigError, ConfigOverrides, PipelineConfig, ResolvedScope, BLS_API_KEY_ENV};
pub use export::{CsvRecord, ScoreReport};
pub use features::{engineer, FeatureError, FeatureRecord, Features};
pub use pipeline::{
    run_all, run_clean, run_download, run_features, run_score, run_verify, CleanSummary,
    DownloadStageSummary, FeatureSummary, ScoreLevel, ScoreOutcome,
};
pub use scoring::{
    build_candidates, score_candidates, sensitivity, Candidate, Metric, Normalization,
    ScoreError, ScoreRecord, ScoreWeights, SensitivityRow, WeightProfile,
};
pub use verify::{verify_layout, FileCheck, Readiness, VerificationReport};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
    }

    #[test]
    fn scoring_types_are_send_sync() {
        assert_send::<ScoreWeights>();
        assert_sync::<ScoreWeights>();
        assert_send::<ScoreRecord>();
        assert_sync::<ScoreRecord>();
        assert_send::<SensitivityRow>();
        assert_sync::<SensitivityRow>();
    }

    #[test]
    fn stage_summaries_are_send_sync() {
        assert_send::<VerificationReport>();
        assert_sync::<VerificationReport>();
        assert_send::<CleanSummary>();
        assert_sync::<CleanSummary>();
        assert_send::<ScoreOutcome>();
        assert_sync::<ScoreOutcome>();
        assert_send::<DownloadStageSummary>();
        assert_sync::<DownloadStageSummary>();
    }

    #[test]
    fn feature_records_are_send_sync() {
        assert_send::<FeatureRecord<housinglab_core::domain::MasterRecord>>();
        assert_sync::<FeatureRecord<housinglab_core::domain::MasterRecord>>();
    }
}
