//! Pipeline configuration loaded from TOML.
//!
//! Every section is optional; a missing file or table falls back to the
//! defaults below. Validation runs before any stage touches data so that a
//! bad weight vector or an unknown state fails fast.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use housinglab_core::data::{BlsApiConfig, DataLayout, DownloadOptions, RetryPolicy};
use housinglab_core::domain::{
    lookup_state, CountyFips, KeyError, MetroReference, ReferenceError, StateInfo,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scoring::{Normalization, ScoreError, ScoreWeights};

/// Environment variable consulted when no BLS key is configured.
pub const BLS_API_KEY_ENV: &str = "BLS_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Weights(#[from] ScoreError),

    #[error(transparent)]
    Scope(#[from] ReferenceError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub download: DownloadConfig,
    pub bls: BlsConfig,
    pub scope: ScopeConfig,
    pub scoring: ScoringConfig,
    pub output: OutputConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("housing_market_data"),
            download: DownloadConfig::default(),
            bls: BlsConfig::default(),
            scope: ScopeConfig::default(),
            scoring: ScoringConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    pub workers: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub base_delay_ms: u64,
    pub force: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            workers: DownloadOptions::default().workers,
            max_retries: policy.max_retries,
            timeout_secs: policy.timeout.as_secs(),
            base_delay_ms: policy.base_delay.as_millis() as u64,
            force: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlsConfig {
    pub api_key: Option<String>,
    pub start_year: i32,
    pub end_year: i32,
}

impl Default for BlsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            start_year: 2015,
            end_year: 2024,
        }
    }
}

/// Processing scope. Empty lists mean "everything in the reference".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeConfig {
    /// CBSA codes or metro names.
    pub metros: Vec<String>,
    /// 5-digit county FIPS codes.
    pub counties: Vec<String>,
    /// State abbreviations, names or FIPS codes for the county cleaners.
    pub states: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            metros: Vec::new(),
            counties: Vec::new(),
            states: vec!["CA".into(), "TX".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub normalization: Normalization,
    pub top_n: usize,
    pub min_history_months: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            normalization: Normalization::MinMax,
            top_n: 20,
            min_history_months: 36,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Also write the master table as Parquet.
    pub parquet: bool,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub weights: Option<ScoreWeights>,
    pub metros: Vec<String>,
    pub states: Vec<String>,
    pub counties: Vec<String>,
    pub bls_api_key: Option<String>,
    pub top_n: Option<usize>,
    pub normalization: Option<Normalization>,
    pub force: bool,
}

/// Scope after resolving names against the metro reference.
#[derive(Debug, Clone)]
pub struct ResolvedScope {
    pub reference: MetroReference,
    pub counties: BTreeSet<CountyFips>,
    pub states: Vec<StateInfo>,
}

impl PipelineConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(dir) = overrides.data_dir {
            self.data_dir = dir;
        }
        if let Some(weights) = overrides.weights {
            self.scoring.weights = weights;
        }
        if !overrides.metros.is_empty() {
            self.scope.metros = overrides.metros;
        }
        if !overrides.states.is_empty() {
            self.scope.states = overrides.states;
        }
        if !overrides.counties.is_empty() {
            self.scope.counties = overrides.counties;
        }
        if overrides.bls_api_key.is_some() {
            self.bls.api_key = overrides.bls_api_key;
        }
        if let Some(n) = overrides.top_n {
            self.scoring.top_n = n;
        }
        if let Some(norm) = overrides.normalization {
            self.scoring.normalization = norm;
        }
        self.download.force |= overrides.force;
    }

    /// Fill the BLS key from `value` (normally the environment) when unset.
    pub fn apply_env_key(&mut self, value: Option<String>) {
        if self.bls.api_key.is_none() {
            self.bls.api_key = value.filter(|k| !k.trim().is_empty());
        }
    }

    /// Checks that need no data on disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.weights.validate()?;
        if self.download.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "download.workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.scoring.top_n == 0 {
            return Err(ConfigError::Invalid {
                field: "scoring.top_n",
                reason: "must be at least 1".into(),
            });
        }
        if self.bls.start_year > self.bls.end_year {
            return Err(ConfigError::Invalid {
                field: "bls.start_year",
                reason: format!(
                    "{} is after end_year {}",
                    self.bls.start_year, self.bls.end_year
                ),
            });
        }
        self.counties()?;
        self.states()?;
        Ok(())
    }

    pub fn counties(&self) -> Result<BTreeSet<CountyFips>, ConfigError> {
        self.scope
            .counties
            .iter()
            .map(|c| CountyFips::parse(c).map_err(ConfigError::from))
            .collect()
    }

    pub fn states(&self) -> Result<Vec<StateInfo>, ConfigError> {
        let mut out: Vec<StateInfo> = Vec::new();
        for query in &self.scope.states {
            let state = *lookup_state(query)?;
            if !out.contains(&state) {
                out.push(state);
            }
        }
        Ok(out)
    }

    /// Restrict `reference` to the configured metros and parse the county
    /// and state lists. Unknown metros are errors.
    pub fn resolve_scope(&self, reference: &MetroReference) -> Result<ResolvedScope, ConfigError> {
        Ok(ResolvedScope {
            reference: reference.restrict(&self.scope.metros)?,
            counties: self.counties()?,
            states: self.states()?,
        })
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.download.max_retries,
            base_delay: Duration::from_millis(self.download.base_delay_ms),
            timeout: Duration::from_secs(self.download.timeout_secs),
        }
    }

    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            workers: self.download.workers,
            force: self.download.force,
        }
    }

    pub fn bls_api_config(&self) -> BlsApiConfig {
        BlsApiConfig {
            api_key: self.bls.api_key.clone(),
            start_year: self.bls.start_year,
            end_year: self.bls.end_year,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = PipelineConfig::from_toml("").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(cfg.data_dir, PathBuf::from("housing_market_data"));
        assert_eq!(cfg.download.workers, 3);
        assert_eq!(cfg.scoring.min_history_months, 36);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn full_file_parses() {
        let toml = r#"
data_dir = "data"

[download]
workers = 2
max_retries = 5
timeout_secs = 30
base_delay_ms = 250
force = true

[bls]
api_key = "abc"
start_year = 2020
end_year = 2024

[scope]
metros = ["12420", "Phoenix-Mesa-Chandler, AZ"]
counties = ["06025"]
states = ["CA"]

[scoring]
weights = { affordability = 20, growth = 60, demographics = 10, yield = 10 }
normalization = "percentile_rank"
top_n = 5
min_history_months = 24

[output]
parquet = true
"#;
        let cfg = PipelineConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.retry_policy().base_delay, Duration::from_millis(250));
        assert_eq!(cfg.retry_policy().max_retries, 5);
        assert!(cfg.download_options().force);
        assert_eq!(cfg.bls_api_config().api_key.as_deref(), Some("abc"));
        assert_eq!(cfg.scoring.weights.growth, 60.0);
        assert_eq!(cfg.scoring.normalization, Normalization::PercentileRank);
        assert!(cfg.output.parquet);
        assert!(cfg.validate().is_ok());

        let scope = cfg
            .resolve_scope(&MetroReference::default_targets())
            .unwrap();
        assert_eq!(scope.reference.len(), 2);
        assert_eq!(scope.counties.len(), 1);
        assert_eq!(scope.states[0].abbr, "CA");
    }

    #[test]
    fn z_score_normalization_parses() {
        let toml = "[scoring]\nnormalization = \"z_score\"\nweights = { affordability = 25, growth = 50, demographics = 15, yield = 10 }\n";
        let cfg = PipelineConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.scoring.normalization, Normalization::ZScore);
        assert_eq!(cfg.scoring.weights, crate::scoring::WeightProfile::ZScore.weights());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            PipelineConfig::from_toml("[scoring]\nweight = 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn weights_must_sum_to_100() {
        let toml = "[scoring]\nweights = { affordability = 30, growth = 40, demographics = 20, yield = 5 }\n";
        let cfg = PipelineConfig::from_toml(toml).unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Weights(_))));
    }

    #[test]
    fn malformed_fips_and_unknown_state_fail() {
        let mut cfg = PipelineConfig::default();
        cfg.scope.counties = vec!["6A025".into()];
        assert!(matches!(cfg.validate(), Err(ConfigError::Key(_))));

        let mut cfg = PipelineConfig::default();
        cfg.scope.states = vec!["Atlantis".into()];
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Key(KeyError::UnknownState(_)))
        ));
    }

    #[test]
    fn unknown_metro_fails_scope_resolution() {
        let mut cfg = PipelineConfig::default();
        cfg.scope.metros = vec!["Gotham City".into()];
        let err = cfg
            .resolve_scope(&MetroReference::default_targets())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Scope(ReferenceError::UnknownMetro(_))
        ));
    }

    #[test]
    fn overrides_take_precedence() {
        let mut cfg = PipelineConfig::default();
        cfg.bls.api_key = Some("from-file".into());
        cfg.apply_overrides(ConfigOverrides {
            data_dir: Some("elsewhere".into()),
            weights: Some(ScoreWeights::new(25.0, 25.0, 40.0, 10.0)),
            metros: vec!["12420".into()],
            top_n: Some(3),
            force: true,
            ..Default::default()
        });
        assert_eq!(cfg.data_dir, PathBuf::from("elsewhere"));
        assert_eq!(cfg.scoring.weights.demographics, 40.0);
        assert_eq!(cfg.scope.metros, vec!["12420".to_string()]);
        assert_eq!(cfg.scope.states, vec!["CA".to_string(), "TX".to_string()]);
        assert_eq!(cfg.scoring.top_n, 3);
        assert!(cfg.download.force);
        assert_eq!(cfg.bls.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn env_key_only_fills_a_gap() {
        let mut cfg = PipelineConfig::default();
        cfg.apply_env_key(Some("env".into()));
        assert_eq!(cfg.bls.api_key.as_deref(), Some("env"));
        cfg.apply_env_key(Some("other".into()));
        assert_eq!(cfg.bls.api_key.as_deref(), Some("env"));

        let mut cfg = PipelineConfig::default();
        cfg.apply_env_key(Some("  ".into()));
        assert_eq!(cfg.bls.api_key, None);
    }
}
