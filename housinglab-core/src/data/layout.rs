//! On-disk layout of the data directory.
//!
//! ```text
//! {data_dir}/
//!   zillow/  census/  bls/  other/
//!   metro_reference.csv
//!   download_metadata.json
//!   processed/
//!     master_housing_data.csv
//!     debug/{source}_trace.json
//! ```

use super::catalog::SourceCategory;
use super::provider::DataError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, category: SourceCategory) -> PathBuf {
        self.root.join(category.dir_name())
    }

    pub fn zillow_dir(&self) -> PathBuf {
        self.category_dir(SourceCategory::Zillow)
    }

    pub fn census_dir(&self) -> PathBuf {
        self.category_dir(SourceCategory::Census)
    }

    pub fn bls_dir(&self) -> PathBuf {
        self.category_dir(SourceCategory::Bls)
    }

    pub fn other_dir(&self) -> PathBuf {
        self.category_dir(SourceCategory::Other)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.processed_dir().join("debug")
    }

    pub fn reference_path(&self) -> PathBuf {
        self.root.join("metro_reference.csv")
    }

    pub fn download_metadata_path(&self) -> PathBuf {
        self.root.join("download_metadata.json")
    }

    pub fn master_path(&self) -> PathBuf {
        self.processed_dir().join("master_housing_data.csv")
    }

    pub fn county_master_path(&self, state_abbr: &str) -> PathBuf {
        self.processed_dir()
            .join(format!("{}_county_master.csv", state_abbr.to_ascii_lowercase()))
    }

    pub fn master_parquet_path(&self) -> PathBuf {
        self.processed_dir().join("master_housing_data.parquet")
    }

    pub fn features_path(&self) -> PathBuf {
        self.processed_dir().join("features_master.csv")
    }

    pub fn county_features_path(&self, state_abbr: &str) -> PathBuf {
        self.processed_dir()
            .join(format!("{}_county_features.csv", state_abbr.to_ascii_lowercase()))
    }

    /// `processed/scores_{scope}.{extension}`
    pub fn scores_path(&self, scope: &str, extension: &str) -> PathBuf {
        self.processed_dir()
            .join(format!("scores_{scope}.{extension}"))
    }

    pub fn verification_report_path(&self) -> PathBuf {
        self.root.join("verification_report.json")
    }

    pub fn trace_path(&self, source: &str) -> PathBuf {
        self.debug_dir().join(format!("{source}_trace.json"))
    }

    /// Create the four source directories.
    pub fn ensure_source_dirs(&self) -> Result<(), DataError> {
        for category in SourceCategory::ALL {
            let dir = self.category_dir(category);
            std::fs::create_dir_all(&dir).map_err(|e| DataError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Create `processed/` and `processed/debug/`.
    pub fn ensure_output_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.debug_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_layout() {
        let layout = DataLayout::new("housing_market_data");
        assert_eq!(
            layout.master_path(),
            PathBuf::from("housing_market_data/processed/master_housing_data.csv")
        );
        assert_eq!(
            layout.county_master_path("CA"),
            PathBuf::from("housing_market_data/processed/ca_county_master.csv")
        );
        assert_eq!(
            layout.trace_path("zhvi_metro"),
            PathBuf::from("housing_market_data/processed/debug/zhvi_metro_trace.json")
        );
        assert_eq!(
            layout.county_features_path("TX"),
            PathBuf::from("housing_market_data/processed/tx_county_features.csv")
        );
        assert_eq!(
            layout.scores_path("metro", "md"),
            PathBuf::from("housing_market_data/processed/scores_metro.md")
        );
    }

    #[test]
    fn creates_source_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure_source_dirs().unwrap();
        for category in SourceCategory::ALL {
            assert!(layout.category_dir(category).is_dir());
        }
    }
}
