//! Download orchestrator: fetches catalog datasets on a bounded worker pool.
//!
//! Each dataset writes to a distinct path, atomically (`.tmp` then rename),
//! followed by a `<file>.meta.json` sidecar carrying the blake3 content hash.
//! A failed dataset is reported and the batch continues.

use super::catalog::{Availability, DatasetDescriptor, SourceCategory};
use super::layout::DataLayout;
use super::provider::{DataError, DatasetSource, DownloadProgress};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub workers: usize,
    /// Re-download files that already exist.
    pub force: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            workers: 3,
            force: false,
        }
    }
}

/// Metadata sidecar written next to every downloaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadMeta {
    pub name: String,
    pub url: String,
    pub downloaded_at: chrono::NaiveDateTime,
    pub size_bytes: u64,
    pub blake3: String,
}

#[derive(Debug)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    AlreadyPresent,
    SkippedManual { url: String, destination: PathBuf },
    /// Produced by the BLS API fetch, not by a GET.
    SkippedApi,
    Failed(DataError),
}

#[derive(Debug)]
pub struct DatasetReport {
    pub name: String,
    pub category: SourceCategory,
    pub outcome: DownloadOutcome,
}

#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub reports: Vec<DatasetReport>,
}

impl DownloadSummary {
    fn count(&self, pred: impl Fn(&DownloadOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Downloaded { .. }))
    }

    pub fn already_present(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::AlreadyPresent))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                DownloadOutcome::SkippedManual { .. } | DownloadOutcome::SkippedApi
            )
        })
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Failed(_)))
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &DataError)> {
        self.reports.iter().filter_map(|r| match &r.outcome {
            DownloadOutcome::Failed(e) => Some((r.name.as_str(), e)),
            _ => None,
        })
    }
}

/// Path of the metadata sidecar for a downloaded file.
pub fn meta_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".meta.json");
    PathBuf::from(name)
}

/// Write `bytes` to `destination` via a `.tmp` sibling and rename.
pub fn write_atomic(destination: &Path, bytes: &[u8]) -> Result<(), DataError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| DataError::io(parent, e))?;
    }
    let mut tmp = destination.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|e| DataError::io(&tmp, e))?;
    fs::rename(&tmp, destination).map_err(|e| DataError::io(destination, e))
}

/// Write a downloaded body plus its sidecar.
pub fn store_dataset(
    dataset: &DatasetDescriptor,
    destination: &Path,
    bytes: &[u8],
) -> Result<DownloadMeta, DataError> {
    write_atomic(destination, bytes)?;
    let meta = DownloadMeta {
        name: dataset.name.to_string(),
        url: dataset.url.to_string(),
        downloaded_at: chrono::Local::now().naive_local(),
        size_bytes: bytes.len() as u64,
        blake3: blake3::hash(bytes).to_hex().to_string(),
    };
    let json = serde_json::to_vec_pretty(&meta)
        .map_err(|e| DataError::ResponseFormatChanged(format!("metadata serialization: {e}")))?;
    write_atomic(&meta_path(destination), &json)?;
    Ok(meta)
}

/// Download every dataset in `catalog`.
///
/// Manual datasets are skipped with a warning naming where the file belongs.
/// Existing files are kept unless `options.force` is set.
pub fn download_datasets(
    source: &dyn DatasetSource,
    layout: &DataLayout,
    catalog: &[DatasetDescriptor],
    options: &DownloadOptions,
    progress: &dyn DownloadProgress,
) -> Result<DownloadSummary, DataError> {
    layout.ensure_source_dirs()?;
    let total = catalog.len();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .build()
        .map_err(|e| DataError::Client(format!("failed to build worker pool: {e}")))?;

    let reports: Vec<DatasetReport> = pool.install(|| {
        catalog
            .par_iter()
            .enumerate()
            .map(|(i, dataset)| DatasetReport {
                name: dataset.name.to_string(),
                category: dataset.category,
                outcome: download_single(source, layout, dataset, options, progress, i, total),
            })
            .collect()
    });

    let summary = DownloadSummary { reports };
    progress.on_batch_complete(summary.downloaded(), summary.failed(), total);
    tracing::info!(
        downloaded = summary.downloaded(),
        present = summary.already_present(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "download batch complete"
    );
    Ok(summary)
}

fn download_single(
    source: &dyn DatasetSource,
    layout: &DataLayout,
    dataset: &DatasetDescriptor,
    options: &DownloadOptions,
    progress: &dyn DownloadProgress,
    index: usize,
    total: usize,
) -> DownloadOutcome {
    let destination = dataset.destination(layout);

    match dataset.availability {
        Availability::BlsApi => return DownloadOutcome::SkippedApi,
        Availability::Manual => {
            if !destination.exists() {
                tracing::warn!(
                    dataset = dataset.name,
                    url = dataset.url,
                    destination = %destination.display(),
                    "manual download required; place the file at the destination"
                );
            }
            return DownloadOutcome::SkippedManual {
                url: dataset.url.to_string(),
                destination,
            };
        }
        Availability::Direct => {}
    }

    if destination.exists() && !options.force {
        tracing::debug!(dataset = dataset.name, "already present, skipping");
        return DownloadOutcome::AlreadyPresent;
    }

    if !source.is_available(dataset) {
        let host = dataset.host().unwrap_or_default();
        tracing::warn!(dataset = dataset.name, host, "host blocked, skipping");
        return DownloadOutcome::Failed(DataError::CircuitBreakerTripped { host });
    }

    progress.on_start(dataset.name, index, total);
    let result = source
        .fetch(dataset)
        .and_then(|bytes| store_dataset(dataset, &destination, &bytes));
    let status = result.as_ref().map(|_| ()).map_err(clone_for_progress);
    progress.on_complete(dataset.name, index, total, &status);

    match result {
        Ok(meta) => {
            tracing::info!(dataset = dataset.name, bytes = meta.size_bytes, "downloaded");
            DownloadOutcome::Downloaded {
                bytes: meta.size_bytes,
            }
        }
        Err(e) => {
            tracing::warn!(dataset = dataset.name, error = %e, "download failed");
            DownloadOutcome::Failed(e)
        }
    }
}

// DataError holds io::Error and is not Clone; progress callbacks only need the message.
fn clone_for_progress(e: &DataError) -> DataError {
    DataError::Client(e.to_string())
}

/// Summary of everything currently on disk, written as `download_metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadMetadata {
    pub download_date: chrono::NaiveDateTime,
    pub total_files: usize,
    pub total_bytes: u64,
    pub categories: BTreeMap<String, CategoryStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub files: usize,
    pub bytes: u64,
}

pub fn write_download_metadata(layout: &DataLayout) -> Result<DownloadMetadata, DataError> {
    let mut categories = BTreeMap::new();
    for category in SourceCategory::ALL {
        let dir = layout.category_dir(category);
        let mut stats = CategoryStats::default();
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_data = path
                    .extension()
                    .is_some_and(|ext| ext == "csv" || ext == "txt");
                if !is_data {
                    continue;
                }
                if let Ok(md) = entry.metadata() {
                    stats.files += 1;
                    stats.bytes += md.len();
                }
            }
        }
        categories.insert(category.dir_name().to_string(), stats);
    }

    let metadata = DownloadMetadata {
        download_date: chrono::Local::now().naive_local(),
        total_files: categories.values().map(|s| s.files).sum(),
        total_bytes: categories.values().map(|s| s.bytes).sum(),
        categories,
    };
    let json = serde_json::to_vec_pretty(&metadata)
        .map_err(|e| DataError::ResponseFormatChanged(format!("metadata serialization: {e}")))?;
    write_atomic(&layout.download_metadata_path(), &json)?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::catalog::default_catalog;
    use crate::data::provider::NoProgress;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        calls: AtomicUsize,
        fail: &'static str,
    }

    impl DatasetSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        fn fetch(&self, dataset: &DatasetDescriptor) -> Result<Vec<u8>, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if dataset.name == self.fail {
                return Err(DataError::HttpStatus {
                    status: 503,
                    url: dataset.url.to_string(),
                });
            }
            Ok(format!("name,value\n{},1\n", dataset.name).into_bytes())
        }

        fn is_available(&self, _dataset: &DatasetDescriptor) -> bool {
            true
        }
    }

    #[test]
    fn failed_dataset_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let catalog = default_catalog();
        let source = FakeSource {
            calls: AtomicUsize::new(0),
            fail: "zhvi_zip",
        };
        let summary =
            download_datasets(&source, &layout, &catalog, &DownloadOptions::default(), &NoProgress)
                .unwrap();

        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.errors().next().unwrap().0, "zhvi_zip");
        assert_eq!(summary.skipped(), 6); // 3 manual + 3 BLS API
        assert_eq!(summary.downloaded(), catalog.len() - 7);
        assert!(layout.zillow_dir().join("zhvi_metro.csv").exists());
        assert!(!layout.zillow_dir().join("zhvi_zip.csv").exists());
    }

    #[test]
    fn sidecar_carries_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let dataset = crate::data::catalog::find(&default_catalog(), "zhvi_metro").unwrap();
        let dest = dataset.destination(&layout);
        store_dataset(&dataset, &dest, b"RegionName\n").unwrap();

        let meta: DownloadMeta =
            serde_json::from_slice(&fs::read(meta_path(&dest)).unwrap()).unwrap();
        assert_eq!(meta.size_bytes, 11);
        assert_eq!(meta.blake3, blake3::hash(b"RegionName\n").to_hex().to_string());
        assert!(!dest.with_extension("csv.tmp").exists());
    }

    #[test]
    fn existing_files_kept_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let catalog: Vec<_> = default_catalog()
            .into_iter()
            .filter(|d| d.name == "zori_metro")
            .collect();
        let source = FakeSource {
            calls: AtomicUsize::new(0),
            fail: "",
        };

        download_datasets(&source, &layout, &catalog, &DownloadOptions::default(), &NoProgress)
            .unwrap();
        let second =
            download_datasets(&source, &layout, &catalog, &DownloadOptions::default(), &NoProgress)
                .unwrap();
        assert_eq!(second.already_present(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let forced = DownloadOptions {
            force: true,
            ..DownloadOptions::default()
        };
        download_datasets(&source, &layout, &catalog, &forced, &NoProgress).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn metadata_counts_files_per_category() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure_source_dirs().unwrap();
        fs::write(layout.zillow_dir().join("zhvi_metro.csv"), "a\n1\n").unwrap();
        fs::write(layout.bls_dir().join("metro_wages.csv"), "b\n").unwrap();

        let meta = write_download_metadata(&layout).unwrap();
        assert_eq!(meta.total_files, 2);
        assert_eq!(meta.categories["zillow"].files, 1);
        assert_eq!(meta.total_bytes, 6);
        assert!(layout.download_metadata_path().exists());
    }
}
