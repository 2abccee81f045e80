//! Stage orchestration: download → verify → clean → features → score.
//!
//! Each stage takes the `PipelineConfig` explicitly, reads what the previous
//! stage left under the data directory, and returns a summary that the CLI
//! prints. Configuration is validated before any stage touches data.

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use housinglab_core::data::download::DownloadMetadata;
use housinglab_core::data::{
    default_catalog, download_datasets, fetch_metro_series, write_download_metadata,
    BlsFetchSummary, CircuitBreaker, DataLayout, DatasetSource, DownloadProgress, DownloadSummary,
    HttpSource,
};
use housinglab_core::domain::{CountyRecord, MasterRecord, MetroReference, SeriesRecord, StateInfo};
use housinglab_core::reconcile::{
    reconcile_counties, reconcile_metros, ReconcileContext, SourceTrace,
};

use crate::config::{PipelineConfig, ResolvedScope};
use crate::export::{self, ScoreReport};
use crate::features::{engineer, FeatureRecord};
use crate::scoring::{
    build_candidates, score_candidates, sensitivity, ScoreRecord, SensitivityRow,
    SkippedCandidate,
};
use crate::verify::{verify_layout, Readiness, VerificationReport};

/// Use the on-disk reference if there is one, otherwise the built-in targets.
pub fn load_reference(layout: &DataLayout) -> Result<MetroReference> {
    let path = layout.reference_path();
    if path.exists() {
        MetroReference::load(&path)
            .with_context(|| format!("failed to load metro reference {}", path.display()))
    } else {
        tracing::info!("no metro reference on disk; using built-in targets");
        Ok(MetroReference::default_targets())
    }
}

fn resolve(config: &PipelineConfig) -> Result<(DataLayout, ResolvedScope)> {
    config.validate().context("invalid configuration")?;
    let layout = config.layout();
    let reference = load_reference(&layout)?;
    let scope = config
        .resolve_scope(&reference)
        .context("invalid processing scope")?;
    Ok((layout, scope))
}

// ─── Download ───────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DownloadStageSummary {
    pub datasets: DownloadSummary,
    pub reference_written: bool,
    pub bls: Option<BlsFetchSummary>,
    /// BLS failures are logged and reported, never fatal.
    pub bls_error: Option<String>,
    pub metadata: DownloadMetadata,
}

impl fmt::Display for DownloadStageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Download summary")?;
        writeln!(f, "  downloaded:      {}", self.datasets.downloaded())?;
        writeln!(f, "  already present: {}", self.datasets.already_present())?;
        writeln!(f, "  skipped:         {}", self.datasets.skipped())?;
        writeln!(f, "  failed:          {}", self.datasets.failed())?;
        for (name, err) in self.datasets.errors() {
            writeln!(f, "    {name}: {err}")?;
        }
        if self.reference_written {
            writeln!(f, "  wrote default metro_reference.csv")?;
        }
        match (&self.bls, &self.bls_error) {
            (Some(b), _) => writeln!(
                f,
                "  BLS API: {} employment rows, {} wage rows, {} state rows, {} requests",
                b.employment_rows, b.wage_rows, b.state_rows, b.requests
            )?,
            (None, Some(e)) => writeln!(f, "  BLS API failed: {e}")?,
            (None, None) => {}
        }
        write!(
            f,
            "  on disk: {} files, {} bytes",
            self.metadata.total_files, self.metadata.total_bytes
        )
    }
}

/// Download with a live HTTP source and the BLS API.
pub fn run_download(
    config: &PipelineConfig,
    progress: &dyn DownloadProgress,
) -> Result<DownloadStageSummary> {
    config.validate().context("invalid configuration")?;
    let breaker = Arc::new(CircuitBreaker::default_hosts());
    let http = HttpSource::new(breaker, config.retry_policy()).context("HTTP client setup")?;
    download_with(config, &http, Some(&http), progress)
}

/// Download catalog datasets from `source`; fetch BLS series through `bls` if given.
pub fn download_with(
    config: &PipelineConfig,
    source: &dyn DatasetSource,
    bls: Option<&HttpSource>,
    progress: &dyn DownloadProgress,
) -> Result<DownloadStageSummary> {
    let layout = config.layout();
    layout
        .ensure_source_dirs()
        .context("failed to create data directories")?;

    let reference_written = if layout.reference_path().exists() {
        false
    } else {
        MetroReference::default_targets()
            .write_csv(&layout.reference_path())
            .context("failed to write default metro reference")?;
        tracing::info!(path = %layout.reference_path().display(), "wrote default metro reference");
        true
    };
    let (_, scope) = resolve(config)?;

    let datasets = download_datasets(
        source,
        &layout,
        &default_catalog(),
        &config.download_options(),
        progress,
    )?;

    let (bls_summary, bls_error) = match bls {
        Some(http) => {
            match fetch_metro_series(http, config.bls_api_config(), &scope.reference, &layout) {
                Ok(s) => (Some(s), None),
                Err(e) => {
                    tracing::warn!(error = %e, "BLS API fetch failed");
                    (None, Some(e.to_string()))
                }
            }
        }
        None => (None, None),
    };

    let metadata = write_download_metadata(&layout).context("failed to write download metadata")?;

    Ok(DownloadStageSummary {
        datasets,
        reference_written,
        bls: bls_summary,
        bls_error,
        metadata,
    })
}

// ─── Verify ─────────────────────────────────────────────────────────

/// Scan the data directory and write `verification_report.json`.
pub fn run_verify(config: &PipelineConfig) -> Result<VerificationReport> {
    let layout = config.layout();
    let report = verify_layout(&layout, &default_catalog());
    report.write_json(&layout.verification_report_path())?;
    Ok(report)
}

// ─── Clean ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CountyCleanSummary {
    pub state: StateInfo,
    pub rows: usize,
    pub counties: usize,
    pub traces: Vec<SourceTrace>,
}

#[derive(Debug, Clone)]
pub struct CleanSummary {
    pub master_rows: usize,
    pub metros: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub traces: Vec<SourceTrace>,
    pub counties: Vec<CountyCleanSummary>,
    pub parquet_written: bool,
}

fn write_trace_lines(f: &mut fmt::Formatter<'_>, traces: &[SourceTrace]) -> fmt::Result {
    for t in traces {
        if !t.present {
            writeln!(f, "    {:<22} absent", t.source)?;
            continue;
        }
        writeln!(
            f,
            "    {:<22} rows in {:>7}  obs out {:>8}  unmatched {:>5}  dropped {:>5}",
            t.source,
            t.rows_in,
            t.observations_out,
            t.unmatched_rows,
            t.dropped_total()
        )?;
        for (reason, n) in &t.dropped {
            writeln!(f, "      {n} dropped: {reason}")?;
        }
    }
    Ok(())
}

impl fmt::Display for CleanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Clean summary")?;
        write!(f, "  master: {} rows, {} metros", self.master_rows, self.metros)?;
        if let Some((start, end)) = self.date_range {
            write!(f, ", {start} .. {end}")?;
        }
        writeln!(f)?;
        write_trace_lines(f, &self.traces)?;
        for c in &self.counties {
            writeln!(
                f,
                "  {} counties: {} rows, {} counties",
                c.state.abbr, c.rows, c.counties
            )?;
            write_trace_lines(f, &c.traces)?;
        }
        if self.parquet_written {
            writeln!(f, "  wrote master Parquet")?;
        }
        Ok(())
    }
}

/// Reconcile every source into the master table and one county table per state.
pub fn run_clean(config: &PipelineConfig) -> Result<CleanSummary> {
    let (layout, scope) = resolve(config)?;
    layout
        .ensure_output_dirs()
        .context("failed to create processed/ directory")?;
    let ctx = ReconcileContext::new(layout.clone(), scope.reference).with_counties(scope.counties);

    let metro = reconcile_metros(&ctx).context("metro reconciliation failed")?;
    export::write_records_csv(&layout.master_path(), &metro.records)?;
    export::write_traces(&layout, &metro.traces)?;
    if config.output.parquet {
        export::write_master_parquet(&layout.master_parquet_path(), &metro.records)?;
    }
    tracing::info!(
        rows = metro.records.len(),
        metros = metro.key_count(),
        "master table written"
    );

    let mut counties = Vec::with_capacity(scope.states.len());
    for state in &scope.states {
        let result = reconcile_counties(&ctx, state)
            .with_context(|| format!("{} county reconciliation failed", state.abbr))?;
        export::write_records_csv(&layout.county_master_path(state.abbr), &result.records)?;
        let traces: Vec<SourceTrace> = result
            .traces
            .iter()
            .cloned()
            .map(|mut t| {
                t.source = format!("{}_{}", state.abbr.to_ascii_lowercase(), t.source);
                t
            })
            .collect();
        export::write_traces(&layout, &traces)?;
        counties.push(CountyCleanSummary {
            state: *state,
            rows: result.records.len(),
            counties: result.county_count(),
            traces,
        });
    }

    Ok(CleanSummary {
        master_rows: metro.records.len(),
        metros: metro.key_count(),
        date_range: metro.date_range(),
        traces: metro.traces,
        counties,
        parquet_written: config.output.parquet,
    })
}

// ─── Features ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FeatureSummary {
    pub master_rows: usize,
    pub with_yield: usize,
    pub with_yoy: usize,
    /// (state abbreviation, rows)
    pub counties: Vec<(String, usize)>,
}

impl fmt::Display for FeatureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Feature summary")?;
        writeln!(
            f,
            "  master: {} rows ({} with rental yield, {} with YoY momentum)",
            self.master_rows, self.with_yield, self.with_yoy
        )?;
        for (abbr, rows) in &self.counties {
            writeln!(f, "  {abbr} counties: {rows} rows")?;
        }
        Ok(())
    }
}

fn master_features(layout: &DataLayout) -> Result<Vec<FeatureRecord<MasterRecord>>> {
    let path = layout.master_path();
    if !path.exists() {
        bail!("{} not found; run `clean` first", path.display());
    }
    let master = export::read_master_csv(&path)?;
    Ok(engineer(&master)?)
}

fn county_features(
    layout: &DataLayout,
    state: &StateInfo,
) -> Result<Option<Vec<FeatureRecord<CountyRecord>>>> {
    let path = layout.county_master_path(state.abbr);
    if !path.exists() {
        tracing::warn!(state = state.abbr, "no county master; skipping");
        return Ok(None);
    }
    let records = export::read_county_csv(&path)?;
    Ok(Some(engineer(&records)?))
}

/// Derive features from the master and county tables.
pub fn run_features(config: &PipelineConfig) -> Result<FeatureSummary> {
    let (layout, scope) = resolve(config)?;

    let master = master_features(&layout)?;
    export::write_features_csv(&layout.features_path(), &master)?;
    let mut summary = FeatureSummary {
        master_rows: master.len(),
        with_yield: master.iter().filter(|r| r.features.rental_yield.is_some()).count(),
        with_yoy: master.iter().filter(|r| r.features.momentum_yoy.is_some()).count(),
        counties: Vec::new(),
    };

    for state in &scope.states {
        if let Some(features) = county_features(&layout, state)? {
            export::write_features_csv(&layout.county_features_path(state.abbr), &features)?;
            summary.counties.push((state.abbr.to_string(), features.len()));
        }
    }
    Ok(summary)
}

// ─── Score ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreLevel {
    Metro,
    County,
}

/// Ranked output for one scope (`metro` or `{state}_county`).
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub scope: String,
    pub records: Vec<ScoreRecord>,
    pub skipped: Vec<SkippedCandidate>,
    pub sensitivity: Vec<SensitivityRow>,
    pub top_n: usize,
}

impl fmt::Display for ScoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Scores ({}): {} ranked, {} skipped",
            self.scope,
            self.records.len(),
            self.skipped.len()
        )?;
        write!(f, "{}", export::render_top_n(&self.records, self.top_n))?;
        for s in &self.skipped {
            writeln!(f, "  skipped {} ({}): {}", s.name, s.key, s.reason)?;
        }
        Ok(())
    }
}

fn score_scope<R: SeriesRecord>(
    config: &PipelineConfig,
    layout: &DataLayout,
    scope: &str,
    features: &[FeatureRecord<R>],
) -> Result<ScoreOutcome> {
    let scoring = &config.scoring;
    let set = build_candidates(features, scoring.min_history_months);
    let records = score_candidates(&set.candidates, &scoring.weights, scoring.normalization)?;
    let rows = sensitivity(&set.candidates, scoring.normalization)?;

    export::write_scores_csv(&layout.scores_path(scope, "csv"), &records)?;
    export::write_score_report(
        &layout.scores_path(scope, "md"),
        &ScoreReport {
            scope,
            weights: &scoring.weights,
            normalization: scoring.normalization,
            records: &records,
            skipped: &set.skipped,
            sensitivity: &rows,
            top_n: scoring.top_n,
        },
    )?;
    tracing::info!(scope, ranked = records.len(), "scores written");

    Ok(ScoreOutcome {
        scope: scope.to_string(),
        records,
        skipped: set.skipped,
        sensitivity: rows,
        top_n: scoring.top_n,
    })
}

/// Rank metros and/or counties. Weights are validated before anything is read.
pub fn run_score(config: &PipelineConfig, levels: &[ScoreLevel]) -> Result<Vec<ScoreOutcome>> {
    config
        .scoring
        .weights
        .validate()
        .context("invalid score weights")?;
    let (layout, scope) = resolve(config)?;

    let mut outcomes = Vec::new();
    if levels.contains(&ScoreLevel::Metro) {
        let features = master_features(&layout)?;
        outcomes.push(score_scope(config, &layout, "metro", &features)?);
    }
    if levels.contains(&ScoreLevel::County) {
        for state in &scope.states {
            if let Some(features) = county_features(&layout, state)? {
                let name = format!("{}_county", state.abbr.to_ascii_lowercase());
                outcomes.push(score_scope(config, &layout, &name, &features)?);
            }
        }
    }
    Ok(outcomes)
}

// ─── All ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RunAllSummary {
    pub download: DownloadStageSummary,
    pub verification: VerificationReport,
    pub clean: CleanSummary,
    pub features: FeatureSummary,
    pub scores: Vec<ScoreOutcome>,
}

/// Run every stage in order. Stops after verification when no core data exists.
pub fn run_all(config: &PipelineConfig, progress: &dyn DownloadProgress) -> Result<RunAllSummary> {
    config.validate().context("invalid configuration")?;
    let download = run_download(config, progress)?;
    finish_all(config, download)
}

/// The stages after download; shared with tests that supply their own source.
pub fn finish_all(config: &PipelineConfig, download: DownloadStageSummary) -> Result<RunAllSummary> {
    let verification = run_verify(config)?;
    if verification.readiness == Readiness::NoData {
        bail!("no core datasets present under {}", verification.data_dir);
    }
    let clean = run_clean(config)?;
    let features = run_features(config)?;
    let scores = run_score(config, &[ScoreLevel::Metro, ScoreLevel::County])?;
    Ok(RunAllSummary {
        download,
        verification,
        clean,
        features,
        scores,
    })
}
