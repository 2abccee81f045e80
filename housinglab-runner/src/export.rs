//! Output artifacts: CSV tables, JSON traces, Parquet master, score reports.
//!
//! - **CSV**: master, county and feature tables; ranked scores
//! - **JSON**: one reconciliation trace per source under `processed/debug/`
//! - **Parquet**: optional columnar copy of the master table
//! - **Markdown**: score report with full breakdown and sensitivity table

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use housinglab_core::data::DataLayout;
use housinglab_core::domain::{CountyRecord, Field, MasterRecord};
use housinglab_core::reconcile::SourceTrace;
use polars::prelude::*;

use crate::features::{FeatureRecord, Features};
use crate::scoring::{
    Metric, Normalization, ScoreRecord, ScoreWeights, SensitivityRow, SkippedCandidate,
    WeightProfile,
};

/// Master value columns, in file order.
pub const MASTER_FIELDS: [Field; 12] = [
    Field::HomeValue,
    Field::RentIndex,
    Field::Population,
    Field::Employment,
    Field::AvgWage,
    Field::Inventory,
    Field::MedianListPrice,
    Field::SalesCount,
    Field::DaysOnMarket,
    Field::PriceCutShare,
    Field::Hpi,
    Field::MortgageRate,
];

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_opt_prec(v: Option<f64>, prec: usize) -> String {
    v.map(|v| format!("{v:.prec$}")).unwrap_or_default()
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

// ─── Record CSV ─────────────────────────────────────────────────────

/// A record with a fixed CSV layout.
pub trait CsvRecord {
    fn headers() -> Vec<&'static str>;
    fn cells(&self) -> Vec<String>;
}

impl CsvRecord for MasterRecord {
    fn headers() -> Vec<&'static str> {
        let mut h = vec!["date", "cbsa_code", "metro_name", "category"];
        h.extend(MASTER_FIELDS.iter().map(|f| f.column()));
        h
    }

    fn cells(&self) -> Vec<String> {
        let mut c = vec![
            self.date.to_string(),
            self.cbsa_code.to_string(),
            self.metro_name.clone().unwrap_or_default(),
            self.category.clone().unwrap_or_default(),
        ];
        c.extend(MASTER_FIELDS.iter().map(|&f| fmt_opt(self.get(f))));
        c
    }
}

impl CsvRecord for CountyRecord {
    fn headers() -> Vec<&'static str> {
        vec![
            "date",
            "fips",
            "state_fips",
            "county_fips",
            "county_name",
            "home_value",
            "rent_index",
            "population",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.date.to_string(),
            self.fips.clone(),
            self.state_fips.clone(),
            self.county_fips.clone(),
            self.county_name.clone().unwrap_or_default(),
            fmt_opt(self.home_value),
            fmt_opt(self.rent_index),
            fmt_opt(self.population),
        ]
    }
}

/// Render records as CSV.
pub fn export_records_csv<R: CsvRecord>(records: &[R]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(R::headers())?;
    for r in records {
        wtr.write_record(r.cells())?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Render feature records: record columns followed by feature columns.
pub fn export_features_csv<R: CsvRecord>(records: &[FeatureRecord<R>]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let mut headers = R::headers();
    headers.extend(Features::COLUMNS);
    wtr.write_record(&headers)?;
    for r in records {
        let mut cells = r.record.cells();
        cells.extend(r.features.values().iter().map(|&v| fmt_opt(v)));
        wtr.write_record(&cells)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn write_records_csv<R: CsvRecord>(path: &Path, records: &[R]) -> Result<()> {
    write_text(path, &export_records_csv(records)?)
}

pub fn write_features_csv<R: CsvRecord>(path: &Path, records: &[FeatureRecord<R>]) -> Result<()> {
    write_text(path, &export_features_csv(records)?)
}

fn read_csv<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("{}: bad row {}", path.display(), i + 2)))
        .collect()
}

/// Read a master table written by [`write_records_csv`].
pub fn read_master_csv(path: &Path) -> Result<Vec<MasterRecord>> {
    read_csv(path)
}

/// Read a county master table written by [`write_records_csv`].
pub fn read_county_csv(path: &Path) -> Result<Vec<CountyRecord>> {
    read_csv(path)
}

// ─── Traces ─────────────────────────────────────────────────────────

/// Write one `{source}_trace.json` per source; returns how many were written.
pub fn write_traces(layout: &DataLayout, traces: &[SourceTrace]) -> Result<usize> {
    for trace in traces {
        let json = serde_json::to_string_pretty(trace)
            .with_context(|| format!("failed to serialize trace for {}", trace.source))?;
        write_text(&layout.trace_path(&trace.source), &json)?;
    }
    Ok(traces.len())
}

// ─── Parquet ────────────────────────────────────────────────────────

fn master_dataframe(records: &[MasterRecord]) -> Result<DataFrame> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).context("epoch date")?;
    let dates: Vec<i32> = records
        .iter()
        .map(|r| (r.date - epoch).num_days() as i32)
        .collect();
    let codes: Vec<String> = records.iter().map(|r| r.cbsa_code.to_string()).collect();
    let names: Vec<Option<String>> = records.iter().map(|r| r.metro_name.clone()).collect();
    let categories: Vec<Option<String>> = records.iter().map(|r| r.category.clone()).collect();

    let mut columns = vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .context("date cast")?,
        Column::new("cbsa_code".into(), codes),
        Column::new("metro_name".into(), names),
        Column::new("category".into(), categories),
    ];
    for field in MASTER_FIELDS {
        let values: Vec<Option<f64>> = records.iter().map(|r| r.get(field)).collect();
        columns.push(Column::new(field.column().into(), values));
    }
    DataFrame::new(columns).context("dataframe creation")
}

pub fn write_master_parquet(path: &Path, records: &[MasterRecord]) -> Result<()> {
    let mut df = master_dataframe(records)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .with_context(|| format!("failed to write parquet {}", path.display()))?;
    Ok(())
}

// ─── Scores ─────────────────────────────────────────────────────────

/// Ranked scores with raw metrics, sub-scores and contributions.
pub fn export_scores_csv(records: &[ScoreRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut headers = vec![
        "rank".to_string(),
        "key".to_string(),
        "name".to_string(),
        "latest_date".to_string(),
        "price".to_string(),
        "yoy_pct".to_string(),
        "cagr_3y_pct".to_string(),
        "pop_growth_pct".to_string(),
        "yield_pct".to_string(),
        "yield_estimated".to_string(),
    ];
    for suffix in ["raw", "score", "contribution"] {
        headers.extend(Metric::ALL.iter().map(|m| format!("{}_{suffix}", m.label())));
    }
    headers.push("total".to_string());
    headers.push("missing".to_string());
    wtr.write_record(&headers)?;

    for r in records {
        let c = &r.candidate;
        let mut row = vec![
            r.rank.to_string(),
            c.key.clone(),
            c.name.clone(),
            c.latest_date.to_string(),
            format!("{:.0}", c.price),
            fmt_opt_prec(c.yoy_pct, 4),
            fmt_opt_prec(c.cagr_3y_pct, 4),
            fmt_opt_prec(c.pop_growth_pct, 4),
            fmt_opt_prec(c.yield_pct, 4),
            c.yield_estimated.to_string(),
        ];
        row.extend(Metric::ALL.iter().map(|&m| fmt_opt_prec(r.raw.get(m), 4)));
        row.extend(Metric::ALL.iter().map(|&m| format!("{:.4}", r.sub_scores.get(m))));
        row.extend(Metric::ALL.iter().map(|&m| format!("{:.4}", r.contributions.get(m))));
        row.push(format!("{:.4}", r.total));
        row.push(r.missing_labels());
        wtr.write_record(&row)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn write_scores_csv(path: &Path, records: &[ScoreRecord]) -> Result<()> {
    write_text(path, &export_scores_csv(records)?)
}

/// Everything the Markdown score report shows.
pub struct ScoreReport<'a> {
    pub scope: &'a str,
    pub weights: &'a ScoreWeights,
    pub normalization: Normalization,
    pub records: &'a [ScoreRecord],
    pub skipped: &'a [SkippedCandidate],
    pub sensitivity: &'a [SensitivityRow],
    pub top_n: usize,
}

/// Top-N table with the full per-metric breakdown.
pub fn render_top_n(records: &[ScoreRecord], top_n: usize) -> String {
    let mut md = String::with_capacity(1024);
    md.push_str(
        "| Rank | Name | Price | Afford. | Growth | Demo. | Yield | Total | Missing |\n",
    );
    md.push_str("| ---: | --- | ---: | ---: | ---: | ---: | ---: | ---: | --- |\n");
    for r in records.iter().take(top_n) {
        let yield_mark = if r.candidate.yield_estimated { "*" } else { "" };
        md.push_str(&format!(
            "| {} | {} | ${:.0} | {:.1} ({:.1}) | {:.1} ({:.1}) | {:.1} ({:.1}) | {:.1}{} ({:.1}) | {:.2} | {} |\n",
            r.rank,
            r.candidate.name,
            r.candidate.price,
            r.sub_scores.affordability,
            r.contributions.affordability,
            r.sub_scores.growth,
            r.contributions.growth,
            r.sub_scores.demographics,
            r.contributions.demographics,
            r.sub_scores.yield_,
            yield_mark,
            r.contributions.yield_,
            r.total,
            r.missing_labels(),
        ));
    }
    md
}

pub fn generate_score_report(report: &ScoreReport<'_>) -> String {
    let mut md = String::with_capacity(4096);

    md.push_str(&format!("# Investment Scores: {}\n\n", report.scope));

    md.push_str("## Method\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Weights (afford/growth/demo/yield) | {} |\n",
        report.weights
    ));
    md.push_str(&format!(
        "| Normalization | {} |\n",
        report.normalization.label()
    ));
    md.push_str(&format!("| Candidates | {} |\n", report.records.len()));
    md.push_str(&format!("| Skipped | {} |\n", report.skipped.len()));
    md.push('\n');

    md.push_str(&format!(
        "## Top {}\n\n",
        report.top_n.min(report.records.len())
    ));
    md.push_str("Sub-score (weighted contribution). `*` = yield estimated from price tier.\n\n");
    md.push_str(&render_top_n(report.records, report.top_n));
    md.push('\n');

    if !report.sensitivity.is_empty() {
        md.push_str("## Sensitivity\n\n");
        md.push_str("| Name |");
        for p in WeightProfile::ALL {
            md.push_str(&format!(" {} |", p.name()));
        }
        md.push_str(" Best | Worst |\n| --- |");
        for _ in WeightProfile::ALL {
            md.push_str(" ---: |");
        }
        md.push_str(" ---: | ---: |\n");
        for row in report.sensitivity.iter().take(report.top_n) {
            md.push_str(&format!("| {} |", row.name));
            for p in WeightProfile::ALL {
                let rank = row.rank_under(p).map_or("-".to_string(), |r| r.to_string());
                md.push_str(&format!(" {rank} |"));
            }
            md.push_str(&format!(" {} | {} |\n", row.best_rank(), row.worst_rank()));
        }
        md.push('\n');
    }

    if !report.skipped.is_empty() {
        md.push_str("## Skipped\n\n");
        for s in report.skipped {
            md.push_str(&format!("- {} ({}): {}\n", s.name, s.key, s.reason));
        }
        md.push('\n');
    }

    md
}

pub fn write_score_report(path: &Path, report: &ScoreReport<'_>) -> Result<()> {
    write_text(path, &generate_score_report(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::engineer;
    use crate::scoring::{score_candidates, Candidate};
    use housinglab_core::domain::{CbsaCode, CountyFips};

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn master() -> Vec<MasterRecord> {
        let mut a = MasterRecord::new(d(2024, 1), CbsaCode::parse("12420").unwrap());
        a.metro_name = Some("Austin-Round Rock-Georgetown, TX".into());
        a.category = Some("TX-inbound".into());
        a.home_value = Some(535_000.5);
        a.mortgage_rate = Some(6.64);
        let b = MasterRecord::new(d(2024, 2), CbsaCode::parse("01234").unwrap());
        vec![a, b]
    }

    #[test]
    fn master_csv_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.csv");
        let records = master();
        write_records_csv(&path, &records).unwrap();
        let back = read_master_csv(&path).unwrap();
        assert_eq!(back, records);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "date,cbsa_code,metro_name,category,home_value,rent_index,population,employment,avg_wage"
        ));
        assert!(text.contains("\"Austin-Round Rock-Georgetown, TX\""));
    }

    #[test]
    fn county_csv_keeps_leading_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca_county_master.csv");
        let mut r = CountyRecord::new(d(2023, 1), &CountyFips::parse("06001").unwrap());
        r.population = Some(500_000.0);
        write_records_csv(&path, &[r.clone()]).unwrap();
        let back = read_county_csv(&path).unwrap();
        assert_eq!(back, vec![r]);
        assert_eq!(back[0].state_fips, "06");
    }

    #[test]
    fn features_csv_appends_feature_columns() {
        let features = engineer(&master()).unwrap();
        let csv = export_features_csv(&features).unwrap();
        let header = csv.lines().next().unwrap();
        assert!(header.ends_with(
            "mortgage_rate,rental_yield,momentum_mom,momentum_yoy,price_cagr_3y,rent_mom,rent_yoy,inventory_yoy"
        ));
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn parquet_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.parquet");
        write_master_parquet(&path, &master()).unwrap();
        let df = ParquetReader::new(std::fs::File::open(&path).unwrap())
            .finish()
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 16);
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn traces_land_in_debug_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let traces = vec![SourceTrace::new("zhvi_metro", "zillow/zhvi_metro.csv")];
        assert_eq!(write_traces(&layout, &traces).unwrap(), 1);
        assert!(layout.trace_path("zhvi_metro").exists());
    }

    fn scored() -> Vec<ScoreRecord> {
        let c = |key: &str, name: &str, price: f64| Candidate {
            key: key.into(),
            name: name.into(),
            latest_date: d(2024, 6),
            price,
            yoy_pct: Some(3.0),
            cagr_3y_pct: Some(4.0),
            pop_growth_pct: None,
            yield_pct: Some(6.5),
            yield_estimated: true,
            history_months: 48,
        };
        score_candidates(
            &[c("12420", "Austin", 450_000.0), c("19100", "Dallas", 380_000.0)],
            &ScoreWeights::default(),
            Normalization::MinMax,
        )
        .unwrap()
    }

    #[test]
    fn scores_csv_has_breakdown_columns() {
        let csv = export_scores_csv(&scored()).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.contains("affordability_raw"));
        assert!(header.contains("yield_contribution"));
        assert!(header.ends_with("total,missing"));
        let first = lines.next().unwrap();
        assert!(first.starts_with("1,19100,Dallas"));
        assert!(first.ends_with("demographics"));
    }

    #[test]
    fn markdown_report_lists_top_n_and_skips() {
        let records = scored();
        let skipped = vec![SkippedCandidate {
            key: "41860".into(),
            name: "San Francisco".into(),
            reason: "only 12 months of home values (need 36)".into(),
        }];
        let weights = ScoreWeights::default();
        let md = generate_score_report(&ScoreReport {
            scope: "metro",
            weights: &weights,
            normalization: Normalization::MinMax,
            records: &records,
            skipped: &skipped,
            sensitivity: &[],
            top_n: 1,
        });
        assert!(md.contains("# Investment Scores: metro"));
        assert!(md.contains("30/40/20/10"));
        assert!(md.contains("| 1 | Dallas |"));
        assert!(!md.contains("| 2 | Austin |"));
        assert!(md.contains("San Francisco (41860)"));
    }
}
