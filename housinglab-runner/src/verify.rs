//! Read-only verification of the data directory.
//!
//! Every catalog file plus the metro reference is checked for presence, row
//! count, size and covered date range. Core files decide the verdict:
//! - **Ready**: every core file present
//! - **Incomplete**: some core files missing
//! - **NoData**: no core file present

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use housinglab_core::data::{DataLayout, DatasetDescriptor, RawTable, SourceCategory};
use housinglab_core::domain::month::{month_of, parse_month};
use housinglab_core::domain::Period;
use housinglab_core::reconcile::{census, zillow};
use serde::{Deserialize, Serialize};

/// Zillow files with fewer monthly columns than this get a warning.
pub const MIN_ZILLOW_DATE_COLUMNS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Incomplete,
    NoData,
}

impl Readiness {
    /// Process exit code for this verdict. Only `NoData` is a failure.
    pub fn exit_code(self) -> i32 {
        match self {
            Readiness::NoData => 1,
            Readiness::Ready | Readiness::Incomplete => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Readiness::Ready => "READY",
            Readiness::Incomplete => "INCOMPLETE",
            Readiness::NoData => "NO DATA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// One expected file and what was found on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCheck {
    pub name: String,
    pub path: String,
    pub category: String,
    pub core: bool,
    pub present: bool,
    pub row_count: Option<usize>,
    pub size_bytes: Option<u64>,
    pub date_range: Option<DateRange>,
    pub warnings: Vec<String>,
    /// Set when the file exists but could not be parsed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub generated_at: chrono::NaiveDateTime,
    pub data_dir: String,
    pub readiness: Readiness,
    pub core_present: usize,
    pub core_total: usize,
    pub optional_present: usize,
    pub optional_total: usize,
    pub files: Vec<FileCheck>,
}

impl VerificationReport {
    pub fn missing_core(&self) -> impl Iterator<Item = &FileCheck> {
        self.files.iter().filter(|f| f.core && !f.present)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)
            .context("failed to serialize verification report")?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Console table: one line per file, then the verdict.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<26} {:<7} {:<5} {:>9} {:>12}  {:<23}",
            "file", "source", "core", "rows", "bytes", "date range"
        );
        let _ = writeln!(out, "{}", "-".repeat(88));
        for f in &self.files {
            let rows = f.row_count.map_or("-".to_string(), |r| r.to_string());
            let bytes = f.size_bytes.map_or("-".to_string(), |b| b.to_string());
            let range = match (&f.date_range, f.present) {
                (Some(r), _) => format!("{} .. {}", r.start, r.end),
                (None, true) => "?".to_string(),
                (None, false) => "MISSING".to_string(),
            };
            let _ = writeln!(
                out,
                "{:<26} {:<7} {:<5} {:>9} {:>12}  {:<23}",
                f.name,
                f.category,
                if f.core { "yes" } else { "" },
                rows,
                bytes,
                range
            );
            if let Some(e) = &f.error {
                let _ = writeln!(out, "    error: {e}");
            }
            for w in &f.warnings {
                let _ = writeln!(out, "    warning: {w}");
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "core files: {}/{}   optional files: {}/{}",
            self.core_present, self.core_total, self.optional_present, self.optional_total
        );
        let _ = writeln!(out, "verdict: {}", self.readiness.label());
        out
    }
}

/// Verify every dataset in `catalog` plus the metro reference.
pub fn verify_layout(layout: &DataLayout, catalog: &[DatasetDescriptor]) -> VerificationReport {
    let mut files: Vec<FileCheck> = catalog
        .iter()
        .map(|d| {
            check_file(
                d.name,
                &d.destination(layout),
                d.category.dir_name(),
                d.core,
                d.category == SourceCategory::Zillow,
            )
        })
        .collect();
    files.push(check_file(
        "metro_reference",
        &layout.reference_path(),
        "root",
        false,
        false,
    ));

    let core_total = files.iter().filter(|f| f.core).count();
    let core_present = files.iter().filter(|f| f.core && f.present).count();
    let optional_total = files.len() - core_total;
    let optional_present = files.iter().filter(|f| !f.core && f.present).count();

    let readiness = if core_total > 0 && core_present == core_total {
        Readiness::Ready
    } else if core_present == 0 {
        Readiness::NoData
    } else {
        Readiness::Incomplete
    };

    tracing::info!(
        core_present,
        core_total,
        optional_present,
        verdict = readiness.label(),
        "verification complete"
    );

    VerificationReport {
        generated_at: chrono::Local::now().naive_local(),
        data_dir: layout.root().display().to_string(),
        readiness,
        core_present,
        core_total,
        optional_present,
        optional_total,
        files,
    }
}

/// Inspect one file. Never fails; problems land in `error` / `warnings`.
pub fn check_file(name: &str, path: &Path, category: &str, core: bool, zillow_wide: bool) -> FileCheck {
    let mut check = FileCheck {
        name: name.to_string(),
        path: path.display().to_string(),
        category: category.to_string(),
        core,
        present: false,
        row_count: None,
        size_bytes: None,
        date_range: None,
        warnings: Vec::new(),
        error: None,
    };

    let Ok(metadata) = std::fs::metadata(path) else {
        tracing::debug!(file = name, "not present");
        return check;
    };
    check.present = true;
    check.size_bytes = Some(metadata.len());

    let table = match RawTable::from_path(path) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(file = name, error = %e, "unreadable");
            check.error = Some(e.to_string());
            return check;
        }
    };
    check.row_count = Some(table.len());
    check.date_range = detect_date_range(&table);

    if table.is_empty() {
        check.warnings.push("file has no data rows".into());
    }
    if zillow_wide {
        if table.find_column(&["RegionName"]).is_none() {
            check.warnings.push("missing RegionName column".into());
        }
        let n = zillow::date_columns(&table).len();
        if n < MIN_ZILLOW_DATE_COLUMNS {
            check
                .warnings
                .push(format!("only {n} date columns (expected at least {MIN_ZILLOW_DATE_COLUMNS})"));
        }
    }
    for w in &check.warnings {
        tracing::warn!(file = name, warning = %w, "verification warning");
    }
    check
}

fn span(dates: impl IntoIterator<Item = NaiveDate>) -> Option<DateRange> {
    let mut iter = dates.into_iter();
    let first = iter.next()?;
    let (start, end) = iter.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
    Some(DateRange { start, end })
}

/// Covered months, detected from whichever layout the file uses.
pub fn detect_date_range(table: &RawTable) -> Option<DateRange> {
    // Wide Zillow headers
    let wide = zillow::date_columns(table);
    if !wide.is_empty() {
        return span(wide.into_iter().map(|(_, d)| d));
    }

    // Long tables with a date or week column
    let date_col = table.headers().iter().position(|h| {
        let h = h.to_ascii_lowercase();
        h.contains("date") || h.contains("week")
    });
    if let Some(idx) = date_col {
        if let Some(range) = span(table.rows().filter_map(|r| r.get(idx).and_then(parse_month))) {
            return Some(range);
        }
    }

    // year|yr + period (BLS, FHFA)
    if let (Some(year_idx), Some(period_idx)) = (
        table.find_column(&["year", "yr"]),
        table.find_column(&["period"]),
    ) {
        let freq_idx = table.find_column(&["frequency"]);
        let dates = table.rows().flat_map(|r| {
            let year: Option<i32> = r.get(year_idx).and_then(|y| y.parse().ok());
            let period = r.get(period_idx).and_then(|p| {
                Period::parse_bls(p).or_else(|| {
                    p.parse::<u32>()
                        .ok()
                        .and_then(|n| Period::from_frequency(freq_idx.and_then(|i| r.get(i)), n))
                })
            });
            match (year, period) {
                (Some(y), Some(p)) => p.months(y),
                _ => Vec::new(),
            }
        });
        if let Some(range) = span(dates) {
            return Some(range);
        }
    }

    // Census POPESTIMATEyyyy headers
    let years: Vec<i32> = census::estimate_columns(table).into_iter().map(|(_, y)| y).collect();
    let start = years.iter().min().and_then(|&y| month_of(y, 1))?;
    let end = years.iter().max().and_then(|&y| month_of(y, 12))?;
    Some(DateRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use housinglab_core::data::default_catalog;
    use std::fs;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn table(csv: &str) -> RawTable {
        RawTable::from_reader("t.csv", csv.as_bytes()).unwrap()
    }

    #[test]
    fn wide_zillow_range() {
        let t = table("RegionName,2020-01-31,2024-06-30\nX,1,2\n");
        let r = detect_date_range(&t).unwrap();
        assert_eq!((r.start, r.end), (d(2020, 1), d(2024, 6)));
    }

    #[test]
    fn long_date_column_range() {
        let t = table("date,pmms30\n2023-03-02,6.6\n2021-01-07,2.7\n");
        let r = detect_date_range(&t).unwrap();
        assert_eq!((r.start, r.end), (d(2021, 1), d(2023, 3)));
    }

    #[test]
    fn bls_and_fhfa_periods() {
        let t = table("series_id,year,period,value\nS,2022,M03,1\nS,2023,M13,1\nS,2023,M11,1\n");
        let r = detect_date_range(&t).unwrap();
        assert_eq!((r.start, r.end), (d(2022, 3), d(2023, 11)));

        let t = table("frequency,yr,period,index_nsa\nquarterly,2023,4,1\nmonthly,2020,2,1\n");
        let r = detect_date_range(&t).unwrap();
        assert_eq!((r.start, r.end), (d(2020, 2), d(2023, 12)));
    }

    #[test]
    fn census_estimate_years() {
        let t = table("STATE,COUNTY,POPESTIMATE2020,POPESTIMATE2023\n06,001,1,2\n");
        let r = detect_date_range(&t).unwrap();
        assert_eq!((r.start, r.end), (d(2020, 1), d(2023, 12)));
    }

    #[test]
    fn zillow_structure_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("z.csv");
        fs::write(&path, "Name,2024-01-31\nX,1\n").unwrap();
        let check = check_file("z", &path, "zillow", true, true);
        assert!(check.present);
        assert_eq!(check.row_count, Some(1));
        assert_eq!(check.warnings.len(), 2);
        assert!(check.warnings[0].contains("RegionName"));
    }

    #[test]
    fn verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let catalog = default_catalog();

        let report = verify_layout(&layout, &catalog);
        assert_eq!(report.readiness, Readiness::NoData);
        assert_eq!(report.readiness.exit_code(), 1);
        assert_eq!(report.files.len(), catalog.len() + 1);

        let first_core = catalog.iter().find(|c| c.core).unwrap();
        let dest = first_core.destination(&layout);
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, "a\n1\n").unwrap();
        let report = verify_layout(&layout, &catalog);
        assert_eq!(report.readiness, Readiness::Incomplete);
        assert_eq!(report.readiness.exit_code(), 0);

        for c in catalog.iter().filter(|c| c.core) {
            let dest = c.destination(&layout);
            fs::create_dir_all(dest.parent().unwrap()).unwrap();
            fs::write(&dest, "a\n1\n").unwrap();
        }
        let report = verify_layout(&layout, &catalog);
        assert_eq!(report.readiness, Readiness::Ready);
        assert_eq!(report.missing_core().count(), 0);
        assert!(report.render().contains("READY"));
    }

    #[test]
    fn report_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let report = verify_layout(&layout, &default_catalog());
        let path = dir.path().join("verification_report.json");
        report.write_json(&path).unwrap();
        let back: VerificationReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.readiness, report.readiness);
        assert_eq!(back.files.len(), report.files.len());
    }
}
