//! BLS long tables (`series_id, year, period, value`).

use super::merge::NormalizedTable;
use super::trace::SourceTrace;
use super::ReconcileError;
use crate::data::table::RawTable;
use crate::domain::month::Period;
use crate::domain::{CbsaCode, Field};
use std::collections::BTreeSet;

/// CBSA embedded in a BLS series ID.
///
/// CES state/metro series (`SMS`/`SMU`) carry it at characters 5..10;
/// QCEW county-cluster series (`ENUC`) carry its first four digits at 4..8.
pub fn cbsa_from_series_id(series_id: &str) -> Option<CbsaCode> {
    let id = series_id.trim();
    let digits = if id.starts_with("SMS") || id.starts_with("SMU") {
        id.get(5..10)?.to_string()
    } else if id.starts_with("ENUC") {
        format!("{}0", id.get(4..8)?)
    } else {
        return None;
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    CbsaCode::parse(&digits).ok()
}

/// Whether `series_id` is the one series a metro file should contribute for `field`.
///
/// Employment keeps only seasonally adjusted total nonfarm (`SMS`, zero
/// industry code, data type `01`). Wages keep only QCEW data type `4`
/// (average weekly wage). Everything else would be summed into the same
/// (metro, month) cell.
pub fn is_supported_series(series_id: &str, field: Field) -> bool {
    let id = series_id.trim();
    match field {
        Field::Employment => {
            id.len() >= 12
                && id.starts_with("SMS")
                && id.ends_with("01")
                && id.as_bytes()[10..id.len() - 2].iter().all(|&b| b == b'0')
        }
        Field::AvgWage => id.starts_with("ENUC") && id.as_bytes().get(8) == Some(&b'4'),
        _ => false,
    }
}

/// Normalize a BLS file into `field` observations for the target CBSAs.
///
/// Quarterly values (QCEW) are assigned to all three months of the quarter;
/// annual averages (`M13`, `Q05`) are dropped.
pub fn normalize(
    table: &RawTable,
    source: &str,
    field: Field,
    targets: &BTreeSet<CbsaCode>,
) -> Result<NormalizedTable<CbsaCode>, ReconcileError> {
    let series_col = table.require_column(&["series_id", "seriesID", "seriesid"])?;
    let year_col = table.require_column(&["year"])?;
    let period_col = table.require_column(&["period"])?;
    let value_col = table.require_column(&["value"])?;

    let mut out = NormalizedTable::new(SourceTrace::new(source, table.name()));
    out.trace.rows_in = table.len();

    for row in table.rows() {
        let series = row.get(series_col).unwrap_or_default();
        let Some(cbsa) = cbsa_from_series_id(series) else {
            out.trace.record_drop("unparseable series id");
            continue;
        };
        if !is_supported_series(series, field) {
            out.trace.record_drop("unsupported_series");
            continue;
        }
        if !targets.contains(&cbsa) {
            out.trace.unmatched(cbsa.as_str());
            continue;
        }
        let Some(year) = row.get(year_col).and_then(|y| y.parse::<i32>().ok()) else {
            out.trace.record_drop("bad year");
            continue;
        };
        let period = row.get(period_col).and_then(Period::parse_bls);
        let months = match period {
            Some(Period::Annual) => {
                out.trace.record_drop("annual average");
                continue;
            }
            Some(p) => p.months(year),
            None => {
                out.trace.record_drop("unrecognized period");
                continue;
            }
        };
        let Some(value) = row.number(value_col) else {
            out.trace.record_drop("missing value");
            continue;
        };
        for date in months {
            out.push(cbsa.clone(), date, field, value);
        }
    }
    Ok(out.finish())
}
