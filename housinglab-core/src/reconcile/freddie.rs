//! Freddie Mac PMMS weekly mortgage rates.

use super::trace::SourceTrace;
use super::ReconcileError;
use crate::data::table::RawTable;
use crate::domain::month::parse_month;
use chrono::NaiveDate;
use std::collections::BTreeMap;

fn find_by(table: &RawTable, pred: impl Fn(&str) -> bool) -> Option<usize> {
    table
        .headers()
        .iter()
        .position(|h| pred(&h.to_ascii_lowercase()))
}

/// Weekly 30-year fixed rates averaged per month.
///
/// The date column is the first header mentioning `date` or `week`; the rate
/// column is `pmms30` or the first header mentioning `30`.
pub fn monthly_rates(table: &RawTable) -> Result<(BTreeMap<NaiveDate, f64>, SourceTrace), ReconcileError> {
    let missing = |column: &str| ReconcileError::MissingColumn {
        file: table.name().to_string(),
        column: column.to_string(),
    };
    let date_col = find_by(table, |h| h.contains("date") || h.contains("week"))
        .ok_or_else(|| missing("date"))?;
    let rate_col = find_by(table, |h| h == "pmms30")
        .or_else(|| find_by(table, |h| h.contains("30")))
        .ok_or_else(|| missing("pmms30"))?;

    let mut trace = SourceTrace::new("freddie_mac_rates", table.name());
    trace.rows_in = table.len();
    let mut acc: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for row in table.rows() {
        let Some(date) = row.get(date_col).and_then(parse_month) else {
            trace.record_drop("bad date");
            continue;
        };
        let Some(rate) = row.number(rate_col) else {
            trace.record_drop("missing rate");
            continue;
        };
        let slot = acc.entry(date).or_insert((0.0, 0));
        slot.0 += rate;
        slot.1 += 1;
    }
    let monthly: BTreeMap<_, _> = acc
        .into_iter()
        .map(|(d, (sum, n))| (d, sum / n as f64))
        .collect();
    trace.observations_out = monthly.len();
    trace.log_summary();
    Ok((monthly, trace))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_rates_average_per_month() {
        let csv = "date,pmms30,pmms15\n\
                   2024-01-04,6.62,5.89\n\
                   2024-01-11,6.66,5.87\n\
                   2024-02-01,6.63,5.94\n\
                   2024-02-08,,5.95\n";
        let table = RawTable::from_reader("other/freddie_mac_rates.csv", csv.as_bytes()).unwrap();
        let (rates, trace) = monthly_rates(&table).unwrap();
        let jan = rates[&NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()];
        assert!((jan - 6.64).abs() < 1e-9);
        assert_eq!(rates.len(), 2);
        assert_eq!(trace.dropped["missing rate"], 1);
    }

    #[test]
    fn alternate_headers() {
        let csv = "Week,30-Yr FRM\n01/04/2024,6.62\n";
        let table = RawTable::from_reader("rates.csv", csv.as_bytes()).unwrap();
        let (rates, _) = monthly_rates(&table).unwrap();
        assert_eq!(rates.len(), 1);
    }
}
