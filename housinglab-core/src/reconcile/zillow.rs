//! Zillow wide tables: one row per region, one column per date.

use super::matcher::RegionMatcher;
use super::merge::NormalizedTable;
use super::trace::SourceTrace;
use super::ReconcileError;
use crate::data::table::RawTable;
use crate::domain::month::parse_month;
use crate::domain::{CbsaCode, CountyFips, Field};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// A Zillow file and the master field it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZillowFile {
    pub source: &'static str,
    pub file_name: &'static str,
    pub field: Field,
}

const fn zf(source: &'static str, file_name: &'static str, field: Field) -> ZillowFile {
    ZillowFile {
        source,
        file_name,
        field,
    }
}

pub const METRO_FILES: &[ZillowFile] = &[
    zf("zhvi_metro", "zhvi_metro.csv", Field::HomeValue),
    zf("zori_metro", "zori_metro.csv", Field::RentIndex),
    zf("inventory_metro", "inventory_metro.csv", Field::Inventory),
    zf("median_list_price_metro", "median_list_price_metro.csv", Field::MedianListPrice),
    zf("sales_count_metro", "sales_count_metro.csv", Field::SalesCount),
    zf("days_on_market_metro", "days_on_market_metro.csv", Field::DaysOnMarket),
    zf("price_cuts_metro", "price_cuts_metro.csv", Field::PriceCutShare),
];

pub const COUNTY_FILES: &[ZillowFile] = &[
    zf("zhvi_county", "zhvi_county.csv", Field::HomeValue),
    zf("zori_county", "zori_county.csv", Field::RentIndex),
];

/// Header columns that hold observations, with their month.
///
/// A date header starts with a digit and contains `-` (`2024-01-31`).
pub fn date_columns(table: &RawTable) -> Vec<(usize, NaiveDate)> {
    table
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with(|c: char| c.is_ascii_digit()) && h.contains('-'))
        .filter_map(|(i, h)| parse_month(h).map(|d| (i, d)))
        .collect()
}

/// Month → mean of the row's cells in that month (weekly files carry several).
fn monthly_cells(
    row: &crate::data::table::Row<'_>,
    dates: &[(usize, NaiveDate)],
    trace: &mut SourceTrace,
) -> BTreeMap<NaiveDate, f64> {
    let mut acc: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for &(col, date) in dates {
        match row.get(col) {
            None => {}
            Some(raw) => match row.number(col) {
                Some(v) => {
                    let slot = acc.entry(date).or_insert((0.0, 0));
                    slot.0 += v;
                    slot.1 += 1;
                }
                None => {
                    tracing::debug!(value = raw, "non-numeric Zillow cell");
                    trace.record_drop("non-numeric value");
                }
            },
        }
    }
    acc.into_iter()
        .map(|(d, (sum, n))| (d, sum / n as f64))
        .collect()
}

/// Normalize a metro-level Zillow file.
pub fn normalize_metro(
    table: &RawTable,
    file: &ZillowFile,
    matcher: &RegionMatcher,
) -> Result<NormalizedTable<CbsaCode>, ReconcileError> {
    let region_col = table.require_column(&["RegionName"])?;
    let dates = date_columns(table);
    let mut out = NormalizedTable::new(SourceTrace::new(file.source, table.name()));
    out.trace.rows_in = table.len();
    if dates.is_empty() {
        tracing::warn!(file = table.name(), "no date columns found");
    }

    for row in table.rows() {
        let Some(region) = row.get(region_col) else {
            out.trace.record_drop("blank RegionName");
            continue;
        };
        let Some(cbsa) = matcher.resolve(region) else {
            out.trace.unmatched(region);
            continue;
        };
        for (date, value) in monthly_cells(&row, &dates, &mut out.trace) {
            out.push(cbsa.clone(), date, file.field, value);
        }
    }
    Ok(out.finish())
}

/// Normalize a county-level Zillow file for one state.
///
/// Rows are keyed on `StateCodeFIPS` + `MunicipalCodeFIPS`; region names are
/// collected into `names` but never used for matching.
pub fn normalize_county(
    table: &RawTable,
    file: &ZillowFile,
    state_fips: &str,
    counties: Option<&BTreeSet<CountyFips>>,
    names: &mut BTreeMap<CountyFips, String>,
) -> Result<NormalizedTable<CountyFips>, ReconcileError> {
    let state_col = table.require_column(&["StateCodeFIPS"])?;
    let county_col = table.require_column(&["MunicipalCodeFIPS"])?;
    let name_col = table.find_column(&["RegionName"]);
    let dates = date_columns(table);
    let mut out = NormalizedTable::new(SourceTrace::new(file.source, table.name()));
    out.trace.rows_in = table.len();

    for row in table.rows() {
        let raw_state = row.get(state_col).unwrap_or_default();
        let raw_county = row.get(county_col).unwrap_or_default();
        let key = CountyFips::new(raw_state, raw_county).map_err(|e| {
            ReconcileError::MalformedKey {
                file: table.name().to_string(),
                column: "StateCodeFIPS/MunicipalCodeFIPS".to_string(),
                value: e.to_string(),
            }
        })?;
        if key.state() != state_fips {
            out.trace.record_drop("other state");
            continue;
        }
        if counties.is_some_and(|set| !set.contains(&key)) {
            out.trace.record_drop("county not in scope");
            continue;
        }
        if let Some(name) = name_col.and_then(|c| row.get(c)) {
            names.entry(key.clone()).or_insert_with(|| name.to_string());
        }
        for (date, value) in monthly_cells(&row, &dates, &mut out.trace) {
            out.push(key.clone(), date, file.field, value);
        }
    }
    Ok(out.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MetroReference;

    fn metro_table(csv: &str) -> RawTable {
        RawTable::from_reader("zillow/zhvi_metro.csv", csv.as_bytes()).unwrap()
    }

    #[test]
    fn wide_rows_become_monthly_observations() {
        let table = metro_table(
            "RegionID,SizeRank,RegionName,RegionType,StateName,2023-01-31,2024-01-31\n\
             1,0,United States,country,,300000,310000\n\
             2,30,\"Austin, TX\",msa,TX,500000,535000\n\
             3,40,\"Dallas, TX\",msa,TX,,380000\n",
        );
        let matcher = RegionMatcher::new(&MetroReference::default_targets());
        let out = normalize_metro(&table, &METRO_FILES[0], &matcher).unwrap();

        assert_eq!(out.observations.len(), 3);
        assert_eq!(out.trace.rows_in, 3);
        assert_eq!(out.trace.unmatched_rows, 1);
        assert_eq!(out.trace.sample_unmatched, vec!["United States"]);
        let austin: Vec<_> = out
            .observations
            .iter()
            .filter(|o| o.key.as_str() == "12420")
            .map(|o| (o.date, o.value))
            .collect();
        assert_eq!(
            austin,
            vec![
                (NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), 500_000.0),
                (NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 535_000.0),
            ]
        );
    }

    #[test]
    fn weekly_cells_average_within_month() {
        let table = metro_table(
            "RegionName,2024-01-06,2024-01-13,2024-01-20,2024-01-27\n\
             \"Phoenix, AZ\",20,22,24,26\n",
        );
        let matcher = RegionMatcher::new(&MetroReference::default_targets());
        let out = normalize_metro(&table, &METRO_FILES[5], &matcher).unwrap();
        assert_eq!(out.observations.len(), 1);
        assert_eq!(out.observations[0].value, 23.0);
        assert_eq!(out.observations[0].field, Field::DaysOnMarket);
    }

    #[test]
    fn missing_region_column_is_structural() {
        let table = metro_table("Name,2024-01-31\nAustin,1\n");
        let matcher = RegionMatcher::new(&MetroReference::default_targets());
        let err = normalize_metro(&table, &METRO_FILES[0], &matcher).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::MissingColumn { ref column, .. } if column == "RegionName"
        ));
    }

    #[test]
    fn county_rows_keyed_on_fips_columns() {
        let table = RawTable::from_reader(
            "zillow/zhvi_county.csv",
            "RegionName,State,StateCodeFIPS,MunicipalCodeFIPS,2024-01-31\n\
             Los Angeles County,CA,6,37,850000\n\
             Travis County,TX,48,453,520000\n"
                .as_bytes(),
        )
        .unwrap();
        let mut names = BTreeMap::new();
        let out = normalize_county(&table, &COUNTY_FILES[0], "06", None, &mut names).unwrap();
        assert_eq!(out.observations.len(), 1);
        assert_eq!(out.observations[0].key.code(), "06037");
        assert_eq!(out.trace.dropped["other state"], 1);
        assert_eq!(names.values().next().unwrap(), "Los Angeles County");
    }
}
