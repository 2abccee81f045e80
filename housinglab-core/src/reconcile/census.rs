//! Census county population estimates and the county → CBSA crosswalk.

use super::merge::NormalizedTable;
use super::trace::SourceTrace;
use super::ReconcileError;
use crate::data::table::RawTable;
use crate::domain::keys::normalize_digits;
use crate::domain::month::month_of;
use crate::domain::{CbsaCode, CountyFips, Field};
use std::collections::{BTreeMap, BTreeSet};

/// Metropolitan divisions of the large default metros, used when the
/// crosswalk carries no division column.
const DIVISION_FALLBACK: &[(&str, &str)] = &[
    ("31084", "31080"),
    ("11244", "31080"),
    ("41884", "41860"),
    ("36084", "41860"),
    ("42034", "41860"),
    ("19124", "19100"),
    ("23104", "19100"),
];

/// County FIPS → CBSA, plus metropolitan division → parent CBSA.
#[derive(Debug, Clone, Default)]
pub struct Crosswalk {
    county_to_cbsa: BTreeMap<CountyFips, CbsaCode>,
    division_to_cbsa: BTreeMap<CbsaCode, CbsaCode>,
}

impl Crosswalk {
    /// Load from the NBER layout or any of its column aliases.
    ///
    /// Rows without a CBSA (non-metro counties) are skipped. A county listed
    /// twice keeps its first CBSA.
    pub fn from_table(table: &RawTable) -> Result<Self, ReconcileError> {
        let cbsa_col = table.require_column(&["cbsacode", "cbsa", "cbsa_code"])?;
        let state_col = table.require_column(&["fipsstatecode", "state_fips", "statefips"])?;
        let county_col = table.require_column(&["fipscountycode", "county_fips", "countyfips"])?;
        let division_col = table.find_column(&[
            "metropolitandivisioncode",
            "metro_division_code",
            "mdivcode",
        ]);

        let mut xw = Self::default();
        for row in table.rows() {
            let Some(cbsa) = row.get(cbsa_col).and_then(|c| CbsaCode::parse(c).ok()) else {
                continue;
            };
            let (Some(state), Some(county)) = (row.get(state_col), row.get(county_col)) else {
                continue;
            };
            let fips = CountyFips::new(state, county).map_err(|e| ReconcileError::MalformedKey {
                file: table.name().to_string(),
                column: "fipsstatecode/fipscountycode".to_string(),
                value: e.to_string(),
            })?;
            match xw.county_to_cbsa.get(&fips) {
                Some(existing) if existing != &cbsa => {
                    tracing::warn!(county = %fips, first = %existing, second = %cbsa, "county listed under two CBSAs; keeping first");
                }
                Some(_) => {}
                None => {
                    xw.county_to_cbsa.insert(fips, cbsa.clone());
                }
            }
            if let Some(div) = division_col
                .and_then(|c| row.get(c))
                .and_then(|d| CbsaCode::parse(d).ok())
            {
                xw.division_to_cbsa.entry(div).or_insert(cbsa);
            }
        }
        tracing::debug!(
            counties = xw.county_to_cbsa.len(),
            divisions = xw.division_to_cbsa.len(),
            "crosswalk loaded"
        );
        Ok(xw)
    }

    pub fn insert(&mut self, county: CountyFips, cbsa: CbsaCode) {
        self.county_to_cbsa.entry(county).or_insert(cbsa);
    }

    pub fn cbsa_for(&self, county: &CountyFips) -> Option<&CbsaCode> {
        self.county_to_cbsa.get(county)
    }

    /// Parent CBSA of a metropolitan division (crosswalk first, then the fallback map).
    pub fn parent_of_division(&self, division: &CbsaCode) -> Option<CbsaCode> {
        self.division_to_cbsa.get(division).cloned().or_else(|| {
            DIVISION_FALLBACK
                .iter()
                .find(|(d, _)| *d == division.as_str())
                .and_then(|(_, p)| CbsaCode::parse(p).ok())
        })
    }

    pub fn len(&self) -> usize {
        self.county_to_cbsa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.county_to_cbsa.is_empty()
    }
}

/// `POPESTIMATEyyyy` columns and their year (`POPESTIMATE042020` is not one).
pub fn estimate_columns(table: &RawTable) -> Vec<(usize, i32)> {
    table
        .headers()
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            let year = h.strip_prefix("POPESTIMATE")?;
            if year.len() != 4 {
                return None;
            }
            year.parse().ok().map(|y| (i, y))
        })
        .collect()
}

struct CountyRow {
    fips: CountyFips,
    name: Option<String>,
    estimates: Vec<(i32, f64)>,
}

/// Parse county rows, skipping state summaries (`COUNTY` 0).
fn county_rows(table: &RawTable, trace: &mut SourceTrace) -> Result<Vec<CountyRow>, ReconcileError> {
    let state_col = table.require_column(&["STATE"])?;
    let county_col = table.require_column(&["COUNTY"])?;
    let name_col = table.find_column(&["CTYNAME"]);
    let years = estimate_columns(table);
    if years.is_empty() {
        return Err(ReconcileError::MissingColumn {
            file: table.name().to_string(),
            column: "POPESTIMATEyyyy".to_string(),
        });
    }

    let mut rows = Vec::with_capacity(table.len());
    for row in table.rows() {
        let raw_state = row.get(state_col).unwrap_or_default();
        let raw_county = row.get(county_col).unwrap_or_default();
        if normalize_digits(raw_county, 3).as_deref() == Some("000") {
            trace.record_drop("state summary row");
            continue;
        }
        let fips = CountyFips::new(raw_state, raw_county).map_err(|e| ReconcileError::MalformedKey {
            file: table.name().to_string(),
            column: "STATE/COUNTY".to_string(),
            value: e.to_string(),
        })?;
        let estimates = years
            .iter()
            .filter_map(|&(col, year)| row.number(col).map(|v| (year, v)))
            .collect();
        rows.push(CountyRow {
            fips,
            name: name_col.and_then(|c| row.get(c)).map(str::to_string),
            estimates,
        });
    }
    Ok(rows)
}

/// Annual estimate applied to every month of its year.
fn push_year<K: Clone>(out: &mut NormalizedTable<K>, key: &K, year: i32, value: f64) {
    for m in 1..=12 {
        if let Some(date) = month_of(year, m) {
            out.push(key.clone(), date, Field::Population, value);
        }
    }
}

/// County population → CBSA observations (summed across a CBSA's counties by the merge).
pub fn normalize_metro_population(
    table: &RawTable,
    crosswalk: &Crosswalk,
    targets: &BTreeSet<CbsaCode>,
) -> Result<NormalizedTable<CbsaCode>, ReconcileError> {
    let mut out = NormalizedTable::new(SourceTrace::new("population_estimates", table.name()));
    out.trace.rows_in = table.len();
    let rows = county_rows(table, &mut out.trace)?;

    for row in rows {
        let Some(cbsa) = crosswalk.cbsa_for(&row.fips) else {
            out.trace.record_drop("county not in a CBSA");
            continue;
        };
        if !targets.contains(cbsa) {
            out.trace.record_drop("CBSA not targeted");
            continue;
        }
        for (year, value) in row.estimates {
            push_year(&mut out, cbsa, year, value);
        }
    }
    Ok(out.finish())
}

/// County population for one state, keyed by county.
pub fn normalize_county_population(
    table: &RawTable,
    state_fips: &str,
    counties: Option<&BTreeSet<CountyFips>>,
    names: &mut BTreeMap<CountyFips, String>,
) -> Result<NormalizedTable<CountyFips>, ReconcileError> {
    let mut out = NormalizedTable::new(SourceTrace::new("population_estimates", table.name()));
    out.trace.rows_in = table.len();
    let rows = county_rows(table, &mut out.trace)?;

    for row in rows {
        if row.fips.state() != state_fips {
            out.trace.record_drop("other state");
            continue;
        }
        if counties.is_some_and(|set| !set.contains(&row.fips)) {
            out.trace.record_drop("county not in scope");
            continue;
        }
        if let Some(name) = row.name {
            names.entry(row.fips.clone()).or_insert(name);
        }
        for (year, value) in row.estimates {
            push_year(&mut out, &row.fips, year, value);
        }
    }
    Ok(out.finish())
}
