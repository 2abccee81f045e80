//! Metro reference: the authoritative list of target metros.

use super::keys::{normalize_digits, CbsaCode, KeyError};
use crate::data::table::{RawTable, TableError};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("metro reference row {row}: {source}")]
    BadCode {
        row: usize,
        #[source]
        source: KeyError,
    },

    #[error("metro reference lists CBSA {0} more than once")]
    DuplicateCode(String),

    #[error("unknown metro '{0}' (not in the metro reference)")]
    UnknownMetro(String),

    #[error("failed to write metro reference {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Coverage category of a target metro.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetroCategory {
    CaOutbound,
    TxInbound,
    Emerging,
    Other(String),
}

impl MetroCategory {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        if lower.starts_with("california") || lower == "ca" || lower.starts_with("ca-") {
            MetroCategory::CaOutbound
        } else if lower.starts_with("texas") || lower == "tx" || lower.starts_with("tx-") {
            MetroCategory::TxInbound
        } else if lower.starts_with("emerging") {
            MetroCategory::Emerging
        } else {
            MetroCategory::Other(raw.trim().to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MetroCategory::CaOutbound => "CA-outbound",
            MetroCategory::TxInbound => "TX-inbound",
            MetroCategory::Emerging => "emerging",
            MetroCategory::Other(s) => s,
        }
    }
}

impl fmt::Display for MetroCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetroEntry {
    pub metro_name: String,
    pub cbsa_code: CbsaCode,
    pub category: MetroCategory,
    /// Two-digit FIPS of the principal state, used to build BLS series IDs.
    pub state_fips: Option<String>,
    /// Exact Zillow `RegionName`, when it differs from `metro_name`.
    pub zillow_name: Option<String>,
}

/// Ordered list of target metros, unique by CBSA code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetroReference {
    entries: Vec<MetroEntry>,
}

const DEFAULT_METROS: &[(&str, &str, &str, &str, &str)] = &[
    ("Los Angeles-Long Beach-Anaheim, CA", "31080", "California Metros", "06", "Los Angeles, CA"),
    ("San Francisco-Oakland-Berkeley, CA", "41860", "California Metros", "06", "San Francisco, CA"),
    ("San Diego-Chula Vista-Carlsbad, CA", "41740", "California Metros", "06", "San Diego, CA"),
    ("San Jose-Sunnyvale-Santa Clara, CA", "41940", "California Metros", "06", "San Jose, CA"),
    ("Sacramento-Roseville-Folsom, CA", "40900", "California Metros", "06", "Sacramento, CA"),
    ("Dallas-Fort Worth-Arlington, TX", "19100", "Texas Metros", "48", "Dallas, TX"),
    ("Houston-The Woodlands-Sugar Land, TX", "26420", "Texas Metros", "48", "Houston, TX"),
    ("Austin-Round Rock-Georgetown, TX", "12420", "Texas Metros", "48", "Austin, TX"),
    ("San Antonio-New Braunfels, TX", "41700", "Texas Metros", "48", "San Antonio, TX"),
    ("Phoenix-Mesa-Chandler, AZ", "38060", "Emerging Markets", "04", "Phoenix, AZ"),
    ("Charlotte-Concord-Gastonia, NC-SC", "16740", "Emerging Markets", "37", "Charlotte, NC"),
    ("Raleigh-Cary, NC", "39580", "Emerging Markets", "37", "Raleigh, NC"),
    ("Nashville-Davidson--Murfreesboro--Franklin, TN", "34980", "Emerging Markets", "47", "Nashville, TN"),
    ("Greenville-Anderson, SC", "24860", "Emerging Markets", "45", "Greenville, SC"),
    ("Charleston-North Charleston, SC", "16700", "Emerging Markets", "45", "Charleston, SC"),
    ("Buffalo-Cheektowaga, NY", "15380", "Emerging Markets", "36", "Buffalo, NY"),
    ("Virginia Beach-Norfolk-Newport News, VA-NC", "47260", "Emerging Markets", "51", "Virginia Beach, VA"),
];

const HEADER: [&str; 5] = ["metro_name", "cbsa_code", "category", "state_fips", "zillow_name"];

impl MetroReference {
    pub fn new(entries: Vec<MetroEntry>) -> Result<Self, ReferenceError> {
        let mut seen = BTreeSet::new();
        for e in &entries {
            if !seen.insert(e.cbsa_code.clone()) {
                return Err(ReferenceError::DuplicateCode(e.cbsa_code.to_string()));
            }
        }
        Ok(Self { entries })
    }

    /// The 17 built-in target metros across the three coverage categories.
    pub fn default_targets() -> Self {
        let entries = DEFAULT_METROS
            .iter()
            .filter_map(|(name, code, category, state, zillow)| {
                Some(MetroEntry {
                    metro_name: name.to_string(),
                    cbsa_code: CbsaCode::parse(code).ok()?,
                    category: MetroCategory::parse(category),
                    state_fips: Some(state.to_string()),
                    zillow_name: Some(zillow.to_string()),
                })
            })
            .collect();
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        Self::from_table(&RawTable::from_path(path)?)
    }

    pub fn from_table(table: &RawTable) -> Result<Self, ReferenceError> {
        let name_col = table.require_column(&["metro_name", "Metro", "name"])?;
        let code_col = table.require_column(&["cbsa_code", "CBSA_Code", "cbsa"])?;
        let cat_col = table.find_column(&["category", "Category"]);
        let state_col = table.find_column(&["state_fips", "state_code"]);
        let zillow_col = table.find_column(&["zillow_name", "RegionName"]);

        let mut entries = Vec::with_capacity(table.len());
        for (i, row) in table.rows().enumerate() {
            let raw_code = row.get(code_col).unwrap_or_default();
            let cbsa_code = CbsaCode::parse(raw_code)
                .map_err(|source| ReferenceError::BadCode { row: i + 2, source })?;
            let metro_name = row
                .get(name_col)
                .map(str::to_string)
                .unwrap_or_else(|| cbsa_code.to_string());
            entries.push(MetroEntry {
                metro_name,
                cbsa_code,
                category: MetroCategory::parse(
                    cat_col.and_then(|c| row.get(c)).unwrap_or("other"),
                ),
                state_fips: state_col
                    .and_then(|c| row.get(c))
                    .and_then(|s| normalize_digits(s, 2)),
                zillow_name: zillow_col.and_then(|c| row.get(c)).map(str::to_string),
            });
        }
        Self::new(entries)
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), ReferenceError> {
        let werr = |source| ReferenceError::Write {
            path: path.display().to_string(),
            source,
        };
        let mut wtr = csv::Writer::from_path(path).map_err(werr)?;
        wtr.write_record(HEADER).map_err(werr)?;
        for e in &self.entries {
            wtr.write_record([
                e.metro_name.as_str(),
                e.cbsa_code.as_str(),
                e.category.label(),
                e.state_fips.as_deref().unwrap_or(""),
                e.zillow_name.as_deref().unwrap_or(""),
            ])
            .map_err(werr)?;
        }
        wtr.flush()
            .map_err(|e| werr(csv::Error::from(e)))?;
        Ok(())
    }

    pub fn entries(&self) -> &[MetroEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, code: &CbsaCode) -> Option<&MetroEntry> {
        self.entries.iter().find(|e| &e.cbsa_code == code)
    }

    pub fn contains(&self, code: &CbsaCode) -> bool {
        self.get(code).is_some()
    }

    pub fn codes(&self) -> BTreeSet<CbsaCode> {
        self.entries.iter().map(|e| e.cbsa_code.clone()).collect()
    }

    /// Find a metro by CBSA code, full name or Zillow name (case-insensitive).
    pub fn resolve(&self, query: &str) -> Option<&MetroEntry> {
        let q = query.trim();
        if let Ok(code) = CbsaCode::parse(q) {
            return self.get(&code);
        }
        self.entries.iter().find(|e| {
            e.metro_name.eq_ignore_ascii_case(q)
                || e.zillow_name
                    .as_deref()
                    .is_some_and(|z| z.eq_ignore_ascii_case(q))
        })
    }

    /// Subset of the reference named by `queries`, in reference order.
    ///
    /// An empty query list keeps everything. Unknown names are an error.
    pub fn restrict(&self, queries: &[String]) -> Result<Self, ReferenceError> {
        if queries.is_empty() {
            return Ok(self.clone());
        }
        let mut wanted = BTreeSet::new();
        for q in queries {
            let entry = self
                .resolve(q)
                .ok_or_else(|| ReferenceError::UnknownMetro(q.clone()))?;
            wanted.insert(entry.cbsa_code.clone());
        }
        Ok(Self {
            entries: self
                .entries
                .iter()
                .filter(|e| wanted.contains(&e.cbsa_code))
                .cloned()
                .collect(),
        })
    }
}

/// Static fallback for the principal state of well-known metros, used when a
/// reference file carries no `state_fips` column.
pub fn fallback_state_fips(code: &CbsaCode) -> Option<&'static str> {
    let state = match code.as_str() {
        "31080" | "41860" | "41740" | "41940" | "40900" => "06",
        "19100" | "26420" | "12420" | "41700" => "48",
        "38060" => "04",
        "16740" | "39580" => "37",
        "34980" => "47",
        "24860" | "16700" => "45",
        "15380" => "36",
        "47260" => "51",
        _ => return None,
    };
    Some(state)
}
