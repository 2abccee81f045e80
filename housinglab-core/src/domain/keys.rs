//! Canonical geographic keys.
//!
//! Every source spells its geography differently: Census splits county FIPS
//! into two integer columns, BLS embeds the CBSA inside a series ID, pandas
//! exports leave a trailing `.0` on numeric codes. Everything is normalized
//! into the two key types below before it reaches a join.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("malformed {kind} code '{value}'")]
    Malformed { kind: &'static str, value: String },

    #[error("unknown state '{0}'")]
    UnknownState(String),
}

/// Normalize a raw numeric code to a fixed-width, zero-padded digit string.
///
/// Accepts surrounding whitespace and a trailing `.0`. Returns `None` for
/// anything that is not purely digits or is wider than `width`.
pub fn normalize_digits(raw: &str, width: usize) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if trimmed.is_empty() || trimmed.len() > width {
        return None;
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{trimmed:0>width$}"))
}

/// Five-digit Core Based Statistical Area code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CbsaCode(String);

impl CbsaCode {
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        normalize_digits(raw, 5)
            .map(Self)
            .ok_or_else(|| KeyError::Malformed {
                kind: "CBSA",
                value: raw.trim().to_string(),
            })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CbsaCode {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CbsaCode> for String {
    fn from(code: CbsaCode) -> Self {
        code.0
    }
}

impl fmt::Display for CbsaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// County identifier: 2-digit state FIPS + 3-digit county FIPS.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CountyFips {
    state: String,
    county: String,
}

impl CountyFips {
    pub fn new(state: &str, county: &str) -> Result<Self, KeyError> {
        let state_code = normalize_digits(state, 2).ok_or_else(|| KeyError::Malformed {
            kind: "state FIPS",
            value: state.trim().to_string(),
        })?;
        let county_code = normalize_digits(county, 3).ok_or_else(|| KeyError::Malformed {
            kind: "county FIPS",
            value: county.trim().to_string(),
        })?;
        Ok(Self {
            state: state_code,
            county: county_code,
        })
    }

    /// Parse a combined 5-digit code such as `06037`.
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let code = normalize_digits(raw, 5).ok_or_else(|| KeyError::Malformed {
            kind: "county FIPS",
            value: raw.trim().to_string(),
        })?;
        Ok(Self {
            state: code[..2].to_string(),
            county: code[2..].to_string(),
        })
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn county(&self) -> &str {
        &self.county
    }

    pub fn code(&self) -> String {
        format!("{}{}", self.state, self.county)
    }
}

impl fmt::Display for CountyFips {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.state, self.county)
    }
}

/// A US state or state-equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInfo {
    pub abbr: &'static str,
    pub fips: &'static str,
    pub name: &'static str,
}

const fn st(abbr: &'static str, fips: &'static str, name: &'static str) -> StateInfo {
    StateInfo { abbr, fips, name }
}

pub const STATES: &[StateInfo] = &[
    st("AL", "01", "Alabama"),
    st("AK", "02", "Alaska"),
    st("AZ", "04", "Arizona"),
    st("AR", "05", "Arkansas"),
    st("CA", "06", "California"),
    st("CO", "08", "Colorado"),
    st("CT", "09", "Connecticut"),
    st("DE", "10", "Delaware"),
    st("DC", "11", "District of Columbia"),
    st("FL", "12", "Florida"),
    st("GA", "13", "Georgia"),
    st("HI", "15", "Hawaii"),
    st("ID", "16", "Idaho"),
    st("IL", "17", "Illinois"),
    st("IN", "18", "Indiana"),
    st("IA", "19", "Iowa"),
    st("KS", "20", "Kansas"),
    st("KY", "21", "Kentucky"),
    st("LA", "22", "Louisiana"),
    st("ME", "23", "Maine"),
    st("MD", "24", "Maryland"),
    st("MA", "25", "Massachusetts"),
    st("MI", "26", "Michigan"),
    st("MN", "27", "Minnesota"),
    st("MS", "28", "Mississippi"),
    st("MO", "29", "Missouri"),
    st("MT", "30", "Montana"),
    st("NE", "31", "Nebraska"),
    st("NV", "32", "Nevada"),
    st("NH", "33", "New Hampshire"),
    st("NJ", "34", "New Jersey"),
    st("NM", "35", "New Mexico"),
    st("NY", "36", "New York"),
    st("NC", "37", "North Carolina"),
    st("ND", "38", "North Dakota"),
    st("OH", "39", "Ohio"),
    st("OK", "40", "Oklahoma"),
    st("OR", "41", "Oregon"),
    st("PA", "42", "Pennsylvania"),
    st("RI", "44", "Rhode Island"),
    st("SC", "45", "South Carolina"),
    st("SD", "46", "South Dakota"),
    st("TN", "47", "Tennessee"),
    st("TX", "48", "Texas"),
    st("UT", "49", "Utah"),
    st("VT", "50", "Vermont"),
    st("VA", "51", "Virginia"),
    st("WA", "53", "Washington"),
    st("WV", "54", "West Virginia"),
    st("WI", "55", "Wisconsin"),
    st("WY", "56", "Wyoming"),
    st("PR", "72", "Puerto Rico"),
];

/// Look up a state by postal abbreviation, FIPS code or full name (case-insensitive).
pub fn lookup_state(query: &str) -> Result<&'static StateInfo, KeyError> {
    let q = query.trim();
    let fips = normalize_digits(q, 2);
    STATES
        .iter()
        .find(|s| {
            s.abbr.eq_ignore_ascii_case(q)
                || s.name.eq_ignore_ascii_case(q)
                || fips.as_deref() == Some(s.fips)
        })
        .ok_or_else(|| KeyError::UnknownState(q.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_are_padded_and_float_suffix_dropped() {
        assert_eq!(normalize_digits("6", 2).as_deref(), Some("06"));
        assert_eq!(normalize_digits(" 12420.0 ", 5).as_deref(), Some("12420"));
        assert_eq!(normalize_digits("1242a", 5), None);
        assert_eq!(normalize_digits("123456", 5), None);
        assert_eq!(normalize_digits("", 5), None);
    }

    #[test]
    fn cbsa_parse_and_display() {
        let code = CbsaCode::parse("12420").unwrap();
        assert_eq!(code.to_string(), "12420");
        assert!(CbsaCode::parse("Austin").is_err());
    }

    #[test]
    fn county_fips_from_split_columns() {
        let fips = CountyFips::new("6", "37").unwrap();
        assert_eq!(fips.code(), "06037");
        assert_eq!(fips.state(), "06");
        assert_eq!(CountyFips::parse("48453").unwrap().county(), "453");
    }

    #[test]
    fn state_lookup_accepts_any_spelling() {
        assert_eq!(lookup_state("tx").unwrap().fips, "48");
        assert_eq!(lookup_state("California").unwrap().abbr, "CA");
        assert_eq!(lookup_state("06").unwrap().abbr, "CA");
        assert!(lookup_state("Atlantis").is_err());
    }
}
