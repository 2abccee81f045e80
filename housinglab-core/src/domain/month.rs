//! Monthly calendar helpers.
//!
//! All observations are keyed by the first day of their month. Lags are
//! calendar-month lookups, never row offsets.

use chrono::{Datelike, NaiveDate};

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the given year/month, if the month is valid.
pub fn month_of(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Shift a month-start date by `months` (negative = back in time).
pub fn add_months(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    let index = date.year() * 12 + date.month0() as i32 + months;
    month_of(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Whole months from `earlier` to `later` (ignores the day component).
pub fn months_between(earlier: NaiveDate, later: NaiveDate) -> i32 {
    (later.year() - earlier.year()) * 12 + later.month() as i32 - earlier.month() as i32
}

/// Parse the date spellings found in the source files and snap to month start.
///
/// Handles `YYYY-MM-DD`, `YYYY-MM`, `YYYY/MM/DD`, `MM/DD/YYYY` and `M/D/YY`.
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    const FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m/%d/%y", "%Y%m%d"];
    for fmt in FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(month_start(d));
        }
    }
    // Timestamps such as "2024-01-31 00:00:00"
    if let Some(date_part) = s.split_whitespace().next() {
        if date_part != s {
            return parse_month(date_part);
        }
    }
    let (y, m) = s.split_once('-')?;
    month_of(y.parse().ok()?, m.parse().ok()?)
}

/// Reporting period of a statistical series row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Month(u32),
    Quarter(u32),
    /// Annual averages and totals; never expanded into months.
    Annual,
}

impl Period {
    /// BLS period codes: `M01`..`M12`, `M13` (annual average), `Q01`..`Q04`, `Q05` (annual).
    pub fn parse_bls(code: &str) -> Option<Self> {
        let code = code.trim();
        let prefix = code.get(..1)?;
        let digits = code.get(1..)?;
        let n: u32 = digits.parse().ok()?;
        match (prefix, n) {
            ("M", 1..=12) => Some(Period::Month(n)),
            ("M", 13) => Some(Period::Annual),
            ("Q", 1..=4) => Some(Period::Quarter(n)),
            ("Q", 5) => Some(Period::Annual),
            ("A", _) => Some(Period::Annual),
            _ => None,
        }
    }

    /// Integer period plus an optional frequency label, as published by FHFA.
    pub fn from_frequency(frequency: Option<&str>, period: u32) -> Option<Self> {
        let freq = frequency.map(|f| f.trim().to_ascii_lowercase());
        match freq.as_deref() {
            None | Some("") | Some("monthly") | Some("m") => {
                (1..=12).contains(&period).then_some(Period::Month(period))
            }
            Some("quarterly") | Some("q") => {
                (1..=4).contains(&period).then_some(Period::Quarter(period))
            }
            Some("annual") | Some("a") => Some(Period::Annual),
            _ => None,
        }
    }

    /// Month-start dates covered by this period. Annual periods cover none.
    pub fn months(self, year: i32) -> Vec<NaiveDate> {
        match self {
            Period::Month(m) => month_of(year, m).into_iter().collect(),
            Period::Quarter(q) => {
                let first = (q - 1) * 3 + 1;
                (first..first + 3).filter_map(|m| month_of(year, m)).collect()
            }
            Period::Annual => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn parses_common_spellings() {
        assert_eq!(parse_month("2024-01-31"), Some(d(2024, 1)));
        assert_eq!(parse_month("2024-03"), Some(d(2024, 3)));
        assert_eq!(parse_month("03/15/2023"), Some(d(2023, 3)));
        assert_eq!(parse_month("2023-07-06 00:00:00"), Some(d(2023, 7)));
        assert_eq!(parse_month("RegionName"), None);
        assert_eq!(parse_month(""), None);
    }

    #[test]
    fn month_arithmetic_crosses_years() {
        assert_eq!(add_months(d(2024, 1), -1), Some(d(2023, 12)));
        assert_eq!(add_months(d(2024, 1), -12), Some(d(2023, 1)));
        assert_eq!(add_months(d(2023, 11), 3), Some(d(2024, 2)));
        assert_eq!(months_between(d(2021, 1), d(2024, 1)), 36);
    }

    #[test]
    fn quarter_expands_to_exactly_three_months() {
        let months = Period::Quarter(2).months(2023);
        assert_eq!(months, vec![d(2023, 4), d(2023, 5), d(2023, 6)]);
    }

    #[test]
    fn bls_period_codes() {
        assert_eq!(Period::parse_bls("M07"), Some(Period::Month(7)));
        assert_eq!(Period::parse_bls("M13"), Some(Period::Annual));
        assert_eq!(Period::parse_bls("Q05"), Some(Period::Annual));
        assert_eq!(Period::parse_bls("Q03"), Some(Period::Quarter(3)));
        assert_eq!(Period::parse_bls("X01"), None);
        assert!(Period::Annual.months(2023).is_empty());
    }

    #[test]
    fn fhfa_frequency_periods() {
        assert_eq!(
            Period::from_frequency(Some("quarterly"), 4),
            Some(Period::Quarter(4))
        );
        assert_eq!(Period::from_frequency(None, 11), Some(Period::Month(11)));
        assert_eq!(Period::from_frequency(Some("monthly"), 13), None);
    }
}
