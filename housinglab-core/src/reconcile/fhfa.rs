//! FHFA House Price Index (`hpi_master` layout).

use super::census::Crosswalk;
use super::merge::NormalizedTable;
use super::trace::SourceTrace;
use super::ReconcileError;
use crate::data::table::RawTable;
use crate::domain::month::Period;
use crate::domain::{CbsaCode, Field};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

struct Candidate {
    cbsa: CbsaCode,
    direct: bool,
    flavor_rank: u8,
    period: Period,
    year: i32,
    value: f64,
}

fn flavor_rank(flavor: Option<&str>) -> u8 {
    match flavor.map(|f| f.trim().to_ascii_lowercase()).as_deref() {
        Some("purchase-only") => 0,
        Some("all-transactions") => 1,
        Some(_) => 2,
        None => 3,
    }
}

/// Normalize FHFA rows into monthly HPI observations.
///
/// - only `traditional` indexes; per CBSA the best flavor wins
///   (purchase-only, then all-transactions)
/// - `index_sa`, falling back to `index_nsa`
/// - metropolitan divisions count for their parent only if the parent has no direct rows
/// - quarterly values fill their three months; monthly rows win over them
pub fn normalize(
    table: &RawTable,
    crosswalk: Option<&Crosswalk>,
    targets: &BTreeSet<CbsaCode>,
) -> Result<NormalizedTable<CbsaCode>, ReconcileError> {
    let place_col = table.require_column(&["place_id", "CBSA Code", "cbsa_code", "cbsa"])?;
    let year_col = table.require_column(&["yr", "year"])?;
    let period_col = table.require_column(&["period"])?;
    let freq_col = table.find_column(&["frequency"]);
    let type_col = table.find_column(&["hpi_type"]);
    let flavor_col = table.find_column(&["hpi_flavor"]);
    let sa_col = table.find_column(&["index_sa"]);
    let nsa_col = table.find_column(&["index_nsa"]);
    if sa_col.is_none() && nsa_col.is_none() {
        return Err(ReconcileError::MissingColumn {
            file: table.name().to_string(),
            column: "index_sa".to_string(),
        });
    }

    let fallback = Crosswalk::default();
    let crosswalk = crosswalk.unwrap_or(&fallback);
    let mut out = NormalizedTable::new(SourceTrace::new("fhfa_hpi_metro", table.name()));
    out.trace.rows_in = table.len();

    let mut candidates = Vec::new();
    for row in table.rows() {
        if let Some(t) = type_col.and_then(|c| row.get(c)) {
            if !t.eq_ignore_ascii_case("traditional") {
                out.trace.record_drop("non-traditional index");
                continue;
            }
        }
        let Some(place) = row.get(place_col).and_then(|p| CbsaCode::parse(p).ok()) else {
            out.trace.record_drop("non-metro place");
            continue;
        };
        let (cbsa, direct) = if targets.contains(&place) {
            (place, true)
        } else {
            match crosswalk.parent_of_division(&place) {
                Some(parent) if targets.contains(&parent) => (parent, false),
                _ => {
                    out.trace.unmatched(place.as_str());
                    continue;
                }
            }
        };
        let year = row.get(year_col).and_then(|y| y.parse::<i32>().ok());
        let period_num = row.get(period_col).and_then(|p| p.parse::<u32>().ok());
        let frequency = freq_col.and_then(|c| row.get(c));
        let period = period_num.and_then(|p| Period::from_frequency(frequency, p));
        let (Some(year), Some(period)) = (year, period) else {
            out.trace.record_drop("unrecognized period");
            continue;
        };
        if period == Period::Annual {
            out.trace.record_drop("annual frequency");
            continue;
        }
        let value = sa_col
            .and_then(|c| row.number(c))
            .or_else(|| nsa_col.and_then(|c| row.number(c)));
        let Some(value) = value else {
            out.trace.record_drop("missing value");
            continue;
        };
        candidates.push(Candidate {
            cbsa,
            direct,
            flavor_rank: flavor_rank(flavor_col.and_then(|c| row.get(c))),
            period,
            year,
            value,
        });
    }

    // Per CBSA: prefer direct rows over divisions, then the best flavor.
    let mut best: BTreeMap<CbsaCode, (bool, u8)> = BTreeMap::new();
    for c in &candidates {
        let rank = (!c.direct, c.flavor_rank);
        best.entry(c.cbsa.clone())
            .and_modify(|b| {
                if (!b.0, b.1) > rank {
                    *b = (c.direct, c.flavor_rank);
                }
            })
            .or_insert((c.direct, c.flavor_rank));
    }
    let kept: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| best.get(&c.cbsa) == Some(&(c.direct, c.flavor_rank)))
        .collect();
    let superseded = candidates.len() - kept.len();
    if superseded > 0 {
        out.trace
            .dropped
            .insert("superseded flavor or division".to_string(), superseded);
    }

    let monthly: BTreeSet<(CbsaCode, NaiveDate)> = kept
        .iter()
        .filter(|c| matches!(c.period, Period::Month(_)))
        .flat_map(|c| c.period.months(c.year).into_iter().map(|d| (c.cbsa.clone(), d)))
        .collect();

    for c in kept {
        let is_quarter = matches!(c.period, Period::Quarter(_));
        for date in c.period.months(c.year) {
            if is_quarter && monthly.contains(&(c.cbsa.clone(), date)) {
                out.trace.record_drop("quarter month superseded by monthly");
                continue;
            }
            out.push(c.cbsa.clone(), date, Field::Hpi, c.value);
        }
    }
    Ok(out.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "hpi_type,hpi_flavor,frequency,level,place_name,place_id,yr,period,index_nsa,index_sa\n";

    fn run(rows: &str, targets: &[&str]) -> NormalizedTable<CbsaCode> {
        let csv = format!("{HEADER}{rows}");
        let table = RawTable::from_reader("other/fhfa_hpi_metro.csv", csv.as_bytes()).unwrap();
        let targets = targets.iter().map(|t| CbsaCode::parse(t).unwrap()).collect();
        normalize(&table, None, &targets).unwrap()
    }

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn quarterly_value_fills_exactly_three_months() {
        let out = run(
            "traditional,all-transactions,quarterly,MSA,Austin,12420,2023,3,410.5,\n",
            &["12420"],
        );
        let dates: Vec<_> = out.observations.iter().map(|o| o.date).collect();
        assert_eq!(dates, vec![d(2023, 7), d(2023, 8), d(2023, 9)]);
        assert!(out.observations.iter().all(|o| o.value == 410.5));
    }

    #[test]
    fn monthly_wins_over_quarter_expansion() {
        let out = run(
            "traditional,purchase-only,quarterly,MSA,Austin,12420,2023,1,400,\n\
             traditional,purchase-only,monthly,MSA,Austin,12420,2023,2,402,401\n",
            &["12420"],
        );
        let feb: Vec<_> = out
            .observations
            .iter()
            .filter(|o| o.date == d(2023, 2))
            .map(|o| o.value)
            .collect();
        assert_eq!(feb, vec![401.0]);
        assert_eq!(out.observations.len(), 3);
    }

    #[test]
    fn purchase_only_preferred_and_sa_over_nsa() {
        let out = run(
            "traditional,all-transactions,monthly,MSA,Dallas,19100,2024,1,300,\n\
             traditional,purchase-only,monthly,MSA,Dallas,19100,2024,1,310,315\n\
             expanded-data,purchase-only,monthly,MSA,Dallas,19100,2024,1,999,\n",
            &["19100"],
        );
        assert_eq!(out.observations.len(), 1);
        assert_eq!(out.observations[0].value, 315.0);
        assert_eq!(out.trace.dropped["non-traditional index"], 1);
    }

    #[test]
    fn divisions_only_when_parent_has_no_rows() {
        let out = run(
            "traditional,all-transactions,quarterly,MSAD,Dallas-Plano,19124,2024,1,280,\n\
             traditional,all-transactions,quarterly,MSAD,Fort Worth,23104,2024,1,260,\n\
             traditional,all-transactions,quarterly,MSA,Austin,12420,2024,1,400,\n\
             traditional,all-transactions,quarterly,MSAD,Austin-part,19124,2024,2,1,\n",
            &["19100"],
        );
        let dallas: Vec<_> = out
            .observations
            .iter()
            .filter(|o| o.date == d(2024, 1))
            .collect();
        assert_eq!(dallas.len(), 2);
        assert!(dallas.iter().all(|o| o.key.as_str() == "19100"));
        assert_eq!(out.trace.unmatched_keys, 1);
    }

    #[test]
    fn state_and_national_rows_are_non_metro() {
        let out = run(
            "traditional,purchase-only,monthly,State,California,CA,2024,1,400,\n\
             traditional,purchase-only,monthly,USA or Census Division,East North Central,DV_ENC,2024,1,300,\n",
            &["12420"],
        );
        assert!(out.observations.is_empty());
        assert_eq!(out.trace.dropped["non-metro place"], 2);
    }
}
