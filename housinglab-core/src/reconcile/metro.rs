//! Metro-level reconciliation into the master dataset.

use super::census::{self, Crosswalk};
use super::matcher::RegionMatcher;
use super::merge::{broadcast_national, outer_join, NormalizedTable};
use super::trace::SourceTrace;
use super::{bls, fhfa, freddie, load_optional, zillow, ReconcileContext, ReconcileError};
use crate::domain::{CbsaCode, Field, MasterRecord};
use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct MetroReconciliation {
    /// Ordered by CBSA code, then date. (cbsa_code, date) is unique.
    pub records: Vec<MasterRecord>,
    pub traces: Vec<SourceTrace>,
}

impl MetroReconciliation {
    pub fn key_count(&self) -> usize {
        let mut keys: Vec<&CbsaCode> = self.records.iter().map(|r| &r.cbsa_code).collect();
        keys.dedup();
        keys.len()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.date).min()?;
        let max = self.records.iter().map(|r| r.date).max()?;
        Some((min, max))
    }
}

/// Normalize every metro source under the data directory and outer-join them.
///
/// Missing optional files leave their columns null. A missing expected column
/// in a present file aborts the run.
pub fn reconcile_metros(ctx: &ReconcileContext) -> Result<MetroReconciliation, ReconcileError> {
    let layout = &ctx.layout;
    let targets = ctx.reference.codes();
    let matcher = RegionMatcher::new(&ctx.reference);
    let mut tables: Vec<NormalizedTable<CbsaCode>> = Vec::new();

    for file in zillow::METRO_FILES {
        let path = layout.zillow_dir().join(file.file_name);
        let table = match load_optional(&path)? {
            Some(raw) => zillow::normalize_metro(&raw, file, &matcher)?,
            None => NormalizedTable::absent(file.source, &path.display().to_string()).finish(),
        };
        tables.push(table);
    }

    let xw_path = layout.census_dir().join("cbsa_to_county.csv");
    let crosswalk = load_optional(&xw_path)?
        .map(|raw| Crosswalk::from_table(&raw))
        .transpose()?;

    let pop_path = layout.census_dir().join("population_estimates.csv");
    let population = match (load_optional(&pop_path)?, &crosswalk) {
        (Some(raw), Some(xw)) => census::normalize_metro_population(&raw, xw, &targets)?,
        (Some(raw), None) => {
            tracing::warn!("population estimates present but no county crosswalk; population will be null");
            let mut t = NormalizedTable::new(SourceTrace::new("population_estimates", raw.name()));
            t.trace.rows_in = raw.len();
            t.trace.dropped.insert("no crosswalk".to_string(), raw.len());
            t.finish()
        }
        (None, _) => {
            NormalizedTable::absent("population_estimates", &pop_path.display().to_string()).finish()
        }
    };
    tables.push(population);

    for (source, field) in [
        ("metro_employment", Field::Employment),
        ("metro_wages", Field::AvgWage),
    ] {
        let path = layout.bls_dir().join(format!("{source}.csv"));
        let table = match load_optional(&path)? {
            Some(raw) => bls::normalize(&raw, source, field, &targets)?,
            None => NormalizedTable::absent(source, &path.display().to_string()).finish(),
        };
        tables.push(table);
    }

    let fhfa_path = layout.other_dir().join("fhfa_hpi_metro.csv");
    let hpi = match load_optional(&fhfa_path)? {
        Some(raw) => fhfa::normalize(&raw, crosswalk.as_ref(), &targets)?,
        None => NormalizedTable::absent("fhfa_hpi_metro", &fhfa_path.display().to_string()).finish(),
    };
    tables.push(hpi);

    let mut joined = outer_join(&tables)?;
    let mut traces: Vec<SourceTrace> = tables.into_iter().map(|t| t.trace).collect();

    let rates_path = layout.other_dir().join("freddie_mac_rates.csv");
    match load_optional(&rates_path)? {
        Some(raw) => {
            let (rates, mut trace) = freddie::monthly_rates(&raw)?;
            let filled = broadcast_national(&mut joined, Field::MortgageRate, &rates);
            trace.observations_out = filled;
            traces.push(trace);
        }
        None => traces.push(SourceTrace::absent(
            "freddie_mac_rates",
            &rates_path.display().to_string(),
        )),
    }

    let records: Vec<MasterRecord> = joined
        .into_iter()
        .map(|((cbsa, date), values)| {
            let mut record = MasterRecord::from_values(date, cbsa, &values);
            if let Some(entry) = ctx.reference.get(&record.cbsa_code) {
                record.metro_name = Some(entry.metro_name.clone());
                record.category = Some(entry.category.label().to_string());
            }
            record
        })
        .collect();

    let result = MetroReconciliation { records, traces };
    tracing::info!(
        records = result.records.len(),
        metros = result.key_count(),
        "metro reconciliation complete"
    );
    Ok(result)
}
