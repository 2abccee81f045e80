//! County-level reconciliation for one state.

use super::census;
use super::merge::{outer_join, NormalizedTable};
use super::trace::SourceTrace;
use super::{load_optional, zillow, ReconcileContext, ReconcileError};
use crate::domain::{CountyFips, CountyRecord, StateInfo};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct CountyReconciliation {
    pub state: StateInfo,
    /// Ordered by county FIPS, then date.
    pub records: Vec<CountyRecord>,
    pub traces: Vec<SourceTrace>,
}

impl CountyReconciliation {
    pub fn county_count(&self) -> usize {
        let mut keys: Vec<&str> = self.records.iter().map(|r| r.fips.as_str()).collect();
        keys.dedup();
        keys.len()
    }
}

/// Join Zillow county values and Census population for the counties of `state`.
pub fn reconcile_counties(
    ctx: &ReconcileContext,
    state: &StateInfo,
) -> Result<CountyReconciliation, ReconcileError> {
    let layout = &ctx.layout;
    let scoped = ctx.county_filter(state);
    let filter = scoped.as_ref();
    let mut names: BTreeMap<CountyFips, String> = BTreeMap::new();
    let mut tables: Vec<NormalizedTable<CountyFips>> = Vec::new();

    for file in zillow::COUNTY_FILES {
        let path = layout.zillow_dir().join(file.file_name);
        let table = match load_optional(&path)? {
            Some(raw) => zillow::normalize_county(&raw, file, state.fips, filter, &mut names)?,
            None => NormalizedTable::absent(file.source, &path.display().to_string()).finish(),
        };
        tables.push(table);
    }

    let pop_path = layout.census_dir().join("population_estimates.csv");
    let population = match load_optional(&pop_path)? {
        Some(raw) => census::normalize_county_population(&raw, state.fips, filter, &mut names)?,
        None => {
            NormalizedTable::absent("population_estimates", &pop_path.display().to_string()).finish()
        }
    };
    tables.push(population);

    let joined = outer_join(&tables)?;
    let traces = tables.into_iter().map(|t| t.trace).collect();

    let records: Vec<CountyRecord> = joined
        .into_iter()
        .map(|((fips, date), values)| {
            let mut record = CountyRecord::new(date, &fips);
            record.county_name = names.get(&fips).cloned();
            for (&field, &value) in &values {
                record.set(field, value);
            }
            record
        })
        .collect();

    let result = CountyReconciliation {
        state: *state,
        records,
        traces,
    };
    tracing::info!(
        state = state.abbr,
        records = result.records.len(),
        counties = result.county_count(),
        "county reconciliation complete"
    );
    Ok(result)
}
