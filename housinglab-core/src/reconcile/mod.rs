//! Key reconciliation: per-source normalizers and the outer join.
//!
//! Each source module is a pure function from a loaded `RawTable` (plus the
//! reference or crosswalk) to a `NormalizedTable` of keyed observations.
//! `metro` and `county` wire them to the data layout and join the results.

pub mod bls;
pub mod census;
pub mod county;
pub mod fhfa;
pub mod freddie;
pub mod matcher;
pub mod merge;
pub mod metro;
pub mod trace;
pub mod zillow;

pub use census::Crosswalk;
pub use county::{reconcile_counties, CountyReconciliation};
pub use matcher::RegionMatcher;
pub use merge::{outer_join, NormalizedTable, Observation};
pub use metro::{reconcile_metros, MetroReconciliation};
pub use trace::SourceTrace;

use crate::data::layout::DataLayout;
use crate::data::table::{RawTable, TableError};
use crate::domain::{CountyFips, KeyError, MetroReference, ReferenceError, StateInfo};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{file}: missing expected column '{column}'")]
    MissingColumn { file: String, column: String },

    #[error("{file}: malformed key in '{column}': {value}")]
    MalformedKey {
        file: String,
        column: String,
        value: String,
    },

    #[error("field '{field}' supplied by both '{first}' and '{second}'")]
    FieldConflict {
        field: &'static str,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Table(TableError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

impl From<TableError> for ReconcileError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::MissingColumn { file, column } => {
                ReconcileError::MissingColumn { file, column }
            }
            other => ReconcileError::Table(other),
        }
    }
}

/// Everything a reconciliation run needs; passed explicitly to each stage.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    pub layout: DataLayout,
    /// Target metros (already restricted to the configured scope).
    pub reference: MetroReference,
    /// Target counties, scoped per state: a state with none of these
    /// counties listed keeps all of its counties.
    pub counties: BTreeSet<CountyFips>,
}

impl ReconcileContext {
    pub fn new(layout: DataLayout, reference: MetroReference) -> Self {
        Self {
            layout,
            reference,
            counties: BTreeSet::new(),
        }
    }

    pub fn with_counties(mut self, counties: BTreeSet<CountyFips>) -> Self {
        self.counties = counties;
        self
    }

    /// Listed counties that belong to `state`, or `None` for no filter.
    pub fn county_filter(&self, state: &StateInfo) -> Option<BTreeSet<CountyFips>> {
        if self.counties.is_empty() {
            return None;
        }
        let in_state: BTreeSet<CountyFips> = self
            .counties
            .iter()
            .filter(|c| c.state() == state.fips)
            .cloned()
            .collect();
        if in_state.is_empty() {
            tracing::warn!(
                state = state.abbr,
                listed = self.counties.len(),
                "no listed county is in this state; keeping all of its counties"
            );
            return None;
        }
        Some(in_state)
    }
}

/// Load a source file if it exists. Absent files are not an error.
pub fn load_optional(path: &Path) -> Result<Option<RawTable>, ReconcileError> {
    if !path.exists() {
        tracing::warn!(file = %path.display(), "source file not found; skipping");
        return Ok(None);
    }
    let table = RawTable::from_path(path)?;
    tracing::debug!(file = %path.display(), rows = table.len(), "loaded");
    Ok(Some(table))
}
