//! Domain types for HousingLab

pub mod keys;
pub mod metro;
pub mod month;
pub mod record;

pub use keys::{lookup_state, CbsaCode, CountyFips, KeyError, StateInfo, STATES};
pub use metro::{MetroCategory, MetroEntry, MetroReference, ReferenceError};
pub use month::Period;
pub use record::{Aggregation, CountyRecord, Field, FieldValues, MasterRecord, SeriesRecord};
