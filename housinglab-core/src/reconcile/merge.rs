//! Keyed observations and the outer join.
//!
//! Each normalizer emits a flat list of `(key, month, field, value)`
//! observations. Duplicates inside one source are aggregated first (sum for
//! counts, mean for levels), then sources are outer-joined on `(key, month)`.

use super::trace::SourceTrace;
use super::ReconcileError;
use crate::domain::{Aggregation, Field, FieldValues};
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Observation<K> {
    pub key: K,
    pub date: NaiveDate,
    pub field: Field,
    pub value: f64,
}

/// Output of one source normalizer.
#[derive(Debug, Clone)]
pub struct NormalizedTable<K> {
    pub observations: Vec<Observation<K>>,
    pub trace: SourceTrace,
}

impl<K> NormalizedTable<K> {
    pub fn new(trace: SourceTrace) -> Self {
        Self {
            observations: Vec::new(),
            trace,
        }
    }

    pub fn absent(source: &str, file: &str) -> Self {
        Self::new(SourceTrace::absent(source, file))
    }

    pub fn push(&mut self, key: K, date: NaiveDate, field: Field, value: f64) {
        self.observations.push(Observation {
            key,
            date,
            field,
            value,
        });
    }

    /// Seal the table: fill `observations_out` and log the trace.
    pub fn finish(mut self) -> Self {
        self.trace.observations_out = self.observations.len();
        self.trace.log_summary();
        self
    }
}

/// Joined values by `(key, month)`, ordered by key then date.
pub type JoinedTable<K> = BTreeMap<(K, NaiveDate), FieldValues>;

#[derive(Default)]
struct Accumulator {
    sum: f64,
    count: usize,
}

/// Combine duplicate observations of one source by each field's aggregation rule.
pub fn aggregate<K: Ord + Clone>(observations: &[Observation<K>]) -> JoinedTable<K> {
    let mut acc: BTreeMap<(K, NaiveDate, Field), Accumulator> = BTreeMap::new();
    for obs in observations {
        let slot = acc
            .entry((obs.key.clone(), obs.date, obs.field))
            .or_default();
        slot.sum += obs.value;
        slot.count += 1;
    }

    let mut out: JoinedTable<K> = BTreeMap::new();
    for ((key, date, field), a) in acc {
        let value = match field.aggregation() {
            Aggregation::Sum => a.sum,
            Aggregation::Mean => a.sum / a.count as f64,
        };
        out.entry((key, date)).or_default().insert(field, value);
    }
    out
}

/// Outer join of all sources on `(key, month)`.
///
/// Every key/month present in any source appears once. A field may come
/// from only one source; two sources supplying the same field is an error.
pub fn outer_join<K: Ord + Clone>(tables: &[NormalizedTable<K>]) -> Result<JoinedTable<K>, ReconcileError> {
    let mut owners: BTreeMap<Field, &str> = BTreeMap::new();
    for table in tables {
        let fields: std::collections::BTreeSet<Field> =
            table.observations.iter().map(|o| o.field).collect();
        for field in fields {
            if let Some(first) = owners.insert(field, &table.trace.source) {
                return Err(ReconcileError::FieldConflict {
                    field: field.column(),
                    first: first.to_string(),
                    second: table.trace.source.clone(),
                });
            }
        }
    }

    let mut joined: JoinedTable<K> = BTreeMap::new();
    for table in tables {
        for (k, values) in aggregate(&table.observations) {
            joined.entry(k).or_default().extend(values);
        }
    }
    Ok(joined)
}

/// Broadcast a national monthly series onto keys that already exist.
///
/// Never creates keys. Returns the number of key/months filled.
pub fn broadcast_national<K: Ord>(
    joined: &mut JoinedTable<K>,
    field: Field,
    series: &BTreeMap<NaiveDate, f64>,
) -> usize {
    let mut filled = 0;
    for ((_, date), values) in joined.iter_mut() {
        if let Some(&v) = series.get(date) {
            values.insert(field, v);
            filled += 1;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn table(source: &str, obs: &[(&str, NaiveDate, Field, f64)]) -> NormalizedTable<String> {
        let mut t = NormalizedTable::new(SourceTrace::new(source, source));
        for (k, date, field, v) in obs {
            t.push(k.to_string(), *date, *field, *v);
        }
        t
    }

    #[test]
    fn counts_sum_and_levels_average() {
        let t = table(
            "census",
            &[
                ("41860", d(2022, 1), Field::Population, 500_000.0),
                ("41860", d(2022, 1), Field::Population, 300_000.0),
                ("41860", d(2022, 1), Field::Hpi, 300.0),
                ("41860", d(2022, 1), Field::Hpi, 310.0),
            ],
        );
        let agg = aggregate(&t.observations);
        let v = &agg[&("41860".to_string(), d(2022, 1))];
        assert_eq!(v[&Field::Population], 800_000.0);
        assert_eq!(v[&Field::Hpi], 305.0);
    }

    #[test]
    fn outer_join_keeps_keys_from_every_source() {
        let zhvi = table("zhvi", &[("12420", d(2024, 1), Field::HomeValue, 450_000.0)]);
        let bls = table("bls", &[("19100", d(2024, 1), Field::Employment, 4_000.0)]);
        let joined = outer_join(&[zhvi, bls]).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(
            joined[&("12420".to_string(), d(2024, 1))].get(&Field::Employment),
            None
        );
    }

    #[test]
    fn same_field_from_two_sources_is_rejected() {
        let a = table("a", &[("1", d(2024, 1), Field::HomeValue, 1.0)]);
        let b = table("b", &[("1", d(2024, 1), Field::HomeValue, 2.0)]);
        assert!(matches!(
            outer_join(&[a, b]),
            Err(ReconcileError::FieldConflict { .. })
        ));
    }

    #[test]
    fn broadcast_never_creates_keys() {
        let zhvi = table("zhvi", &[("12420", d(2024, 1), Field::HomeValue, 1.0)]);
        let mut joined = outer_join(&[zhvi]).unwrap();
        let rates = BTreeMap::from([(d(2024, 1), 6.6), (d(2024, 2), 6.8)]);
        assert_eq!(broadcast_national(&mut joined, Field::MortgageRate, &rates), 1);
        assert_eq!(joined.len(), 1);
    }
}
