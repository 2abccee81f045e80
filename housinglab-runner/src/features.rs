//! Feature engineering: rental yield and lag-based momentum.
//!
//! Every feature is a pure function of one entity's monthly series. Lags are
//! calendar months: the YoY base for 2025-01 is the 2024-01 observation of the
//! same key, never "the row twelve positions back". When the lagged
//! observation is absent, either value is null, or the base is zero, the
//! feature is null.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use housinglab_core::domain::month::add_months;
use housinglab_core::domain::{Field, SeriesRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Months of rent per year in the yield formula.
pub const ANNUALIZATION: f64 = 12.0;

/// Lag (months) of the price CAGR window.
pub const CAGR_LAG_MONTHS: i32 = 36;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("duplicate record for key '{key}' at {date}")]
    DuplicateKey { key: String, date: NaiveDate },
}

/// Derived metrics for one (key, month).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub rental_yield: Option<f64>,
    pub momentum_mom: Option<f64>,
    pub momentum_yoy: Option<f64>,
    pub price_cagr_3y: Option<f64>,
    pub rent_mom: Option<f64>,
    pub rent_yoy: Option<f64>,
    pub inventory_yoy: Option<f64>,
}

impl Features {
    pub const COLUMNS: [&'static str; 7] = [
        "rental_yield",
        "momentum_mom",
        "momentum_yoy",
        "price_cagr_3y",
        "rent_mom",
        "rent_yoy",
        "inventory_yoy",
    ];

    /// Values in `COLUMNS` order.
    pub fn values(&self) -> [Option<f64>; 7] {
        [
            self.rental_yield,
            self.momentum_mom,
            self.momentum_yoy,
            self.price_cagr_3y,
            self.rent_mom,
            self.rent_yoy,
            self.inventory_yoy,
        ]
    }
}

/// A master or county record extended with its features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord<R> {
    pub record: R,
    pub features: Features,
}

/// Fractional change `current / base - 1`.
pub fn pct_change(current: Option<f64>, base: Option<f64>) -> Option<f64> {
    let (current, base) = (current?, base?);
    if base == 0.0 {
        return None;
    }
    let change = current / base - 1.0;
    change.is_finite().then_some(change)
}

/// Annual gross yield `rent × 12 / price`.
pub fn rental_yield(rent: Option<f64>, price: Option<f64>) -> Option<f64> {
    let (rent, price) = (rent?, price?);
    if price <= 0.0 {
        return None;
    }
    Some(rent * ANNUALIZATION / price)
}

/// Annualized growth over `years`.
pub fn cagr(current: Option<f64>, base: Option<f64>, years: f64) -> Option<f64> {
    let (current, base) = (current?, base?);
    if base <= 0.0 || current <= 0.0 {
        return None;
    }
    let rate = (current / base).powf(1.0 / years) - 1.0;
    rate.is_finite().then_some(rate)
}

/// Compute features for every record.
///
/// Output is ordered by entity key, then date. Two records sharing a
/// (key, date) are rejected.
pub fn engineer<R: SeriesRecord + Clone>(
    records: &[R],
) -> Result<Vec<FeatureRecord<R>>, FeatureError> {
    let mut groups: BTreeMap<String, BTreeMap<NaiveDate, &R>> = BTreeMap::new();
    for record in records {
        let key = record.entity_key();
        let date = record.date();
        let series = groups.entry(key.clone()).or_default();
        if series.insert(date, record).is_some() {
            return Err(FeatureError::DuplicateKey { key, date });
        }
    }

    let mut out = Vec::with_capacity(records.len());
    for series in groups.values() {
        for (&date, &record) in series {
            let lagged = |months: i32, field: Field| -> Option<f64> {
                let base_date = add_months(date, -months)?;
                series.get(&base_date).and_then(|r| r.value(field))
            };
            let price = record.value(Field::HomeValue);
            let rent = record.value(Field::RentIndex);

            let features = Features {
                rental_yield: rental_yield(rent, price),
                momentum_mom: pct_change(price, lagged(1, Field::HomeValue)),
                momentum_yoy: pct_change(price, lagged(12, Field::HomeValue)),
                price_cagr_3y: cagr(price, lagged(CAGR_LAG_MONTHS, Field::HomeValue), 3.0),
                rent_mom: pct_change(rent, lagged(1, Field::RentIndex)),
                rent_yoy: pct_change(rent, lagged(12, Field::RentIndex)),
                inventory_yoy: pct_change(
                    record.value(Field::Inventory),
                    lagged(12, Field::Inventory),
                ),
            };
            out.push(FeatureRecord {
                record: record.clone(),
                features,
            });
        }
    }

    tracing::info!(
        records = out.len(),
        entities = groups.len(),
        "feature engineering complete"
    );
    Ok(out)
}
