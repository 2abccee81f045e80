//! Reconciled monthly records: one row per (geography, month).

use super::keys::{CbsaCode, CountyFips, KeyError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How duplicate observations of a field within one key/month are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Counts that add up across sub-areas (population, jobs, listings).
    Sum,
    /// Levels and indices that average.
    Mean,
}

/// A measured quantity that a source can contribute to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    HomeValue,
    RentIndex,
    Inventory,
    MedianListPrice,
    SalesCount,
    DaysOnMarket,
    PriceCutShare,
    Population,
    Employment,
    AvgWage,
    Hpi,
    MortgageRate,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::HomeValue,
        Field::RentIndex,
        Field::Inventory,
        Field::MedianListPrice,
        Field::SalesCount,
        Field::DaysOnMarket,
        Field::PriceCutShare,
        Field::Population,
        Field::Employment,
        Field::AvgWage,
        Field::Hpi,
        Field::MortgageRate,
    ];

    /// Column name in the master dataset.
    pub fn column(self) -> &'static str {
        match self {
            Field::HomeValue => "home_value",
            Field::RentIndex => "rent_index",
            Field::Inventory => "inventory",
            Field::MedianListPrice => "median_list_price",
            Field::SalesCount => "sales_count",
            Field::DaysOnMarket => "days_on_market",
            Field::PriceCutShare => "price_cut_share",
            Field::Population => "population",
            Field::Employment => "employment",
            Field::AvgWage => "avg_wage",
            Field::Hpi => "hpi",
            Field::MortgageRate => "mortgage_rate",
        }
    }

    pub fn aggregation(self) -> Aggregation {
        match self {
            Field::Population | Field::Employment | Field::SalesCount | Field::Inventory => {
                Aggregation::Sum
            }
            _ => Aggregation::Mean,
        }
    }
}

/// Field values collected for one key/month.
pub type FieldValues = BTreeMap<Field, f64>;

/// Read access shared by metro and county records, so feature engineering
/// and scoring work on either level.
pub trait SeriesRecord {
    /// Stable entity key (CBSA code or 5-digit county FIPS).
    fn entity_key(&self) -> String;
    fn entity_name(&self) -> Option<&str>;
    fn date(&self) -> NaiveDate;
    fn value(&self, field: Field) -> Option<f64>;
}

/// One row of the metro master dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub date: NaiveDate,
    pub cbsa_code: CbsaCode,
    pub metro_name: Option<String>,
    pub category: Option<String>,
    pub home_value: Option<f64>,
    pub rent_index: Option<f64>,
    pub population: Option<f64>,
    pub employment: Option<f64>,
    pub avg_wage: Option<f64>,
    pub inventory: Option<f64>,
    pub median_list_price: Option<f64>,
    pub sales_count: Option<f64>,
    pub days_on_market: Option<f64>,
    pub price_cut_share: Option<f64>,
    pub hpi: Option<f64>,
    pub mortgage_rate: Option<f64>,
}

impl MasterRecord {
    pub fn new(date: NaiveDate, cbsa_code: CbsaCode) -> Self {
        Self {
            date,
            cbsa_code,
            metro_name: None,
            category: None,
            home_value: None,
            rent_index: None,
            population: None,
            employment: None,
            avg_wage: None,
            inventory: None,
            median_list_price: None,
            sales_count: None,
            days_on_market: None,
            price_cut_share: None,
            hpi: None,
            mortgage_rate: None,
        }
    }

    pub fn from_values(date: NaiveDate, cbsa_code: CbsaCode, values: &FieldValues) -> Self {
        let mut record = Self::new(date, cbsa_code);
        for (&field, &value) in values {
            record.set(field, value);
        }
        record
    }

    fn slot(&mut self, field: Field) -> &mut Option<f64> {
        match field {
            Field::HomeValue => &mut self.home_value,
            Field::RentIndex => &mut self.rent_index,
            Field::Inventory => &mut self.inventory,
            Field::MedianListPrice => &mut self.median_list_price,
            Field::SalesCount => &mut self.sales_count,
            Field::DaysOnMarket => &mut self.days_on_market,
            Field::PriceCutShare => &mut self.price_cut_share,
            Field::Population => &mut self.population,
            Field::Employment => &mut self.employment,
            Field::AvgWage => &mut self.avg_wage,
            Field::Hpi => &mut self.hpi,
            Field::MortgageRate => &mut self.mortgage_rate,
        }
    }

    pub fn set(&mut self, field: Field, value: f64) {
        *self.slot(field) = Some(value);
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::HomeValue => self.home_value,
            Field::RentIndex => self.rent_index,
            Field::Inventory => self.inventory,
            Field::MedianListPrice => self.median_list_price,
            Field::SalesCount => self.sales_count,
            Field::DaysOnMarket => self.days_on_market,
            Field::PriceCutShare => self.price_cut_share,
            Field::Population => self.population,
            Field::Employment => self.employment,
            Field::AvgWage => self.avg_wage,
            Field::Hpi => self.hpi,
            Field::MortgageRate => self.mortgage_rate,
        }
    }
}

impl SeriesRecord for MasterRecord {
    fn entity_key(&self) -> String {
        self.cbsa_code.to_string()
    }

    fn entity_name(&self) -> Option<&str> {
        self.metro_name.as_deref()
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn value(&self, field: Field) -> Option<f64> {
        self.get(field)
    }
}

/// One row of a per-state county dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyRecord {
    pub date: NaiveDate,
    pub fips: String,
    pub state_fips: String,
    pub county_fips: String,
    pub county_name: Option<String>,
    pub home_value: Option<f64>,
    pub rent_index: Option<f64>,
    pub population: Option<f64>,
}

impl CountyRecord {
    pub fn new(date: NaiveDate, key: &CountyFips) -> Self {
        Self {
            date,
            fips: key.code(),
            state_fips: key.state().to_string(),
            county_fips: key.county().to_string(),
            county_name: None,
            home_value: None,
            rent_index: None,
            population: None,
        }
    }

    pub fn key(&self) -> Result<CountyFips, KeyError> {
        CountyFips::new(&self.state_fips, &self.county_fips)
    }

    /// Apply a field value; fields with no county column are ignored.
    pub fn set(&mut self, field: Field, value: f64) {
        match field {
            Field::HomeValue => self.home_value = Some(value),
            Field::RentIndex => self.rent_index = Some(value),
            Field::Population => self.population = Some(value),
            _ => {}
        }
    }
}

impl SeriesRecord for CountyRecord {
    fn entity_key(&self) -> String {
        self.fips.clone()
    }

    fn entity_name(&self) -> Option<&str> {
        self.county_name.as_deref()
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn value(&self, field: Field) -> Option<f64> {
        match field {
            Field::HomeValue => self.home_value,
            Field::RentIndex => self.rent_index,
            Field::Population => self.population,
            _ => None,
        }
    }
}
