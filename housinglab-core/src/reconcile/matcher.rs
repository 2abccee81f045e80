//! Zillow `RegionName` → CBSA resolution.
//!
//! 1. Case-insensitive exact match on the reference's `zillow_name` or `metro_name`.
//! 2. Otherwise Zillow's `"City, ST"` must match the first principal city and
//!    first state of exactly one reference metro.

use crate::domain::{CbsaCode, MetroReference};
use std::collections::HashMap;

pub struct RegionMatcher {
    exact: HashMap<String, CbsaCode>,
    by_city_state: HashMap<(String, String), Vec<CbsaCode>>,
}

/// `"Nashville-Davidson--Murfreesboro--Franklin, TN"` → `("nashville", "tn")`.
fn principal_city_state(metro_name: &str) -> Option<(String, String)> {
    let (cities, states) = metro_name.rsplit_once(',')?;
    let city = cities.split(['-', ',']).next()?.trim().to_lowercase();
    let state = states.trim().split('-').next()?.trim().to_lowercase();
    (!city.is_empty() && !state.is_empty()).then_some((city, state))
}

/// `"Austin, TX"` → `("austin", "tx")`.
fn zillow_city_state(region: &str) -> Option<(String, String)> {
    let (city, state) = region.rsplit_once(',')?;
    let city = city.trim().to_lowercase();
    let state = state.trim().to_lowercase();
    (!city.is_empty() && !state.is_empty()).then_some((city, state))
}

impl RegionMatcher {
    pub fn new(reference: &MetroReference) -> Self {
        let mut exact = HashMap::new();
        let mut by_city_state: HashMap<_, Vec<CbsaCode>> = HashMap::new();
        for e in reference.entries() {
            exact.insert(e.metro_name.trim().to_lowercase(), e.cbsa_code.clone());
            if let Some(z) = &e.zillow_name {
                exact.insert(z.trim().to_lowercase(), e.cbsa_code.clone());
            }
            if let Some(cs) = principal_city_state(&e.metro_name) {
                by_city_state.entry(cs).or_default().push(e.cbsa_code.clone());
            }
        }
        Self {
            exact,
            by_city_state,
        }
    }

    pub fn resolve(&self, region_name: &str) -> Option<CbsaCode> {
        if let Some(code) = self.exact.get(&region_name.trim().to_lowercase()) {
            return Some(code.clone());
        }
        let key = zillow_city_state(region_name)?;
        match self.by_city_state.get(&key).map(Vec::as_slice) {
            Some([only]) => Some(only.clone()),
            _ => None,
        }
    }
}
