//! BLS public API v2 client.
//!
//! Employment (CES, `SMS...`), average weekly wage (QCEW, `ENUC...`) and
//! state unemployment rate (LAUS, `LAUST...`) series are derived from the
//! metro reference, requested in batches, and written as long CSVs
//! (`series_id,year,period,value,footnotes`) under `bls/`.

use super::http::HttpSource;
use super::layout::DataLayout;
use super::provider::DataError;
use crate::domain::metro::{fallback_state_fips, MetroReference};
use crate::domain::CbsaCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

pub const BLS_API_URL: &str = "https://api.bls.gov/publicAPI/v2/timeseries/data/";

/// CES total nonfarm employment, seasonally adjusted.
pub fn employment_series_id(state_fips: &str, cbsa: &CbsaCode) -> String {
    format!("SMS{state_fips}{cbsa}0000000001")
}

/// QCEW average weekly wage, all industries, total covered.
pub fn wage_series_id(cbsa: &CbsaCode) -> String {
    format!("ENUC{}40510", &cbsa.as_str()[..4])
}

/// LAUS statewide unemployment rate.
pub fn state_unemployment_series_id(state_fips: &str) -> String {
    format!("LAUST{state_fips}0000000000003")
}

#[derive(Debug, Clone)]
pub struct BlsApiConfig {
    pub api_key: Option<String>,
    pub start_year: i32,
    pub end_year: i32,
}

impl BlsApiConfig {
    pub fn series_per_request(&self) -> usize {
        if self.api_key.is_some() {
            50
        } else {
            25
        }
    }

    pub fn daily_request_limit(&self) -> usize {
        if self.api_key.is_some() {
            500
        } else {
            25
        }
    }
}

#[derive(Debug, Serialize)]
struct BlsRequest<'a> {
    seriesid: &'a [String],
    startyear: String,
    endyear: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    registrationkey: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BlsResponse {
    status: String,
    #[serde(default)]
    message: Vec<String>,
    #[serde(rename = "Results", default)]
    results: Option<BlsResults>,
}

#[derive(Debug, Deserialize)]
struct BlsResults {
    #[serde(default)]
    series: Vec<BlsSeries>,
}

#[derive(Debug, Deserialize)]
struct BlsSeries {
    #[serde(rename = "seriesID")]
    series_id: String,
    #[serde(default)]
    data: Vec<BlsDatum>,
}

#[derive(Debug, Deserialize)]
struct BlsDatum {
    year: String,
    period: String,
    value: String,
    #[serde(default)]
    footnotes: Vec<serde_json::Value>,
}

/// One observation as written to the long BLS CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlsObservation {
    pub series_id: String,
    pub year: String,
    pub period: String,
    pub value: String,
    pub footnotes: String,
}

fn footnote_text(notes: &[serde_json::Value]) -> String {
    notes
        .iter()
        .filter_map(|n| n.get("text").and_then(|t| t.as_str()))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Decode an API response body into observations.
pub fn parse_response(body: &str) -> Result<Vec<BlsObservation>, DataError> {
    let resp: BlsResponse = serde_json::from_str(body)
        .map_err(|e| DataError::ResponseFormatChanged(format!("BLS response: {e}")))?;
    into_observations(resp)
}

fn into_observations(resp: BlsResponse) -> Result<Vec<BlsObservation>, DataError> {
    if resp.status != "REQUEST_SUCCEEDED" {
        let message = resp.message.join("; ");
        if message.to_ascii_lowercase().contains("threshold") {
            return Err(DataError::BudgetExhausted { limit: 0 });
        }
        return Err(DataError::ResponseFormatChanged(format!(
            "BLS status {}: {message}",
            resp.status
        )));
    }
    for m in &resp.message {
        tracing::debug!(message = %m, "BLS API notice");
    }
    let series = resp.results.map(|r| r.series).unwrap_or_default();
    Ok(series
        .into_iter()
        .flat_map(|s| {
            let id = s.series_id;
            s.data.into_iter().map(move |d| BlsObservation {
                series_id: id.clone(),
                year: d.year,
                period: d.period,
                value: d.value,
                footnotes: footnote_text(&d.footnotes),
            })
        })
        .collect())
}

/// Sequential, budgeted API client.
pub struct BlsApiClient<'a> {
    http: &'a HttpSource,
    config: BlsApiConfig,
    requests_made: usize,
}

impl<'a> BlsApiClient<'a> {
    pub fn new(http: &'a HttpSource, config: BlsApiConfig) -> Self {
        Self {
            http,
            config,
            requests_made: 0,
        }
    }

    pub fn requests_made(&self) -> usize {
        self.requests_made
    }

    /// Fetch all `series`, batching to the per-request limit.
    ///
    /// Stops with `BudgetExhausted` once the daily request limit is reached.
    pub fn fetch(&mut self, series: &[String]) -> Result<Vec<BlsObservation>, DataError> {
        let mut out = Vec::new();
        for batch in series.chunks(self.config.series_per_request()) {
            let limit = self.config.daily_request_limit();
            if self.requests_made >= limit {
                return Err(DataError::BudgetExhausted { limit });
            }
            let request = BlsRequest {
                seriesid: batch,
                startyear: self.config.start_year.to_string(),
                endyear: self.config.end_year.to_string(),
                registrationkey: self.config.api_key.as_deref(),
            };
            self.requests_made += 1;
            tracing::debug!(
                series = batch.len(),
                request = self.requests_made,
                "BLS API request"
            );
            let resp: BlsResponse = self.http.post_json(BLS_API_URL, &request)?;
            let observations = into_observations(resp).map_err(|e| match e {
                DataError::BudgetExhausted { .. } => DataError::BudgetExhausted { limit },
                other => other,
            })?;
            out.extend(observations);
        }
        Ok(out)
    }
}

pub fn write_observations_csv(path: &Path, observations: &[BlsObservation]) -> Result<(), DataError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let to_err = |e: csv::Error| DataError::ResponseFormatChanged(format!("BLS CSV: {e}"));
    for obs in observations {
        wtr.serialize(obs).map_err(to_err)?;
    }
    if observations.is_empty() {
        wtr.write_record(["series_id", "year", "period", "value", "footnotes"])
            .map_err(to_err)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| DataError::ResponseFormatChanged(format!("BLS CSV: {e}")))?;
    super::download::write_atomic(path, &bytes)
}

#[derive(Debug, Default)]
pub struct BlsFetchSummary {
    pub employment_series: usize,
    pub wage_series: usize,
    pub employment_rows: usize,
    pub wage_rows: usize,
    pub state_series: usize,
    pub state_rows: usize,
    pub requests: usize,
    /// Metros without a known state, so no CES series could be built.
    pub skipped_metros: Vec<String>,
}

/// Build series IDs from the reference, fetch them, write `metro_employment.csv`,
/// `metro_wages.csv` and `state_employment.csv`.
///
/// The state file is supplementary: a failure there is logged and leaves the
/// metro files in place.
pub fn fetch_metro_series(
    http: &HttpSource,
    config: BlsApiConfig,
    reference: &MetroReference,
    layout: &DataLayout,
) -> Result<BlsFetchSummary, DataError> {
    let mut summary = BlsFetchSummary::default();
    let mut employment = Vec::new();
    let mut wages = Vec::new();
    let mut states = BTreeSet::new();

    for entry in reference.entries() {
        let state = entry
            .state_fips
            .as_deref()
            .or_else(|| fallback_state_fips(&entry.cbsa_code));
        match state {
            Some(st) => {
                employment.push(employment_series_id(st, &entry.cbsa_code));
                states.insert(st.to_string());
            }
            None => {
                tracing::warn!(metro = %entry.metro_name, "no state FIPS; skipping CES series");
                summary.skipped_metros.push(entry.metro_name.clone());
            }
        }
        wages.push(wage_series_id(&entry.cbsa_code));
    }

    let mut client = BlsApiClient::new(http, config);

    let emp_obs = client.fetch(&employment)?;
    write_observations_csv(&layout.bls_dir().join("metro_employment.csv"), &emp_obs)?;
    let wage_obs = client.fetch(&wages)?;
    write_observations_csv(&layout.bls_dir().join("metro_wages.csv"), &wage_obs)?;

    let state_ids: Vec<String> = states
        .iter()
        .map(|st| state_unemployment_series_id(st))
        .collect();
    match client.fetch(&state_ids) {
        Ok(state_obs) => {
            write_observations_csv(&layout.bls_dir().join("state_employment.csv"), &state_obs)?;
            summary.state_series = state_ids.len();
            summary.state_rows = state_obs.len();
        }
        Err(e) => tracing::warn!(error = %e, "state unemployment series not fetched"),
    }

    summary.employment_series = employment.len();
    summary.wage_series = wages.len();
    summary.employment_rows = emp_obs.len();
    summary.wage_rows = wage_obs.len();
    summary.requests = client.requests_made();
    tracing::info!(
        employment_rows = summary.employment_rows,
        wage_rows = summary.wage_rows,
        state_rows = summary.state_rows,
        requests = summary.requests,
        "BLS API fetch complete"
    );
    Ok(summary)
}
