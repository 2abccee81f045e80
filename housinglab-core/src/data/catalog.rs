//! The fixed dataset catalog.

use super::layout::DataLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Zillow,
    Census,
    Bls,
    Other,
}

impl SourceCategory {
    pub const ALL: [SourceCategory; 4] = [
        SourceCategory::Zillow,
        SourceCategory::Census,
        SourceCategory::Bls,
        SourceCategory::Other,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            SourceCategory::Zillow => "zillow",
            SourceCategory::Census => "census",
            SourceCategory::Bls => "bls",
            SourceCategory::Other => "other",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// How a dataset reaches disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Plain HTTP GET of `url`.
    Direct,
    /// Assembled from BLS API responses.
    BlsApi,
    /// The user places the file; `url` points at where to get it.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub name: &'static str,
    pub url: &'static str,
    pub file_name: &'static str,
    pub category: SourceCategory,
    pub description: &'static str,
    /// Core datasets decide the verifier's readiness verdict.
    pub core: bool,
    pub availability: Availability,
}

impl DatasetDescriptor {
    pub fn destination(&self, layout: &DataLayout) -> PathBuf {
        layout.category_dir(self.category).join(self.file_name)
    }

    pub fn is_manual(&self) -> bool {
        self.availability == Availability::Manual
    }

    /// Host part of the URL, used to key the circuit breaker.
    pub fn host(&self) -> Option<String> {
        reqwest::Url::parse(self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

const ZILLOW_BASE: &str = "https://files.zillowstatic.com/research/public_csvs";

macro_rules! zillow_url {
    ($path:literal) => {
        concat!("https://files.zillowstatic.com/research/public_csvs/", $path)
    };
}

pub fn default_catalog() -> Vec<DatasetDescriptor> {
    use Availability::*;
    use SourceCategory::*;

    let d = |name, url, file_name, category, description, core, availability| DatasetDescriptor {
        name,
        url,
        file_name,
        category,
        description,
        core,
        availability,
    };

    vec![
        d(
            "zhvi_metro",
            zillow_url!("zhvi/Metro_zhvi_uc_sfrcondo_tier_0.33_0.67_sm_sa_month.csv"),
            "zhvi_metro.csv",
            Zillow,
            "Zillow Home Value Index by metro (monthly, smoothed, seasonally adjusted)",
            true,
            Direct,
        ),
        d(
            "zhvi_county",
            zillow_url!("zhvi/County_zhvi_uc_sfrcondo_tier_0.33_0.67_sm_sa_month.csv"),
            "zhvi_county.csv",
            Zillow,
            "Zillow Home Value Index by county",
            true,
            Direct,
        ),
        d(
            "zhvi_zip",
            zillow_url!("zhvi/Zip_zhvi_uc_sfrcondo_tier_0.33_0.67_sm_sa_month.csv"),
            "zhvi_zip.csv",
            Zillow,
            "Zillow Home Value Index by ZIP code",
            false,
            Direct,
        ),
        d(
            "zori_metro",
            zillow_url!("zori/Metro_zori_uc_sfrcondomfr_sm_month.csv"),
            "zori_metro.csv",
            Zillow,
            "Zillow Observed Rent Index by metro",
            true,
            Direct,
        ),
        d(
            "zori_county",
            zillow_url!("zori/County_zori_uc_sfrcondomfr_sm_month.csv"),
            "zori_county.csv",
            Zillow,
            "Zillow Observed Rent Index by county",
            false,
            Direct,
        ),
        d(
            "inventory_metro",
            zillow_url!("invt_fs/Metro_invt_fs_uc_sfrcondo_sm_month.csv"),
            "inventory_metro.csv",
            Zillow,
            "For-sale inventory by metro",
            false,
            Direct,
        ),
        d(
            "median_list_price_metro",
            zillow_url!("mlp/Metro_mlp_uc_sfrcondo_sm_month.csv"),
            "median_list_price_metro.csv",
            Zillow,
            "Median list price by metro",
            false,
            Direct,
        ),
        d(
            "days_on_market_metro",
            zillow_url!("med_doz_pending/Metro_med_doz_pending_uc_sfrcondo_sm_week.csv"),
            "days_on_market_metro.csv",
            Zillow,
            "Median days to pending by metro (weekly)",
            false,
            Direct,
        ),
        d(
            "sales_count_metro",
            zillow_url!("sales_count_now/Metro_sales_count_now_uc_sfrcondo_month.csv"),
            "sales_count_metro.csv",
            Zillow,
            "Sales count nowcast by metro",
            false,
            Direct,
        ),
        d(
            "price_cuts_metro",
            "https://www.zillow.com/research/data/",
            "price_cuts_metro.csv",
            Zillow,
            "Share of listings with a price cut (Zillow research page, 'List and Sale Prices')",
            false,
            Manual,
        ),
        d(
            "population_estimates",
            "https://www2.census.gov/programs-surveys/popest/datasets/2020-2023/counties/totals/co-est2023-alldata.csv",
            "population_estimates.csv",
            Census,
            "Census county population estimates 2020-2023",
            true,
            Direct,
        ),
        d(
            "cbsa_to_county",
            "https://data.nber.org/cbsa-csa-fips-county-crosswalk/cbsa2fipsxw.csv",
            "cbsa_to_county.csv",
            Census,
            "NBER CBSA to county FIPS crosswalk",
            true,
            Direct,
        ),
        d(
            "building_permits",
            "https://www2.census.gov/econ/bps/Metro/ma2023a.txt",
            "building_permits.csv",
            Census,
            "Census building permits by metro (annual)",
            false,
            Direct,
        ),
        d(
            "migration_flows",
            "https://www.census.gov/topics/population/migration/guidance/county-to-county-migration-flows.html",
            "migration_flows.csv",
            Census,
            "County-to-county migration flows (Census ACS)",
            false,
            Manual,
        ),
        d(
            "metro_employment",
            "https://api.bls.gov/publicAPI/v2/timeseries/data/",
            "metro_employment.csv",
            Bls,
            "BLS CES total nonfarm employment by metro",
            false,
            BlsApi,
        ),
        d(
            "metro_wages",
            "https://api.bls.gov/publicAPI/v2/timeseries/data/",
            "metro_wages.csv",
            Bls,
            "BLS QCEW average weekly wage by metro",
            false,
            BlsApi,
        ),
        d(
            "state_employment",
            "https://api.bls.gov/publicAPI/v2/timeseries/data/",
            "state_employment.csv",
            Bls,
            "BLS LAUS statewide unemployment rate",
            false,
            BlsApi,
        ),
        d(
            "fhfa_hpi_metro",
            "https://www.fhfa.gov/hpi/download/monthly/hpi_master.csv",
            "fhfa_hpi_metro.csv",
            Other,
            "FHFA House Price Index master file",
            true,
            Direct,
        ),
        d(
            "freddie_mac_rates",
            "https://www.freddiemac.com/pmms",
            "freddie_mac_rates.csv",
            Other,
            "Freddie Mac weekly 30-year mortgage rates (PMMS archive download)",
            false,
            Manual,
        ),
    ]
}

/// Zillow's public CSV host, exposed for connectivity checks.
pub fn zillow_base_url() -> &'static str {
    ZILLOW_BASE
}

pub fn find(catalog: &[DatasetDescriptor], name: &str) -> Option<DatasetDescriptor> {
    catalog.iter().find(|d| d.name == name).cloned()
}
