use crate::catalog::SearchWindow;
use crate::element84::search::{COLLECTION_ID, SEARCH_API};
use crate::error::{EtlError, EtlResult};
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use toml;
use url::Url;

pub const RED: &str = "red";
pub const GREEN: &str = "green";
pub const BLUE: &str = "blue";

pub fn run_config_toml() -> toml::Table {
    toml::toml! {
        footprints_dir = "footprints"

        output_dir = "data"

        catalog_url = "https://earth-search.aws.element84.com/v1/search"

        collection = "sentinel-2-c1-l2a"

        // Leave out start_date and end_date to search the 30 days before the
        // first day of the current month
        cloud_cover = [0.0, 30.0]

        // Asset keys of the Earth Search items
        bands = ["blue", "green", "red", "nir"]

        resolution = 10.0

        tci = true

        search_limit = 100

        keep_intermediate = false
    }
}

fn default_footprints_dir() -> PathBuf {
    PathBuf::from("footprints")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_catalog_url() -> Url {
    Url::parse(SEARCH_API).expect("Search api url should always parse")
}

fn default_collection() -> String {
    COLLECTION_ID.to_string()
}

fn default_cloud_cover() -> (f64, f64) {
    (0.0, 30.0)
}

fn default_bands() -> Vec<String> {
    [BLUE, GREEN, RED, "nir"].iter().map(|b| b.to_string()).collect()
}

fn default_resolution() -> f64 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_search_limit() -> usize {
    100
}

/// Parameters of one batch run.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RunConfig {
    #[serde(default = "default_footprints_dir")]
    pub footprints_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_catalog_url")]
    pub catalog_url: Url,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_cloud_cover")]
    pub cloud_cover: (f64, f64),
    #[serde(default = "default_bands")]
    pub bands: Vec<String>,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default = "default_true")]
    pub tci: bool,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Named AWS profile; the public bucket is read anonymously without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_profile: Option<String>,
    #[serde(default)]
    pub keep_intermediate: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_template(&run_config_toml())
    }
}

impl RunConfig {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Self {
        let config: Self =
            toml::from_str(&table.to_string()).expect("Error deserializing template");
        config
    }

    pub fn has_band(&self, band: &str) -> bool {
        self.bands.iter().any(|b| b == band)
    }

    pub fn validate(&self) -> EtlResult<()> {
        if self.bands.is_empty() {
            return Err(EtlError::Configuration("no bands selected".to_string()));
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(EtlError::Configuration(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if self.search_limit == 0 {
            return Err(EtlError::Configuration("search_limit must be positive".to_string()));
        }
        if self.tci && ![RED, GREEN, BLUE].iter().all(|b| self.has_band(b)) {
            return Err(EtlError::Configuration(
                "true color composites need the red, green and blue bands".to_string(),
            ));
        }
        self.search_window(chrono::Utc::now().date_naive())?;
        Ok(())
    }

    /// The configured dates, or the month before `today` when unset.
    pub fn search_window(&self, today: NaiveDate) -> EtlResult<SearchWindow> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => SearchWindow::new(start, end, self.cloud_cover),
            (None, None) => SearchWindow::previous_month(today, self.cloud_cover),
            _ => Err(EtlError::Configuration(
                "start_date and end_date must be set together".to_string(),
            )),
        }
    }
}
