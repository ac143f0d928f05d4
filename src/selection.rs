//! Search selection file.
//!
//! ```toml
//! [search]
//! collection = "SENTINEL-2"
//! product_type = "S2MSI2A"
//! start_date = "2022-01-01T00:00:00.000Z"
//! end_date = "2022-01-03T00:00:00.000Z"
//! latitude = 43.78186592737776
//! longitude = 11.287615415088597
//! cloud_cover = 10.0
//! top = 20
//!
//! [output]
//! dest_dir = "./outputs"
//! download = false
//! ```
//!
//! Every key is optional. Credentials are never read from or written to this file.
use crate::auth::{DEFAULT_CLIENT_ID, DEFAULT_TOKEN_URL};
use crate::catalog::DEFAULT_CATALOG_URL;
use crate::error::{Error, Result};
use crate::filter::{GeoPoint, SearchParams};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_COLLECTION: &str = "SENTINEL-2";
pub const DEFAULT_LATITUDE: f64 = 43.78186592737776;
pub const DEFAULT_LONGITUDE: f64 = 11.287615415088597;
pub const DEFAULT_CLOUD_COVER: f64 = 10.0;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 5;

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Selection {
    pub search: SearchSection,
    pub output: OutputSection,
    pub endpoints: Endpoints,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SearchSection {
    pub collection: Option<String>,
    pub product_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub top: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct OutputSection {
    pub dest_dir: Option<PathBuf>,
    pub download: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub catalog_url: String,
    pub token_url: String,
    pub client_id: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

impl Endpoints {
    pub fn check(&self) -> Result<()> {
        for url in [&self.catalog_url, &self.token_url] {
            Url::parse(url).map_err(|e| Error::Config(format!("invalid endpoint {url}: {e}")))?;
        }
        if self.client_id.is_empty() {
            return Err(Error::Config("client_id must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Selection {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let selection: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Ok(selection)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content).map_err(|e| Error::Config(e.to_string()))?;
        Ok(())
    }

    pub fn from_template(table: &toml::Table) -> Result<Self> {
        toml::from_str(&table.to_string()).map_err(|e| Error::Config(e.to_string()))
    }

    /// Fill unset search keys with defaults relative to `now`.
    pub fn search_params(&self, now: DateTime<Utc>) -> SearchParams {
        let search = &self.search;
        SearchParams {
            collection: search
                .collection
                .clone()
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            product_type: search.product_type.clone().unwrap_or_default(),
            start_date: search
                .start_date
                .unwrap_or(now - Duration::days(DEFAULT_LOOKBACK_DAYS)),
            end_date: search.end_date.unwrap_or(now),
            point: GeoPoint::new(
                search.latitude.unwrap_or(DEFAULT_LATITUDE),
                search.longitude.unwrap_or(DEFAULT_LONGITUDE),
            ),
            max_cloud_cover: search.cloud_cover.unwrap_or(DEFAULT_CLOUD_COVER),
        }
    }

    pub fn dest_dir(&self) -> PathBuf {
        self.output
            .dest_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./"))
    }
}
