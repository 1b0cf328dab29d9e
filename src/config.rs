//! Configuration management for Sales Atlas.
//!
//! Handles loading configuration from TOML files and environment variables:
//! warehouse credentials, analysis parameters, and map display settings.

use crate::error::{AtlasError, Result};
use crate::warehouse::WarehouseBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Reference point used by the farthest-locations analysis when the live
/// centroid is not used (longitude, latitude).
pub const DEFAULT_FALLBACK_CENTROID: [f64; 2] = [2.364853294993676, 48.85681511418426];

/// Main configuration structure for Sales Atlas.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Warehouse connection settings.
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Parameters shared by the four analyses.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Map and page display settings.
    #[serde(default)]
    pub map: MapConfig,
}

/// Warehouse connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Which warehouse backend to talk to.
    #[serde(default)]
    pub backend: WarehouseBackend,

    /// Snowflake account identifier (e.g. `xy12345.eu-west-1`).
    pub account: Option<String>,

    /// Login name.
    pub user: Option<String>,

    /// Password (not recommended to store in config; prefer env or keyring).
    pub password: Option<String>,

    /// Role to assume for the session.
    #[serde(default = "default_role")]
    pub role: String,

    /// Virtual warehouse running the queries.
    #[serde(default = "default_warehouse")]
    pub warehouse: String,

    /// Default database for the session.
    pub database: Option<String>,

    /// Default schema for the session.
    pub schema: Option<String>,

    /// Overrides the Snowflake base URL, or the PostgreSQL host.
    pub host: Option<String>,

    /// PostgreSQL port.
    pub port: Option<u16>,

    /// Per-statement timeout in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_role() -> String {
    "TASTY_DATA_ENGINEER".to_string()
}

fn default_warehouse() -> String {
    "TASTY_DE_WH".to_string()
}

fn default_query_timeout() -> u64 {
    60
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: WarehouseBackend::default(),
            account: None,
            user: None,
            password: None,
            role: default_role(),
            warehouse: default_warehouse(),
            database: None,
            schema: None,
            host: None,
            port: None,
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl WarehouseConfig {
    /// Applies environment variables as defaults for unset fields.
    ///
    /// Snowflake reads `SNOWFLAKE_*`; PostgreSQL reads the libpq `PG*` set.
    pub fn apply_env_defaults(&mut self) {
        match self.backend {
            WarehouseBackend::Snowflake => {
                if self.account.is_none() {
                    self.account = std::env::var("SNOWFLAKE_ACCOUNT").ok();
                }
                if self.user.is_none() {
                    self.user = std::env::var("SNOWFLAKE_USER").ok();
                }
                if self.password.is_none() {
                    self.password = std::env::var("SNOWFLAKE_PASSWORD").ok();
                }
                if self.role == default_role() {
                    if let Ok(role) = std::env::var("SNOWFLAKE_ROLE") {
                        self.role = role;
                    }
                }
                if self.warehouse == default_warehouse() {
                    if let Ok(warehouse) = std::env::var("SNOWFLAKE_WAREHOUSE") {
                        self.warehouse = warehouse;
                    }
                }
            }
            WarehouseBackend::Postgres => {
                if self.host.is_none() {
                    self.host = std::env::var("PGHOST").ok();
                }
                if self.port.is_none() {
                    self.port = std::env::var("PGPORT").ok().and_then(|p| p.parse().ok());
                }
                if self.database.is_none() {
                    self.database = std::env::var("PGDATABASE").ok();
                }
                if self.user.is_none() {
                    self.user = std::env::var("PGUSER").ok();
                }
                if self.password.is_none() {
                    self.password = std::env::var("PGPASSWORD").ok();
                }
            }
        }
    }

    /// Checks that the fields the selected backend needs are present.
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            WarehouseBackend::Snowflake => {
                if self.account.as_deref().map_or(true, str::is_empty) {
                    return Err(AtlasError::config(
                        "missing field 'account' in [warehouse] (or SNOWFLAKE_ACCOUNT)",
                    ));
                }
                if self.user.as_deref().map_or(true, str::is_empty) {
                    return Err(AtlasError::config(
                        "missing field 'user' in [warehouse] (or SNOWFLAKE_USER)",
                    ));
                }
            }
            WarehouseBackend::Postgres => {
                if self.database.as_deref().map_or(true, str::is_empty) {
                    return Err(AtlasError::config(
                        "missing field 'database' in [warehouse] (or PGDATABASE)",
                    ));
                }
            }
        }
        if self.query_timeout_secs == 0 {
            return Err(AtlasError::config("query_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Returns a display-safe string (no password) for logs.
    pub fn display_string(&self) -> String {
        let user = self.user.as_deref().unwrap_or("unknown");
        match self.backend {
            WarehouseBackend::Snowflake => {
                let account = self.account.as_deref().unwrap_or("unknown");
                format!(
                    "{user} @ {account} (role {}, warehouse {})",
                    self.role, self.warehouse
                )
            }
            WarehouseBackend::Postgres => {
                let host = self.host.as_deref().unwrap_or("localhost");
                let database = self.database.as_deref().unwrap_or("unknown");
                format!("{user} @ {host}:{}/{database}", self.port.unwrap_or(5432))
            }
        }
    }
}

/// Where the farthest-locations analysis takes its reference point from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CentroidSource {
    /// Reuse the centroid computed by the centroid section.
    #[default]
    Computed,
    /// Always use the configured fallback coordinate.
    Fixed,
}

impl std::str::FromStr for CentroidSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "computed" => Ok(Self::Computed),
            "fixed" => Ok(Self::Fixed),
            _ => Err(format!(
                "Invalid centroid source: {s}. Expected: computed or fixed"
            )),
        }
    }
}

/// Parameters shared by the four analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Fully qualified orders view.
    #[serde(default = "default_orders_table")]
    pub orders_table: String,

    /// City filter.
    #[serde(default = "default_city")]
    pub city: String,

    /// Order year filter.
    #[serde(default = "default_year")]
    pub year: i32,

    /// Number of top-selling locations.
    #[serde(default = "default_top_n")]
    pub top_n: u32,

    /// Number of farthest locations to list.
    #[serde(default = "default_farthest_limit")]
    pub farthest_limit: u32,

    /// Reference point used for the distance ranking.
    #[serde(default)]
    pub centroid_source: CentroidSource,

    /// Fixed reference point as `[longitude, latitude]`.
    #[serde(default = "default_fallback_centroid")]
    pub fallback_centroid: [f64; 2],
}

fn default_orders_table() -> String {
    "frostbyte_tasty_bytes.analytics.orders_v".to_string()
}

fn default_city() -> String {
    "Paris".to_string()
}

fn default_year() -> i32 {
    2022
}

fn default_top_n() -> u32 {
    10
}

fn default_farthest_limit() -> u32 {
    50
}

fn default_fallback_centroid() -> [f64; 2] {
    DEFAULT_FALLBACK_CENTROID
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            orders_table: default_orders_table(),
            city: default_city(),
            year: default_year(),
            top_n: default_top_n(),
            farthest_limit: default_farthest_limit(),
            centroid_source: CentroidSource::default(),
            fallback_centroid: default_fallback_centroid(),
        }
    }
}

impl AnalysisConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(AtlasError::config("analysis.top_n must be at least 1"));
        }
        if self.farthest_limit == 0 {
            return Err(AtlasError::config(
                "analysis.farthest_limit must be at least 1",
            ));
        }
        if self.city.trim().is_empty() {
            return Err(AtlasError::config("analysis.city must not be empty"));
        }
        let [lon, lat] = self.fallback_centroid;
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(AtlasError::config(format!(
                "analysis.fallback_centroid [{lon}, {lat}] is not a valid [longitude, latitude]"
            )));
        }
        Ok(())
    }
}

/// Map and page display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Page title.
    #[serde(default = "default_title")]
    pub title: String,

    /// Initial zoom level.
    #[serde(default = "default_zoom")]
    pub zoom_start: u8,

    /// Rendered map width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Padding in pixels applied when fitting the top-locations view.
    #[serde(default = "default_fit_padding")]
    pub fit_padding: [u32; 2],
}

fn default_title() -> String {
    "Tasty Bytes: Visualizing Geospatial Data".to_string()
}

fn default_zoom() -> u8 {
    13
}

fn default_width() -> u32 {
    700
}

fn default_fit_padding() -> [u32; 2] {
    [30, 30]
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            zoom_start: default_zoom(),
            width: default_width(),
            fit_padding: default_fit_padding(),
        }
    }
}

impl MapConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.zoom_start > 22 {
            return Err(AtlasError::config(format!(
                "map.zoom_start {} is out of range 0..=22",
                self.zoom_start
            )));
        }
        if self.width == 0 {
            return Err(AtlasError::config("map.width must be positive"));
        }
        Ok(())
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sales-atlas")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AtlasError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            AtlasError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.warehouse.validate()?;
        self.analysis.validate()?;
        self.map.validate()
    }
}
