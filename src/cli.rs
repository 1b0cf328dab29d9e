//! Command-line argument parsing for Sales Atlas.
//!
//! Flags override the matching configuration file values.

use clap::Parser;
use sales_atlas::config::{CentroidSource, Config};
use sales_atlas::error::{AtlasError, Result};
use sales_atlas::render::OutputFormat;
use sales_atlas::warehouse::WarehouseBackend;
use std::path::PathBuf;

/// Renders the Tasty Bytes geospatial sales dashboard.
#[derive(Parser, Debug)]
#[command(name = "sales-atlas")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Where to write the dashboard ("-" for stdout)
    #[arg(short, long, value_name = "PATH", default_value = "sales-atlas.html")]
    pub output: String,

    /// Dashboard format: html, json, or text
    #[arg(short, long, value_name = "FORMAT", default_value = "html")]
    pub format: String,

    /// Warehouse backend: snowflake or postgres
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// City to analyse
    #[arg(long, value_name = "CITY")]
    pub city: Option<String>,

    /// Order year to analyse
    #[arg(long, value_name = "YEAR")]
    pub year: Option<i32>,

    /// Number of top-selling locations
    #[arg(long, value_name = "N")]
    pub top_n: Option<u32>,

    /// Number of farthest locations to list
    #[arg(long, value_name = "M")]
    pub farthest: Option<u32>,

    /// Reference point for distances: computed or fixed
    #[arg(long, value_name = "SOURCE")]
    pub centroid: Option<String>,

    /// Use the built-in Paris sample data instead of a warehouse
    #[arg(long)]
    pub mock: bool,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    pub log_file: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Parses the output format from the --format argument.
    pub fn parse_output_format(&self) -> std::result::Result<OutputFormat, String> {
        self.format.parse()
    }

    /// Returns true when the dashboard goes to stdout.
    pub fn writes_to_stdout(&self) -> bool {
        self.output == "-"
    }

    /// Applies flag values over the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(backend) = &self.backend {
            config.warehouse.backend = WarehouseBackend::parse(backend).ok_or_else(|| {
                AtlasError::config(format!(
                    "Invalid backend: {backend}. Expected: snowflake or postgres"
                ))
            })?;
        }
        if let Some(city) = &self.city {
            config.analysis.city = city.clone();
        }
        if let Some(year) = self.year {
            config.analysis.year = year;
        }
        if let Some(top_n) = self.top_n {
            config.analysis.top_n = top_n;
        }
        if let Some(farthest) = self.farthest {
            config.analysis.farthest_limit = farthest;
        }
        if let Some(centroid) = &self.centroid {
            config.analysis.centroid_source = centroid
                .parse::<CentroidSource>()
                .map_err(AtlasError::config)?;
        }
        Ok(())
    }
}
