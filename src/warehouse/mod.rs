//! Warehouse abstraction layer for Sales Atlas.
//!
//! Provides a trait-based interface for running SQL against a data warehouse,
//! allowing different backends to be used interchangeably.

mod mock;
mod postgres;
mod snowflake;
mod types;

pub use mock::{fixture, FailingWarehouse, MockWarehouse};
pub use postgres::PostgresWarehouse;
pub use snowflake::SnowflakeWarehouse;
pub use types::{ColumnInfo, Row, RowSet, Value};

use crate::config::WarehouseConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Supported warehouse backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    #[default]
    Snowflake,
    #[serde(alias = "postgresql")]
    Postgres,
}

impl WarehouseBackend {
    /// Returns the backend as a string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snowflake => "snowflake",
            Self::Postgres => "postgres",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "snowflake" => Some(Self::Snowflake),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// Opens a warehouse session for the given backend and configuration.
///
/// This is the central factory function for warehouse connections. The
/// password is resolved by the caller so that secret lookup stays outside
/// the transport code.
pub async fn connect(
    config: &WarehouseConfig,
    password: Option<&str>,
) -> Result<Box<dyn WarehouseClient>> {
    match config.backend {
        WarehouseBackend::Snowflake => {
            let client = SnowflakeWarehouse::connect(config, password).await?;
            Ok(Box::new(client))
        }
        WarehouseBackend::Postgres => {
            let client = PostgresWarehouse::connect(config, password).await?;
            Ok(Box::new(client))
        }
    }
}

/// Trait defining the interface for warehouse clients.
///
/// All operations are async and return Results with AtlasError.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Returns which backend this client talks to (selects the SQL dialect).
    fn backend(&self) -> WarehouseBackend;

    /// Executes a SQL query and returns the results.
    async fn execute_query(&self, sql: &str) -> Result<RowSet>;

    /// Closes the warehouse session.
    async fn close(&self) -> Result<()>;
}
