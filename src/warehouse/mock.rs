//! Mock warehouse clients for testing.
//!
//! Provides an in-memory warehouse that answers statements with canned row sets,
//! and one that fails every statement.

use super::{ColumnInfo, RowSet, Value, WarehouseBackend, WarehouseClient};
use crate::error::{AtlasError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Canned outcome for statements containing a given fragment.
#[derive(Debug, Clone)]
enum Response {
    Rows(RowSet),
    Error(String),
}

/// A mock warehouse that returns predefined results.
///
/// Responses are matched by substring against the submitted SQL; the first
/// registered match wins. Unmatched statements return an empty result.
#[derive(Debug)]
pub struct MockWarehouse {
    backend: WarehouseBackend,
    responses: Vec<(String, Response)>,
    executed: Mutex<Vec<String>>,
}

impl MockWarehouse {
    /// Creates a new mock warehouse with no canned responses.
    pub fn new() -> Self {
        Self {
            backend: WarehouseBackend::Snowflake,
            responses: Vec::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Reports a different backend so callers render that dialect.
    pub fn with_backend(mut self, backend: WarehouseBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Answers statements containing `fragment` with `rows`.
    pub fn respond_to(mut self, fragment: impl Into<String>, rows: RowSet) -> Self {
        self.responses.push((fragment.into(), Response::Rows(rows)));
        self
    }

    /// Fails statements containing `fragment` with a query error.
    pub fn fail_on(mut self, fragment: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses
            .push((fragment.into(), Response::Error(message.into())));
        self
    }

    /// Creates a mock answering the four analyses with a small Paris dataset.
    ///
    /// Statements are recognised by the result aliases they select, most
    /// specific first, since the bounding and centroid statements also
    /// aggregate sales.
    pub fn paris_fixture() -> Self {
        Self::new()
            .respond_to("KILOMETER_FROM_TOP_SELLING_CENTER", fixture::farthest_locations())
            .respond_to("MINIMUM_BOUNDING_POLYGON", fixture::bounding_area())
            .respond_to("GEOMETRIC_CENTER_POINT", fixture::centroid())
            .respond_to("TOTAL_SALES_USD", fixture::top_locations())
    }

    /// Returns every statement executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|sql| sql.clone())
            .unwrap_or_default()
    }
}

impl Default for MockWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WarehouseClient for MockWarehouse {
    fn backend(&self) -> WarehouseBackend {
        self.backend
    }

    async fn execute_query(&self, sql: &str) -> Result<RowSet> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        let response = self
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, response)| response.clone());

        match response {
            Some(Response::Rows(rows)) => Ok(rows.with_execution_time(Duration::from_millis(1))),
            Some(Response::Error(message)) => Err(AtlasError::query(message)),
            None => Ok(RowSet::new().with_execution_time(Duration::from_millis(1))),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A warehouse whose every statement fails.
#[derive(Debug, Clone)]
pub struct FailingWarehouse {
    message: String,
}

impl FailingWarehouse {
    /// Creates a warehouse failing with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl WarehouseClient for FailingWarehouse {
    fn backend(&self) -> WarehouseBackend {
        WarehouseBackend::Snowflake
    }

    async fn execute_query(&self, _sql: &str) -> Result<RowSet> {
        Err(AtlasError::query(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Paris sample data shaped like the warehouse results.
pub mod fixture {
    use super::*;

    /// Three top-selling locations.
    pub fn top_locations() -> RowSet {
        RowSet::with_data(
            vec![
                ColumnInfo::new("LOCATION_ID", "fixed"),
                ColumnInfo::new("LOCATION_NAME", "text"),
                ColumnInfo::new("LONGITUDE", "real"),
                ColumnInfo::new("LATITUDE", "real"),
                ColumnInfo::new("TOTAL_SALES_USD", "fixed"),
            ],
            vec![
                vec![
                    Value::Int(4493),
                    Value::from("Place de la Bastille"),
                    Value::Float(2.3691),
                    Value::Float(48.8532),
                    Value::Float(298402.0),
                ],
                vec![
                    Value::Int(3519),
                    Value::from("Jardin des Plantes"),
                    Value::Float(2.3597),
                    Value::Float(48.8440),
                    Value::Float(272115.5),
                ],
                vec![
                    Value::Int(2866),
                    Value::from("Canal Saint-Martin"),
                    Value::Float(2.3656),
                    Value::Float(48.8710),
                    Value::Float(260310.25),
                ],
            ],
        )
    }

    /// Envelope of the three top-selling locations.
    pub fn bounding_area() -> RowSet {
        RowSet::with_data(
            vec![
                ColumnInfo::new("COUNT_POINTS_IN_COLLECTION", "fixed"),
                ColumnInfo::new("COLLECTION_OF_POINTS", "geography"),
                ColumnInfo::new("MINIMUM_BOUNDING_POLYGON", "geography"),
                ColumnInfo::new("AREA_IN_SQ_KILOMETERS", "fixed"),
            ],
            vec![vec![
                Value::Int(3),
                Value::from(
                    r#"{"coordinates":[[2.3691,48.8532],[2.3597,48.844],[2.3656,48.871]],"type":"MultiPoint"}"#,
                ),
                Value::from(
                    r#"{"coordinates":[[[2.3597,48.844],[2.3691,48.844],[2.3691,48.871],[2.3597,48.871],[2.3597,48.844]]],"type":"Polygon"}"#,
                ),
                Value::Float(2.07),
            ]],
        )
    }

    /// Centroid of the three top-selling locations.
    pub fn centroid() -> RowSet {
        RowSet::with_data(
            vec![
                ColumnInfo::new("COLLECT_POINTS", "geography"),
                ColumnInfo::new("GEOMETRIC_CENTER_POINT", "geography"),
            ],
            vec![vec![
                Value::from(
                    r#"{"coordinates":[[2.3691,48.8532],[2.3597,48.844],[2.3656,48.871]],"type":"MultiPoint"}"#,
                ),
                Value::from(r#"{"coordinates":[2.3649,48.8568],"type":"Point"}"#),
            ]],
        )
    }

    /// Locations ranked by distance from the centroid.
    pub fn farthest_locations() -> RowSet {
        RowSet::with_data(
            vec![
                ColumnInfo::new("LOCATION_ID", "fixed"),
                ColumnInfo::new("LOCATION_NAME", "text"),
                ColumnInfo::new("LONGITUDE", "real"),
                ColumnInfo::new("LATITUDE", "real"),
                ColumnInfo::new("KILOMETER_FROM_TOP_SELLING_CENTER", "fixed"),
            ],
            vec![
                vec![
                    Value::Int(1120),
                    Value::from("Porte Maillot"),
                    Value::Float(2.2825),
                    Value::Float(48.8780),
                    Value::Float(6.43),
                ],
                vec![
                    Value::Int(1781),
                    Value::from("Parc Montsouris"),
                    Value::Float(2.3387),
                    Value::Float(48.8222),
                    Value::Float(4.32),
                ],
            ],
        )
    }
}
