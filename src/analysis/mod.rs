//! The four fixed spatial analyses.
//!
//! Each [`Analysis`] renders one read-only statement for the target backend.
//! Result columns are given quoted upper-case aliases so that their names are
//! identical on every backend; the typed records in [`rows`] read exactly
//! those names.

pub mod rows;

pub use rows::{BoundingAreaRow, CentroidRow, FarthestLocationRow, TopLocationRow};

use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::canvas::LatLon;
use crate::config::AnalysisConfig;
use crate::error::{AtlasError, Result};
use crate::warehouse::WarehouseBackend;

/// Result aliases shared by the statements and the typed rows.
pub mod columns {
    pub const LOCATION_ID: &str = "LOCATION_ID";
    pub const LOCATION_NAME: &str = "LOCATION_NAME";
    pub const LONGITUDE: &str = "LONGITUDE";
    pub const LATITUDE: &str = "LATITUDE";
    pub const TOTAL_SALES_USD: &str = "TOTAL_SALES_USD";
    pub const COUNT_POINTS_IN_COLLECTION: &str = "COUNT_POINTS_IN_COLLECTION";
    pub const COLLECTION_OF_POINTS: &str = "COLLECTION_OF_POINTS";
    pub const MINIMUM_BOUNDING_POLYGON: &str = "MINIMUM_BOUNDING_POLYGON";
    pub const AREA_IN_SQ_KILOMETERS: &str = "AREA_IN_SQ_KILOMETERS";
    pub const COLLECT_POINTS: &str = "COLLECT_POINTS";
    pub const GEOMETRIC_CENTER_POINT: &str = "GEOMETRIC_CENTER_POINT";
    pub const KILOMETER_FROM_TOP_SELLING_CENTER: &str = "KILOMETER_FROM_TOP_SELLING_CENTER";
}

/// `[database.][schema.]table`, unquoted.
const TABLE_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*){0,2}$";

/// One of the four dashboard analyses, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Analysis {
    TopLocations,
    BoundingArea,
    Centroid,
    FarthestLocations,
}

impl Analysis {
    pub const ALL: [Analysis; 4] = [
        Analysis::TopLocations,
        Analysis::BoundingArea,
        Analysis::Centroid,
        Analysis::FarthestLocations,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::TopLocations => "top locations",
            Self::BoundingArea => "bounding area",
            Self::Centroid => "centroid",
            Self::FarthestLocations => "farthest locations",
        }
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validated inputs for the statements.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisParams {
    pub orders_table: String,
    pub city: String,
    pub year: i32,
    pub top_n: u32,
    pub farthest_limit: u32,
}

impl AnalysisParams {
    /// Builds parameters from configuration, rejecting unsafe table names.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let pattern = Regex::new(TABLE_NAME_PATTERN)
            .map_err(|e| AtlasError::internal(format!("Invalid table name pattern: {e}")))?;
        if !pattern.is_match(&config.orders_table) {
            return Err(AtlasError::config(format!(
                "analysis.orders_table '{}' is not a [database.][schema.]table identifier",
                config.orders_table
            )));
        }
        Ok(Self {
            orders_table: config.orders_table.clone(),
            city: config.city.clone(),
            year: config.year,
            top_n: config.top_n,
            farthest_limit: config.farthest_limit,
        })
    }
}

/// Renders the statement for `analysis`.
///
/// `reference` is the point distances are measured from; only the
/// farthest-locations statement uses it.
pub fn render_sql(
    analysis: Analysis,
    params: &AnalysisParams,
    backend: WarehouseBackend,
    reference: LatLon,
) -> Result<String> {
    let dialect = Dialect(backend);
    match analysis {
        Analysis::TopLocations => Ok(top_locations_sql(params, dialect)),
        Analysis::BoundingArea => Ok(bounding_area_sql(params, dialect)),
        Analysis::Centroid => Ok(centroid_sql(params, dialect)),
        Analysis::FarthestLocations => {
            if !reference.lat.is_finite() || !reference.lon.is_finite() {
                return Err(AtlasError::query(format!(
                    "reference point ({}, {}) is not finite",
                    reference.lat, reference.lon
                )));
            }
            Ok(farthest_locations_sql(params, dialect, reference))
        }
    }
}

/// Backend-specific SQL fragments.
#[derive(Debug, Clone, Copy)]
struct Dialect(WarehouseBackend);

impl Dialect {
    fn string_literal(&self, value: &str) -> String {
        let escaped = match self.0 {
            // Snowflake treats backslash as an escape inside string literals
            WarehouseBackend::Snowflake => value.replace('\\', "\\\\").replace('\'', "''"),
            WarehouseBackend::Postgres => value.replace('\'', "''"),
        };
        format!("'{escaped}'")
    }

    fn point(&self, lon: &str, lat: &str) -> String {
        match self.0 {
            WarehouseBackend::Snowflake => format!("ST_MAKEPOINT({lon}, {lat})"),
            WarehouseBackend::Postgres => format!("ST_SetSRID(ST_MakePoint({lon}, {lat}), 4326)"),
        }
    }

    /// Geometry expression as GeoJSON text.
    fn geojson(&self, expr: &str) -> String {
        match self.0 {
            // GEOGRAPHY_OUTPUT_FORMAT is pinned to GeoJSON for the session
            WarehouseBackend::Snowflake => expr.to_string(),
            WarehouseBackend::Postgres => format!("ST_AsGeoJSON({expr})"),
        }
    }

    fn area_m2(&self, expr: &str) -> String {
        match self.0 {
            WarehouseBackend::Snowflake => format!("ST_AREA({expr})"),
            WarehouseBackend::Postgres => format!("ST_Area(({expr})::geography)"),
        }
    }

    fn distance_m(&self, a: &str, b: &str) -> String {
        match self.0 {
            WarehouseBackend::Snowflake => format!("ST_DISTANCE({a}, {b})"),
            WarehouseBackend::Postgres => {
                format!("ST_Distance(({a})::geography, ({b})::geography)")
            }
        }
    }

    fn round2(&self, expr: &str) -> String {
        match self.0 {
            WarehouseBackend::Snowflake => format!("ROUND({expr}, 2)"),
            WarehouseBackend::Postgres => format!("ROUND(({expr})::numeric, 2)::float8"),
        }
    }

    fn float(&self, expr: &str) -> String {
        match self.0 {
            WarehouseBackend::Snowflake => expr.to_string(),
            WarehouseBackend::Postgres => format!("({expr})::float8"),
        }
    }

    fn filter(&self, params: &AnalysisParams) -> String {
        format!(
            "o.primary_city = {} AND EXTRACT(YEAR FROM o.date) = {}",
            self.string_literal(&params.city),
            params.year
        )
    }

    /// CTE over the top-selling locations as points.
    fn top_locations_cte(&self, params: &AnalysisParams) -> String {
        format!(
            "WITH _top_locations AS (\
             SELECT o.location_id, {point} AS geo_point, SUM(o.price) AS total_sales_usd \
             FROM {table} o \
             WHERE {filter} \
             GROUP BY o.location_id, o.latitude, o.longitude \
             ORDER BY total_sales_usd DESC \
             LIMIT {limit})",
            point = self.point("o.longitude", "o.latitude"),
            table = params.orders_table,
            filter = self.filter(params),
            limit = params.top_n,
        )
    }
}

fn top_locations_sql(params: &AnalysisParams, d: Dialect) -> String {
    format!(
        "SELECT o.location_id AS \"{id}\", o.location_name AS \"{name}\", \
         {lon} AS \"{lon_col}\", {lat} AS \"{lat_col}\", {sales} AS \"{sales_col}\" \
         FROM {table} o \
         WHERE {filter} \
         GROUP BY o.location_id, o.location_name, o.longitude, o.latitude \
         ORDER BY \"{sales_col}\" DESC \
         LIMIT {limit}",
        id = columns::LOCATION_ID,
        name = columns::LOCATION_NAME,
        lon = d.float("o.longitude"),
        lon_col = columns::LONGITUDE,
        lat = d.float("o.latitude"),
        lat_col = columns::LATITUDE,
        sales = d.float("SUM(o.price)"),
        sales_col = columns::TOTAL_SALES_USD,
        table = params.orders_table,
        filter = d.filter(params),
        limit = params.top_n,
    )
}

fn bounding_area_sql(params: &AnalysisParams, d: Dialect) -> String {
    let collection = "ST_COLLECT(tl.geo_point)";
    let envelope = format!("ST_ENVELOPE({collection})");
    format!(
        "{cte} \
         SELECT ST_NPOINTS({collection}) AS \"{count_col}\", \
         {points} AS \"{points_col}\", \
         {polygon} AS \"{polygon_col}\", \
         {area} AS \"{area_col}\" \
         FROM _top_locations tl",
        cte = d.top_locations_cte(params),
        count_col = columns::COUNT_POINTS_IN_COLLECTION,
        points = d.geojson(collection),
        points_col = columns::COLLECTION_OF_POINTS,
        polygon = d.geojson(&envelope),
        polygon_col = columns::MINIMUM_BOUNDING_POLYGON,
        area = d.round2(&format!("{} / 1000000", d.area_m2(&envelope))),
        area_col = columns::AREA_IN_SQ_KILOMETERS,
    )
}

fn centroid_sql(params: &AnalysisParams, d: Dialect) -> String {
    let collection = "ST_COLLECT(tl.geo_point)";
    format!(
        "{cte} \
         SELECT {points} AS \"{points_col}\", {center} AS \"{center_col}\" \
         FROM _top_locations tl",
        cte = d.top_locations_cte(params),
        points = d.geojson(collection),
        points_col = columns::COLLECT_POINTS,
        center = d.geojson(&format!("ST_CENTROID({collection})")),
        center_col = columns::GEOMETRIC_CENTER_POINT,
    )
}

fn farthest_locations_sql(params: &AnalysisParams, d: Dialect, reference: LatLon) -> String {
    let reference_point = d.point(&reference.lon.to_string(), &reference.lat.to_string());
    let distance = d.distance_m(&d.point("ll.longitude", "ll.latitude"), &reference_point);
    format!(
        "WITH _city_locations AS (\
         SELECT DISTINCT o.location_id, o.location_name, o.longitude, o.latitude \
         FROM {table} o \
         WHERE {filter}) \
         SELECT ll.location_id AS \"{id}\", ll.location_name AS \"{name}\", \
         {lon} AS \"{lon_col}\", {lat} AS \"{lat_col}\", \
         {km} AS \"{km_col}\" \
         FROM _city_locations ll \
         ORDER BY \"{km_col}\" DESC \
         LIMIT {limit}",
        table = params.orders_table,
        filter = d.filter(params),
        id = columns::LOCATION_ID,
        name = columns::LOCATION_NAME,
        lon = d.float("ll.longitude"),
        lon_col = columns::LONGITUDE,
        lat = d.float("ll.latitude"),
        lat_col = columns::LATITUDE,
        km = d.round2(&format!("{distance} / 1000")),
        km_col = columns::KILOMETER_FROM_TOP_SELLING_CENTER,
        limit = params.farthest_limit,
    )
}
