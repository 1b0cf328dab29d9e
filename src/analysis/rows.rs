//! Typed records for each analysis result.

use super::columns;
use crate::canvas::LatLon;
use crate::error::Result;
use crate::geometry;
use crate::table::{FromTableRow, TableRow};

/// A top-selling location.
#[derive(Debug, Clone, PartialEq)]
pub struct TopLocationRow {
    pub location_id: String,
    pub location_name: String,
    pub position: LatLon,
    /// Sales total exactly as the warehouse returned it, for labels.
    pub total_sales_usd: String,
}

impl FromTableRow for TopLocationRow {
    const COLUMNS: &'static [&'static str] = &[
        columns::LOCATION_ID,
        columns::LOCATION_NAME,
        columns::LONGITUDE,
        columns::LATITUDE,
        columns::TOTAL_SALES_USD,
    ];

    fn from_row(row: &TableRow<'_>) -> Result<Self> {
        Ok(Self {
            location_id: row.get_display(columns::LOCATION_ID)?,
            location_name: row.get_display(columns::LOCATION_NAME)?,
            position: LatLon::new(
                row.get_f64(columns::LATITUDE)?,
                row.get_f64(columns::LONGITUDE)?,
            ),
            total_sales_usd: row.get_display(columns::TOTAL_SALES_USD)?,
        })
    }
}

impl TopLocationRow {
    pub fn label(&self) -> String {
        format!(
            "Location Name: {}\nTotal Sales: {}",
            self.location_name, self.total_sales_usd
        )
    }
}

/// The envelope around the top-selling locations.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingAreaRow {
    pub point_count: i64,
    /// Outer ring of the envelope, as encoded.
    pub ring: Vec<LatLon>,
    pub area_sq_km: f64,
}

impl FromTableRow for BoundingAreaRow {
    const COLUMNS: &'static [&'static str] = &[
        columns::COUNT_POINTS_IN_COLLECTION,
        columns::MINIMUM_BOUNDING_POLYGON,
        columns::AREA_IN_SQ_KILOMETERS,
    ];

    fn from_row(row: &TableRow<'_>) -> Result<Self> {
        Ok(Self {
            point_count: row.get_i64(columns::COUNT_POINTS_IN_COLLECTION)?,
            ring: geometry::decode_polygon(row.get(columns::MINIMUM_BOUNDING_POLYGON)?)?,
            area_sq_km: row.get_f64(columns::AREA_IN_SQ_KILOMETERS)?,
        })
    }

    fn is_absent(row: &TableRow<'_>) -> bool {
        row.is_null(columns::MINIMUM_BOUNDING_POLYGON)
    }
}

/// The geometric center of the top-selling locations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentroidRow {
    pub center: LatLon,
}

impl FromTableRow for CentroidRow {
    const COLUMNS: &'static [&'static str] = &[columns::GEOMETRIC_CENTER_POINT];

    fn from_row(row: &TableRow<'_>) -> Result<Self> {
        Ok(Self {
            center: geometry::decode_point(row.get(columns::GEOMETRIC_CENTER_POINT)?)?,
        })
    }

    fn is_absent(row: &TableRow<'_>) -> bool {
        row.is_null(columns::GEOMETRIC_CENTER_POINT)
    }
}

/// A location ranked by distance from the reference point.
#[derive(Debug, Clone, PartialEq)]
pub struct FarthestLocationRow {
    pub location_id: String,
    pub location_name: String,
    pub position: LatLon,
    pub kilometers: String,
}

impl FromTableRow for FarthestLocationRow {
    const COLUMNS: &'static [&'static str] = &[
        columns::LOCATION_ID,
        columns::LOCATION_NAME,
        columns::LONGITUDE,
        columns::LATITUDE,
        columns::KILOMETER_FROM_TOP_SELLING_CENTER,
    ];

    fn from_row(row: &TableRow<'_>) -> Result<Self> {
        Ok(Self {
            location_id: row.get_display(columns::LOCATION_ID)?,
            location_name: row.get_display(columns::LOCATION_NAME)?,
            position: LatLon::new(
                row.get_f64(columns::LATITUDE)?,
                row.get_f64(columns::LONGITUDE)?,
            ),
            kilometers: row.get_display(columns::KILOMETER_FROM_TOP_SELLING_CENTER)?,
        })
    }
}

impl FarthestLocationRow {
    pub fn label(&self) -> String {
        format!(
            "Location Name: {}\nDistance From Center Point: {}",
            self.location_name, self.kilometers
        )
    }
}
