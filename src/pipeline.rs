//! Dashboard pipeline.
//!
//! Runs the four analyses in order against one warehouse session, rendering
//! each section's table and a snapshot of the shared map canvas. A failing
//! section shows its error in place of its output and the pass moves on;
//! only a lost connection stops the remaining sections.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::{
    render_sql, Analysis, AnalysisParams, BoundingAreaRow, CentroidRow, FarthestLocationRow,
    TopLocationRow,
};
use crate::canvas::{Canvas, LatLon, MarkerStyle};
use crate::config::{CentroidSource, Config};
use crate::error::{AtlasError, Result};
use crate::render::DashboardRenderer;
use crate::safety::ensure_read_only;
use crate::table::{self, FromTableRow, Table};
use crate::warehouse::WarehouseClient;

/// Everything one pass needs besides the warehouse and the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub params: AnalysisParams,
    pub centroid_source: CentroidSource,
    /// Reference point when no computed centroid is used.
    pub fallback_centroid: LatLon,
    pub title: String,
    pub zoom_start: u8,
    pub width: u32,
    pub fit_padding: [u32; 2],
}

impl PipelineConfig {
    /// Validates the analysis and map sections and builds a pipeline config.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.analysis.validate()?;
        config.map.validate()?;

        let [lon, lat] = config.analysis.fallback_centroid;
        Ok(Self {
            params: AnalysisParams::from_config(&config.analysis)?,
            centroid_source: config.analysis.centroid_source,
            fallback_centroid: LatLon::new(lat, lon),
            title: config.map.title.clone(),
            zoom_start: config.map.zoom_start,
            width: config.map.width,
            fit_padding: config.map.fit_padding,
        })
    }
}

/// How one section ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome {
    /// The table and map were rendered.
    Rendered { rows: usize, layers_added: usize },
    /// The query returned no records; the table was rendered without a layer.
    Empty,
    /// An error was rendered in place of some or all of the section.
    Failed { message: String },
    /// Not run because the connection was lost earlier in the pass.
    Skipped,
}

impl SectionOutcome {
    fn finished(rows: usize, layers_added: usize) -> Self {
        if rows == 0 {
            Self::Empty
        } else {
            Self::Rendered { rows, layers_added }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Skipped)
    }
}

/// Outcome of one section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionReport {
    pub analysis: Analysis,
    pub outcome: SectionOutcome,
}

/// Summary of a dashboard pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub sections: Vec<SectionReport>,
    /// The connection error that ended the pass early, if any.
    pub fatal: Option<String>,
    /// Layers on the canvas at the end of the pass.
    pub layer_count: usize,
}

impl PipelineReport {
    pub fn outcome(&self, analysis: Analysis) -> Option<&SectionOutcome> {
        self.sections
            .iter()
            .find(|s| s.analysis == analysis)
            .map(|s| &s.outcome)
    }

    /// True when every section rendered, possibly empty.
    pub fn is_complete(&self) -> bool {
        self.fatal.is_none() && self.sections.iter().all(|s| !s.outcome.is_failure())
    }

    pub fn failed_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| s.outcome.is_failure())
            .count()
    }

    /// The error the pass as a whole ends with.
    ///
    /// Set when the connection was lost, or when no section succeeded.
    pub fn pass_error(&self) -> Option<AtlasError> {
        if let Some(message) = &self.fatal {
            return Some(AtlasError::connection(message.clone()));
        }
        if !self.sections.is_empty() && self.failed_count() == self.sections.len() {
            return Some(AtlasError::query(format!(
                "All {} dashboard sections failed",
                self.sections.len()
            )));
        }
        None
    }

    pub fn log_summary(&self) {
        for section in &self.sections {
            match &section.outcome {
                SectionOutcome::Rendered { rows, layers_added } => {
                    info!(section = %section.analysis, rows, layers_added, "Section rendered")
                }
                SectionOutcome::Empty => info!(section = %section.analysis, "Section empty"),
                SectionOutcome::Failed { message } => {
                    warn!(section = %section.analysis, error = %message, "Section failed")
                }
                SectionOutcome::Skipped => warn!(section = %section.analysis, "Section skipped"),
            }
        }
        info!(
            layers = self.layer_count,
            failed = self.failed_count(),
            "Dashboard pass finished"
        );
    }
}

/// State carried from section to section.
#[derive(Debug, Default)]
struct PassState {
    canvas: Option<Canvas>,
    centroid: Option<LatLon>,
}

impl PassState {
    /// The canvas, created on first use around `anchor` (or `fallback`).
    fn canvas(&mut self, anchor: &[LatLon], fallback: LatLon, zoom: u8) -> &mut Canvas {
        self.canvas.get_or_insert_with(|| {
            Canvas::centered_on(anchor, zoom).unwrap_or_else(|| Canvas::new(fallback, zoom))
        })
    }
}

/// Runs the dashboard sections against one warehouse session.
pub struct Pipeline<'a> {
    warehouse: &'a dyn WarehouseClient,
    config: &'a PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(warehouse: &'a dyn WarehouseClient, config: &'a PipelineConfig) -> Self {
        Self { warehouse, config }
    }

    /// Renders the whole dashboard.
    ///
    /// Never fails as a whole: section errors are rendered and recorded in
    /// the report.
    pub async fn run(&self, renderer: &mut dyn DashboardRenderer) -> PipelineReport {
        info!(
            backend = self.warehouse.backend().as_str(),
            city = %self.config.params.city,
            year = self.config.params.year,
            "Starting dashboard pass"
        );
        renderer.render_title(&self.config.title);

        let mut state = PassState::default();
        let mut report = PipelineReport::default();

        for analysis in Analysis::ALL {
            if report.fatal.is_some() {
                report.sections.push(SectionReport {
                    analysis,
                    outcome: SectionOutcome::Skipped,
                });
                continue;
            }

            let result = match analysis {
                Analysis::TopLocations => self.top_locations(&mut state, renderer).await,
                Analysis::BoundingArea => self.bounding_area(&mut state, renderer).await,
                Analysis::Centroid => self.centroid(&mut state, renderer).await,
                Analysis::FarthestLocations => self.farthest_locations(&mut state, renderer).await,
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(section = %analysis, error = %err, "Section failed");
                    renderer.render_error(&err.to_string());
                    if err.is_fatal() {
                        report.fatal = Some(err.to_string());
                    }
                    SectionOutcome::Failed {
                        message: err.to_string(),
                    }
                }
            };
            report.sections.push(SectionReport { analysis, outcome });
        }

        report.layer_count = state.canvas.as_ref().map_or(0, Canvas::layer_count);
        report
    }

    /// Renders, guards, and runs one analysis statement.
    async fn query<T: FromTableRow>(&self, analysis: Analysis, reference: LatLon) -> Result<Table> {
        let backend = self.warehouse.backend();
        let sql = render_sql(analysis, &self.config.params, backend, reference)?;
        ensure_read_only(&sql, backend)?;
        debug!(section = %analysis, sql = %sql, "Running analysis query");

        let row_set = self.warehouse.execute_query(&sql).await?;
        info!(
            section = %analysis,
            rows = row_set.row_count,
            elapsed_ms = row_set.execution_time.as_millis() as u64,
            "Query finished"
        );
        Ok(table::adapt(row_set).with_fallback_columns(T::COLUMNS))
    }

    fn render_raw_data(&self, table: &Table, renderer: &mut dyn DashboardRenderer) {
        renderer.render_subheader("Raw Data:");
        renderer.render_table(table);
    }

    /// Records a geometry that could not be drawn without failing the section.
    fn skip_geometry(
        &self,
        analysis: Analysis,
        err: &AtlasError,
        renderer: &mut dyn DashboardRenderer,
    ) -> String {
        warn!(section = %analysis, error = %err, "Skipping layer for malformed geometry");
        renderer.render_error(&err.to_string());
        err.to_string()
    }

    async fn top_locations(
        &self,
        state: &mut PassState,
        renderer: &mut dyn DashboardRenderer,
    ) -> Result<SectionOutcome> {
        renderer.render_header(&format!(
            "Top {} Areas by Total Sales",
            self.config.params.top_n
        ));
        let table = self
            .query::<TopLocationRow>(Analysis::TopLocations, self.config.fallback_centroid)
            .await?;
        self.render_raw_data(&table, renderer);
        let rows: Vec<TopLocationRow> = table.typed_rows()?;

        let positions: Vec<LatLon> = rows.iter().map(|row| row.position).collect();
        let canvas = state.canvas(
            &positions,
            self.config.fallback_centroid,
            self.config.zoom_start,
        );
        for row in &rows {
            canvas.add_marker(row.position, row.label(), None);
        }
        canvas.fit_bounds(Some(self.config.fit_padding));

        renderer.render_subheader("Map View:");
        renderer.render_map(&canvas.snapshot(), self.config.width);
        Ok(SectionOutcome::finished(table.row_count(), rows.len()))
    }

    async fn bounding_area(
        &self,
        state: &mut PassState,
        renderer: &mut dyn DashboardRenderer,
    ) -> Result<SectionOutcome> {
        renderer.render_header("Minimum Bounding Area");
        let table = self
            .query::<BoundingAreaRow>(Analysis::BoundingArea, self.config.fallback_centroid)
            .await?;
        self.render_raw_data(&table, renderer);

        let (rows, geometry_error) = match table.typed_rows::<BoundingAreaRow>() {
            Ok(rows) => (rows, None),
            Err(err @ AtlasError::MalformedGeometry(_)) => (
                Vec::new(),
                Some(self.skip_geometry(Analysis::BoundingArea, &err, renderer)),
            ),
            Err(err) => return Err(err),
        };

        for row in &rows {
            renderer.render_text(&format!(
                "{} locations enclosed in {} sq km",
                row.point_count, row.area_sq_km
            ));
        }

        let anchor: Vec<LatLon> = rows.iter().flat_map(|row| row.ring.iter().copied()).collect();
        let canvas = state.canvas(&anchor, self.config.fallback_centroid, self.config.zoom_start);
        for row in &rows {
            canvas.add_polyline(row.ring.clone(), "Minimum Bounding Area");
        }

        renderer.render_subheader("Map View:");
        renderer.render_map(&canvas.snapshot(), self.config.width);

        Ok(match geometry_error {
            Some(message) => SectionOutcome::Failed { message },
            None => SectionOutcome::finished(rows.len(), rows.len()),
        })
    }

    async fn centroid(
        &self,
        state: &mut PassState,
        renderer: &mut dyn DashboardRenderer,
    ) -> Result<SectionOutcome> {
        renderer.render_header("Top Selling Locations Center Point");
        let table = self
            .query::<CentroidRow>(Analysis::Centroid, self.config.fallback_centroid)
            .await?;
        self.render_raw_data(&table, renderer);

        let (rows, geometry_error) = match table.typed_rows::<CentroidRow>() {
            Ok(rows) => (rows, None),
            Err(err @ AtlasError::MalformedGeometry(_)) => (
                Vec::new(),
                Some(self.skip_geometry(Analysis::Centroid, &err, renderer)),
            ),
            Err(err) => return Err(err),
        };

        state.centroid = rows.first().map(|row| row.center);

        let centers: Vec<LatLon> = rows.iter().map(|row| row.center).collect();
        let canvas = state.canvas(&centers, self.config.fallback_centroid, self.config.zoom_start);
        for center in &centers {
            canvas.add_marker(
                *center,
                "Top Sales Center Point",
                Some(MarkerStyle::center_point()),
            );
        }

        renderer.render_subheader("Map View:");
        renderer.render_map(&canvas.snapshot(), self.config.width);

        Ok(match geometry_error {
            Some(message) => SectionOutcome::Failed { message },
            None => SectionOutcome::finished(centers.len(), centers.len()),
        })
    }

    /// The point distances are measured from.
    fn reference_point(&self, state: &PassState) -> (LatLon, &'static str) {
        match (self.config.centroid_source, state.centroid) {
            (CentroidSource::Computed, Some(centroid)) => (centroid, "computed center point"),
            (CentroidSource::Computed, None) => {
                warn!("No computed center point available, using the fallback reference point");
                (self.config.fallback_centroid, "fallback reference point")
            }
            (CentroidSource::Fixed, _) => (self.config.fallback_centroid, "fixed reference point"),
        }
    }

    async fn farthest_locations(
        &self,
        state: &mut PassState,
        renderer: &mut dyn DashboardRenderer,
    ) -> Result<SectionOutcome> {
        renderer.render_header("Farthest Locations From Top Selling Center Point");
        let (reference, source) = self.reference_point(state);
        renderer.render_text(&format!(
            "Distances measured from the {source} ({:.6}, {:.6})",
            reference.lat, reference.lon
        ));

        let table = self
            .query::<FarthestLocationRow>(Analysis::FarthestLocations, reference)
            .await?;
        self.render_raw_data(&table, renderer);
        let rows: Vec<FarthestLocationRow> = table.typed_rows()?;

        let positions: Vec<LatLon> = rows.iter().map(|row| row.position).collect();
        let canvas = state.canvas(&positions, reference, self.config.zoom_start);
        for row in &rows {
            canvas.add_marker(row.position, row.label(), Some(MarkerStyle::outlier()));
        }
        canvas.fit_bounds(None);

        renderer.render_subheader("Map View:");
        renderer.render_map(&canvas.snapshot(), self.config.width);
        Ok(SectionOutcome::finished(table.row_count(), rows.len()))
    }
}
