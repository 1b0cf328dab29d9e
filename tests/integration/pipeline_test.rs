//! Pipeline integration tests.
//!
//! Runs full dashboard passes against in-memory warehouses and checks the
//! rendered blocks and the accumulated map.

use async_trait::async_trait;
use sales_atlas::analysis::Analysis;
use sales_atlas::canvas::{Layer, LatLon, MarkerStyle};
use sales_atlas::config::{CentroidSource, Config};
use sales_atlas::error::{AtlasError, Result};
use sales_atlas::pipeline::{Pipeline, PipelineConfig, PipelineReport, SectionOutcome};
use sales_atlas::render::{Block, Dashboard};
use sales_atlas::warehouse::{
    fixture, ColumnInfo, MockWarehouse, RowSet, Value, WarehouseBackend, WarehouseClient,
};

fn default_config() -> PipelineConfig {
    PipelineConfig::from_config(&Config::default()).unwrap()
}

/// Mock answering everything but the top-locations statement.
fn without_top_locations() -> MockWarehouse {
    MockWarehouse::new()
        .respond_to("KILOMETER_FROM_TOP_SELLING_CENTER", fixture::farthest_locations())
        .respond_to("MINIMUM_BOUNDING_POLYGON", fixture::bounding_area())
        .respond_to("GEOMETRIC_CENTER_POINT", fixture::centroid())
}

async fn run(
    warehouse: &dyn WarehouseClient,
    config: &PipelineConfig,
) -> (Dashboard, PipelineReport) {
    let mut dashboard = Dashboard::new();
    let report = Pipeline::new(warehouse, config).run(&mut dashboard).await;
    (dashboard, report)
}

#[tokio::test]
async fn test_full_pass_accumulates_layers_in_section_order() {
    let warehouse = MockWarehouse::paris_fixture();
    let config = default_config();
    let (dashboard, report) = run(&warehouse, &config).await;

    assert!(report.is_complete());
    assert_eq!(dashboard.errors().count(), 0);

    let maps: Vec<_> = dashboard.maps().collect();
    assert_eq!(maps.len(), 4);
    let layer_counts: Vec<usize> = maps.iter().map(|m| m.layers.len()).collect();
    assert_eq!(layer_counts, vec![3, 4, 5, 7]);

    let last = maps[3];
    let labels: Vec<&str> = last.layers.iter().map(Layer::label).collect();
    assert_eq!(
        labels,
        vec![
            "Location Name: Place de la Bastille\nTotal Sales: 298402",
            "Location Name: Jardin des Plantes\nTotal Sales: 272115.5",
            "Location Name: Canal Saint-Martin\nTotal Sales: 260310.25",
            "Minimum Bounding Area",
            "Top Sales Center Point",
            "Location Name: Porte Maillot\nDistance From Center Point: 6.43",
            "Location Name: Parc Montsouris\nDistance From Center Point: 4.32",
        ]
    );

    match &last.layers[4] {
        Layer::Marker { position, style, .. } => {
            assert_eq!(*position, LatLon::new(48.8568, 2.3649));
            assert_eq!(style.as_ref(), Some(&MarkerStyle::center_point()));
        }
        other => panic!("expected center marker, got {other:?}"),
    }
    match &last.layers[6] {
        Layer::Marker { style, .. } => assert_eq!(style.as_ref(), Some(&MarkerStyle::outlier())),
        other => panic!("expected outlier marker, got {other:?}"),
    }
}

#[tokio::test]
async fn test_section_one_centers_canvas_and_fits_with_padding() {
    let warehouse = MockWarehouse::paris_fixture();
    let config = default_config();
    let (dashboard, _) = run(&warehouse, &config).await;

    let first = dashboard.maps().next().unwrap();
    let expected = LatLon::mean(&[
        LatLon::new(48.8532, 2.3691),
        LatLon::new(48.8440, 2.3597),
        LatLon::new(48.8710, 2.3656),
    ])
    .unwrap();
    assert_eq!(first.center, expected);
    assert_eq!(first.zoom, 13);
    assert_eq!(first.fit_padding, Some([30, 30]));

    let bounds = first.bounds.unwrap();
    assert_eq!(bounds.south_west, LatLon::new(48.8440, 2.3597));
    assert_eq!(bounds.north_east, LatLon::new(48.8710, 2.3691));
}

#[tokio::test]
async fn test_bounding_section_keeps_bounds_and_last_section_refits() {
    let warehouse = MockWarehouse::paris_fixture();
    let config = default_config();
    let (dashboard, _) = run(&warehouse, &config).await;

    let maps: Vec<_> = dashboard.maps().collect();
    // Sections 2 and 3 do not refit
    assert_eq!(maps[1].bounds, maps[0].bounds);
    assert_eq!(maps[2].bounds, maps[0].bounds);

    let last = maps[3];
    assert_eq!(last.fit_padding, None);
    let bounds = last.bounds.unwrap();
    for layer in &last.layers {
        if let Layer::Marker { position, .. } = layer {
            assert!(bounds.contains(*position), "{position:?} outside {bounds:?}");
        }
    }
    assert_eq!(bounds.south_west, LatLon::new(48.8222, 2.2825));
}

#[tokio::test]
async fn test_blocks_follow_section_order() {
    let warehouse = MockWarehouse::paris_fixture();
    let config = default_config();
    let (dashboard, _) = run(&warehouse, &config).await;

    let headers: Vec<&str> = dashboard
        .blocks()
        .iter()
        .filter_map(|block| match block {
            Block::Header { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        headers,
        vec![
            "Top 10 Areas by Total Sales",
            "Minimum Bounding Area",
            "Top Selling Locations Center Point",
            "Farthest Locations From Top Selling Center Point",
        ]
    );
    assert!(matches!(dashboard.blocks()[0], Block::Title { .. }));

    // Each section renders its table before its map
    let kinds: Vec<&str> = dashboard
        .blocks()
        .iter()
        .filter_map(|block| match block {
            Block::Table { .. } => Some("table"),
            Block::Map { .. } => Some("map"),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["table", "map", "table", "map", "table", "map", "table", "map"]
    );
}

#[tokio::test]
async fn test_empty_results_render_empty_tables_without_layers() {
    let warehouse = MockWarehouse::new();
    let config = default_config();
    let (dashboard, report) = run(&warehouse, &config).await;

    for analysis in Analysis::ALL {
        assert_eq!(report.outcome(analysis), Some(&SectionOutcome::Empty));
    }
    assert!(report.is_complete());
    assert_eq!(report.layer_count, 0);
    assert_eq!(dashboard.errors().count(), 0);

    let tables: Vec<_> = dashboard
        .blocks()
        .iter()
        .filter_map(|block| match block {
            Block::Table { table } => Some(table),
            _ => None,
        })
        .collect();
    assert_eq!(tables.len(), 4);
    assert!(tables.iter().all(|t| t.is_empty()));
    assert_eq!(
        tables[0].column_names(),
        vec!["LOCATION_ID", "LOCATION_NAME", "LONGITUDE", "LATITUDE", "TOTAL_SALES_USD"]
    );

    let first = dashboard.maps().next().unwrap();
    assert_eq!(first.center, LatLon::new(48.85681511418426, 2.364853294993676));
    assert_eq!(first.bounds, None);
}

#[tokio::test]
async fn test_null_aggregates_count_as_empty_sections() {
    let bounding = RowSet::with_data(
        vec![
            ColumnInfo::new("COUNT_POINTS_IN_COLLECTION", "fixed"),
            ColumnInfo::new("MINIMUM_BOUNDING_POLYGON", "geography"),
            ColumnInfo::new("AREA_IN_SQ_KILOMETERS", "real"),
        ],
        vec![vec![Value::Null, Value::Null, Value::Null]],
    );
    let centroid = RowSet::with_data(
        vec![ColumnInfo::new("GEOMETRIC_CENTER_POINT", "geography")],
        vec![vec![Value::Null]],
    );
    let warehouse = MockWarehouse::new()
        .respond_to("MINIMUM_BOUNDING_POLYGON", bounding)
        .respond_to("GEOMETRIC_CENTER_POINT", centroid);
    let config = default_config();
    let (dashboard, report) = run(&warehouse, &config).await;

    for analysis in Analysis::ALL {
        assert_eq!(report.outcome(analysis), Some(&SectionOutcome::Empty));
    }
    assert_eq!(dashboard.errors().count(), 0);
    assert_eq!(dashboard.maps().count(), 4);
    assert_eq!(report.layer_count, 0);

    // The NULL row is still shown as returned
    let tables: Vec<_> = dashboard
        .blocks()
        .iter()
        .filter_map(|block| match block {
            Block::Table { table } => Some(table),
            _ => None,
        })
        .collect();
    assert_eq!(tables[1].row_count(), 1);
    assert_eq!(tables[2].row_count(), 1);
}

#[tokio::test]
async fn test_failed_first_section_does_not_stop_later_sections() {
    let warehouse = without_top_locations().fail_on("TOTAL_SALES_USD", "Object does not exist");
    let config = default_config();
    let (dashboard, report) = run(&warehouse, &config).await;

    assert_eq!(
        report.outcome(Analysis::TopLocations),
        Some(&SectionOutcome::Failed {
            message: "Query error: Object does not exist".to_string()
        })
    );
    assert_eq!(
        report.outcome(Analysis::BoundingArea),
        Some(&SectionOutcome::Rendered {
            rows: 1,
            layers_added: 1
        })
    );
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.layer_count, 4);
    assert_eq!(
        dashboard.errors().collect::<Vec<_>>(),
        vec!["Query error: Object does not exist"]
    );

    // Canvas was created by the bounding section around the envelope
    let first = dashboard.maps().next().unwrap();
    assert_eq!(first.layers.len(), 1);
    assert!(!first.layers[0].is_marker());
    assert!((first.center.lat - 48.8548).abs() < 1e-9);
}

#[tokio::test]
async fn test_malformed_polygon_skips_only_that_layer() {
    let bad_polygon = RowSet::with_data(
        vec![
            ColumnInfo::new("COUNT_POINTS_IN_COLLECTION", "fixed"),
            ColumnInfo::new("MINIMUM_BOUNDING_POLYGON", "geography"),
            ColumnInfo::new("AREA_IN_SQ_KILOMETERS", "fixed"),
        ],
        vec![vec![
            Value::Int(3),
            Value::from(r#"{"coordinates":[[[2.3597,48.844],[2.3691,48.871],[2.3597,48.844]]]}"#),
            Value::Float(2.07),
        ]],
    );
    let warehouse = MockWarehouse::new()
        .respond_to("KILOMETER_FROM_TOP_SELLING_CENTER", fixture::farthest_locations())
        .respond_to("MINIMUM_BOUNDING_POLYGON", bad_polygon)
        .respond_to("GEOMETRIC_CENTER_POINT", fixture::centroid())
        .respond_to("TOTAL_SALES_USD", fixture::top_locations());
    let config = default_config();
    let (dashboard, report) = run(&warehouse, &config).await;

    let maps: Vec<_> = dashboard.maps().collect();
    // Layer count unchanged by the bounding section
    assert_eq!(maps[0].layers.len(), 3);
    assert_eq!(maps[1].layers.len(), 3);
    assert_eq!(report.layer_count, 6);

    match report.outcome(Analysis::BoundingArea) {
        Some(SectionOutcome::Failed { message }) => assert!(message.contains("type")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(
        report.outcome(Analysis::FarthestLocations),
        Some(&SectionOutcome::Rendered {
            rows: 2,
            layers_added: 2
        })
    );
}

#[tokio::test]
async fn test_missing_centroid_falls_back_to_fixed_point() {
    let warehouse = MockWarehouse::new()
        .respond_to("KILOMETER_FROM_TOP_SELLING_CENTER", fixture::farthest_locations())
        .respond_to("MINIMUM_BOUNDING_POLYGON", fixture::bounding_area())
        .respond_to("TOTAL_SALES_USD", fixture::top_locations());
    let config = default_config();
    assert_eq!(config.centroid_source, CentroidSource::Computed);

    let (_, report) = run(&warehouse, &config).await;

    assert_eq!(report.outcome(Analysis::Centroid), Some(&SectionOutcome::Empty));
    let executed = warehouse.executed();
    assert!(executed[3].contains("ST_MAKEPOINT(2.364853294993676, 48.85681511418426)"));
}

#[tokio::test]
async fn test_postgres_dialect_passes_through_pipeline() {
    let warehouse = MockWarehouse::paris_fixture().with_backend(WarehouseBackend::Postgres);
    let config = default_config();
    let (_, report) = run(&warehouse, &config).await;

    assert!(report.is_complete());
    let executed = warehouse.executed();
    assert!(executed[1].contains("ST_AsGeoJSON"));
    assert!(executed[3].contains("ST_SetSRID(ST_MakePoint(2.3649, 48.8568), 4326)"));
}

/// Warehouse whose session drops after the first statement.
struct DroppingWarehouse;

#[async_trait]
impl WarehouseClient for DroppingWarehouse {
    fn backend(&self) -> WarehouseBackend {
        WarehouseBackend::Snowflake
    }

    async fn execute_query(&self, sql: &str) -> Result<RowSet> {
        if sql.contains("TOTAL_SALES_USD") && !sql.contains("MINIMUM_BOUNDING_POLYGON") {
            Ok(fixture::top_locations())
        } else {
            Err(AtlasError::connection("session expired"))
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_connection_loss_skips_remaining_sections() {
    let config = default_config();
    let (dashboard, report) = run(&DroppingWarehouse, &config).await;

    assert_eq!(report.fatal.as_deref(), Some("Connection error: session expired"));
    assert!(matches!(
        report.outcome(Analysis::TopLocations),
        Some(SectionOutcome::Rendered { .. })
    ));
    assert!(matches!(
        report.outcome(Analysis::BoundingArea),
        Some(SectionOutcome::Failed { .. })
    ));
    assert_eq!(report.outcome(Analysis::Centroid), Some(&SectionOutcome::Skipped));
    assert_eq!(
        report.outcome(Analysis::FarthestLocations),
        Some(&SectionOutcome::Skipped)
    );
    assert_eq!(dashboard.errors().count(), 1);
    assert!(!report.is_complete());
}
