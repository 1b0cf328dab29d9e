//! Dashboard export tests.
//!
//! Renders the sample dashboard end to end and checks each output format.

use sales_atlas::config::Config;
use sales_atlas::pipeline::{Pipeline, PipelineConfig};
use sales_atlas::render::{Dashboard, OutputFormat};
use sales_atlas::warehouse::MockWarehouse;

async fn sample_dashboard() -> Dashboard {
    let warehouse = MockWarehouse::paris_fixture();
    let config = PipelineConfig::from_config(&Config::default()).unwrap();
    let mut dashboard = Dashboard::new();
    Pipeline::new(&warehouse, &config).run(&mut dashboard).await;
    dashboard
}

#[tokio::test]
async fn test_html_export() {
    let html = sample_dashboard().await.export(OutputFormat::Html).unwrap();

    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<h1>Tasty Bytes: Visualizing Geospatial Data</h1>"));
    assert!(html.contains("<h2>Minimum Bounding Area</h2>"));
    assert_eq!(html.matches("<table>").count(), 4);
    for i in 0..4 {
        assert!(html.contains(&format!("renderMap(\"map-{i}\"")));
    }
    assert!(html.contains("\"icon\":\"triangle-exclamation\""));
    assert!(html.contains("Location Name: Porte Maillot\\nDistance From Center Point: 6.43"));
}

#[tokio::test]
async fn test_json_export() {
    let json = sample_dashboard().await.export(OutputFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    let blocks = value["blocks"].as_array().unwrap();
    assert_eq!(blocks[0]["block"], "title");
    let maps: Vec<&serde_json::Value> = blocks.iter().filter(|b| b["block"] == "map").collect();
    assert_eq!(maps.len(), 4);
    assert_eq!(maps[3]["map"]["layers"].as_array().unwrap().len(), 7);
    assert_eq!(maps[3]["width"], 700);
}

#[tokio::test]
async fn test_text_export() {
    let text = sample_dashboard().await.export(OutputFormat::Text).unwrap();

    assert!(text.starts_with("Tasty Bytes: Visualizing Geospatial Data\n"));
    assert!(text.contains("│ Place de la Bastille"));
    assert!(text.contains("(3 rows)"));
    assert!(text.contains("5 marker(s), 1 polyline(s)"));
    assert!(!text.contains("ERROR:"));
}
