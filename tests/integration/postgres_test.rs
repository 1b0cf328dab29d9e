//! PostGIS integration tests.
//!
//! These need a PostgreSQL database with PostGIS. Set DATABASE_URL to run them.

use sales_atlas::analysis::Analysis;
use sales_atlas::config::Config;
use sales_atlas::pipeline::{Pipeline, PipelineConfig, SectionOutcome};
use sales_atlas::render::Dashboard;
use sales_atlas::warehouse::{PostgresWarehouse, Value, WarehouseClient};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Helper to create a test client.
async fn get_test_client() -> Option<PostgresWarehouse> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .ok()?;
    Some(PostgresWarehouse::from_pool(pool, Duration::from_secs(30)))
}

const SEED: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS postgis",
    "DROP TABLE IF EXISTS atlas_orders_test",
    "CREATE TABLE atlas_orders_test (
        location_id integer,
        location_name text,
        primary_city text,
        longitude numeric(9,6),
        latitude numeric(9,6),
        price numeric(10,2),
        date date
    )",
    "INSERT INTO atlas_orders_test VALUES
        (1, 'Place de la Bastille', 'Paris', 2.369100, 48.853200, 300.00, '2022-03-01'),
        (1, 'Place de la Bastille', 'Paris', 2.369100, 48.853200, 200.00, '2022-04-01'),
        (2, 'Jardin des Plantes', 'Paris', 2.359700, 48.844000, 400.00, '2022-05-01'),
        (3, 'Canal Saint-Martin', 'Paris', 2.365600, 48.871000, 100.00, '2022-06-01'),
        (4, 'Porte Maillot', 'Paris', 2.282500, 48.878000, 50.00, '2022-07-01'),
        (5, 'Alexanderplatz', 'Berlin', 13.413200, 52.521900, 999.00, '2022-07-01'),
        (6, 'Old Bastille', 'Paris', 2.369000, 48.853000, 999.00, '2021-07-01')",
];

async fn seed(client: &PostgresWarehouse) -> bool {
    for sql in SEED {
        if let Err(e) = client.execute_query(sql).await {
            eprintln!("Skipping test: could not seed PostGIS data: {e}");
            return false;
        }
    }
    true
}

fn test_config() -> PipelineConfig {
    let mut config = Config::default();
    config.analysis.orders_table = "atlas_orders_test".to_string();
    config.analysis.top_n = 3;
    PipelineConfig::from_config(&config).unwrap()
}

#[tokio::test]
async fn test_simple_query() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = client
        .execute_query("SELECT 1::int4 AS \"ONE\", 'x'::text AS \"NAME\"")
        .await
        .unwrap();
    assert_eq!(result.columns[0].name, "ONE");
    assert_eq!(result.rows[0][0], Value::Int(1));
    assert_eq!(result.rows[0][1], Value::from("x"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = client
        .execute_query("SELECT 1::int4 AS \"LOCATION_ID\" WHERE false")
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.columns[0].name, "LOCATION_ID");

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_full_pass_against_postgis() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    if !seed(&client).await {
        return;
    }

    let config = test_config();
    let mut dashboard = Dashboard::new();
    let report = Pipeline::new(&client, &config).run(&mut dashboard).await;

    assert!(report.is_complete(), "{report:?}");
    assert_eq!(
        report.outcome(Analysis::TopLocations),
        Some(&SectionOutcome::Rendered {
            rows: 3,
            layers_added: 3
        })
    );
    assert_eq!(
        report.outcome(Analysis::FarthestLocations),
        Some(&SectionOutcome::Rendered {
            rows: 4,
            layers_added: 4
        })
    );
    // 3 top markers, 1 envelope, 1 centroid, 4 distance markers
    assert_eq!(report.layer_count, 9);

    let _ = client.execute_query("DROP TABLE IF EXISTS atlas_orders_test").await;
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_unreadable_column_type_shows_null() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = client
        .execute_query("SELECT 1.5::numeric AS \"AMOUNT\", 'x'::text AS \"NAME\"")
        .await
        .unwrap();
    assert_eq!(result.rows[0][0], Value::Null);
    assert_eq!(result.rows[0][1], Value::from("x"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_city_without_sales_renders_empty_sections() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let setup = [
        "CREATE EXTENSION IF NOT EXISTS postgis",
        "DROP TABLE IF EXISTS atlas_orders_empty_test",
        "CREATE TABLE atlas_orders_empty_test (
            location_id integer,
            location_name text,
            primary_city text,
            longitude numeric(9,6),
            latitude numeric(9,6),
            price numeric(10,2),
            date date
        )",
    ];
    for sql in setup {
        if let Err(e) = client.execute_query(sql).await {
            eprintln!("Skipping test: could not create PostGIS table: {e}");
            return;
        }
    }

    let mut config = Config::default();
    config.analysis.orders_table = "atlas_orders_empty_test".to_string();
    let config = PipelineConfig::from_config(&config).unwrap();
    let mut dashboard = Dashboard::new();
    let report = Pipeline::new(&client, &config).run(&mut dashboard).await;

    // Aggregates over no rows come back as one NULL row
    for analysis in Analysis::ALL {
        assert_eq!(report.outcome(analysis), Some(&SectionOutcome::Empty), "{analysis}");
    }
    assert_eq!(dashboard.errors().count(), 0);
    assert_eq!(report.layer_count, 0);

    let _ = client.execute_query("DROP TABLE IF EXISTS atlas_orders_empty_test").await;
    client.close().await.unwrap();
}
