//! Sales Atlas - geospatial sales dashboard for Tasty Bytes.

mod cli;

use cli::Cli;
use sales_atlas::config::Config;
use sales_atlas::error::{AtlasError, Result};
use sales_atlas::logging;
use sales_atlas::pipeline::{Pipeline, PipelineConfig};
use sales_atlas::render::Dashboard;
use sales_atlas::secrets::{self, SecretStorage};
use sales_atlas::warehouse::{self, MockWarehouse, WarehouseClient};
use std::io::Write;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging(&logging::get_log_path());
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {}", path.display());
    }

    let format = cli.parse_output_format().map_err(AtlasError::config)?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_overrides(&mut config)?;
    config.warehouse.apply_env_defaults();

    let pipeline_config = PipelineConfig::from_config(&config)?;
    let warehouse = open_warehouse(&cli, &config).await?;

    let mut dashboard = Dashboard::new();
    let report = Pipeline::new(warehouse.as_ref(), &pipeline_config)
        .run(&mut dashboard)
        .await;

    if let Err(e) = warehouse.close().await {
        warn!("Failed to close warehouse session: {e}");
    }

    report.log_summary();
    write_output(&cli, &dashboard.export(format)?)?;

    match report.pass_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Opens the warehouse session, or the in-memory sample with `--mock`.
async fn open_warehouse(cli: &Cli, config: &Config) -> Result<Box<dyn WarehouseClient>> {
    if cli.mock {
        info!("Using built-in sample data");
        return Ok(Box::new(
            MockWarehouse::paris_fixture().with_backend(config.warehouse.backend),
        ));
    }

    config.warehouse.validate()?;
    let password = secrets::resolve_password(&config.warehouse, &SecretStorage::new())?;
    info!("Connecting to {}", config.warehouse.display_string());
    warehouse::connect(&config.warehouse, password.as_deref()).await
}

fn write_output(cli: &Cli, content: &str) -> Result<()> {
    if cli.writes_to_stdout() {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(content.as_bytes())
            .and_then(|()| stdout.flush())
            .map_err(|e| AtlasError::render(format!("Failed to write dashboard: {e}")))?;
        return Ok(());
    }

    std::fs::write(&cli.output, content)
        .map_err(|e| AtlasError::render(format!("Failed to write {}: {e}", cli.output)))?;
    info!("Dashboard written to {}", cli.output);
    Ok(())
}
