//! Vitals ingestion service - main entry point
//!
//! Startup order matters: contracts are compiled first, then the database
//! and event log are connected, and only then does the MQTT subscription
//! start. Any failure before the subscription is fatal; nothing is
//! consumed until every downstream dependency is ready.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};
use vitals_ingest::config::Config;
use vitals_ingest::db::Database;
use vitals_ingest::events::{NatsPublisher, RetryPolicy};
use vitals_ingest::health::{HealthServer, HealthState};
use vitals_ingest::observability::init_default_logging;
use vitals_ingest::pipeline::IngestPipeline;
use vitals_ingest::transport::MqttSubscriber;
use vitals_ingest::validation::SchemaValidator;
use vitals_ingest::IngestError;

/// Patient vitals ingestion service
#[derive(Parser)]
#[command(name = "vitals-ingest")]
#[command(about = "MQTT to PostgreSQL/JetStream vitals ingestion service")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion service
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting vitals-ingest v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_service(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<Config, IngestError> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(Config::load_from_file(path)?);
    }

    for path_str in ["ingest.toml", "config/ingest.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(Config::load_from_file(&path)?);
        }
    }

    // No file; the container deployment configures everything through the
    // environment.
    info!("No configuration file found, using environment variables");
    Ok(Config::from_env()?)
}

async fn run_service(config: Config) -> Result<(), IngestError> {
    let mut validator = SchemaValidator::new();
    validator.initialize(&config.contracts)?;
    let validator = Arc::new(validator);
    info!(
        path = %config.contracts.path,
        version = %config.contracts.version,
        "Contracts compiled"
    );

    let database = Database::connect(&config.database).await?;

    let publisher = match NatsPublisher::connect(&config.nats).await {
        Ok(publisher) => publisher,
        Err(e) => {
            database.close().await;
            return Err(e.into());
        }
    };

    let pipeline = Arc::new(IngestPipeline::new(
        validator,
        database.clone(),
        publisher.clone(),
        RetryPolicy::default(),
    ));

    let mut subscriber = match MqttSubscriber::new(config.mqtt.clone()) {
        Ok(subscriber) => subscriber,
        Err(e) => {
            publisher.close().await;
            database.close().await;
            return Err(e.into());
        }
    };
    if let Err(e) = subscriber.connect(pipeline).await {
        subscriber.disconnect().await;
        publisher.close().await;
        database.close().await;
        return Err(e.into());
    }

    let health_state = Arc::new(HealthState {
        database: Arc::new(database.clone()),
        transport: Arc::new(subscriber.monitor()),
        event_log: Arc::new(publisher.clone()),
    });
    let health_server = HealthServer::new(config.service.port, health_state);
    let health_handle = tokio::spawn(async move {
        health_server.start().await;
    });

    info!(
        topic = %config.mqtt.topic,
        port = config.service.port,
        "Service running, waiting for vitals"
    );

    wait_for_shutdown_signal().await;

    info!("Shutdown initiated");
    let grace = Duration::from_secs(config.service.shutdown_grace_secs);

    if timeout(grace, subscriber.disconnect()).await.is_err() {
        warn!("MQTT disconnect did not finish within the grace period");
    }
    if timeout(grace, publisher.close()).await.is_err() {
        warn!("NATS drain did not finish within the grace period");
    }
    if timeout(grace, database.close()).await.is_err() {
        warn!("Database close did not finish within the grace period");
    }
    health_handle.abort();

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let sigint = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = sigint.await;
                info!("Received SIGINT, shutting down");
                return;
            }
        };

        tokio::select! {
            _ = sigint => info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = sigint.await;
        info!("Received SIGINT, shutting down");
    }
}

fn handle_config_command(config: Config, show: bool) -> Result<(), IngestError> {
    if show {
        println!("Current configuration:");
        match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => warn!(error = %e, "Could not render configuration"),
        }
    }

    info!("Configuration validation complete");
    Ok(())
}
