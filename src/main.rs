//! Segment Membership Engine
//!
//! Two services in one binary:
//! - segmentation: accepts membership writes and publishes them to Redpanda
//! - estimation: consumes the topic into ClickHouse and answers count queries

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use api::{router, AppState};
use clickhouse_client::{ClickHouseClient, ClickHouseConfig, ClickHouseSegmentRepository};
use redpanda::{BatchConsumer, EventPublisher, Producer, RedpandaConfig, RedpandaConsumerGroup};
use telemetry::{health, init_tracing_from_env};
use worker::IngestionCoordinator;

/// Which services this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    Segmentation,
    Estimation,
    #[default]
    All,
}

impl Role {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "segmentation" => Ok(Self::Segmentation),
            "estimation" => Ok(Self::Estimation),
            "all" => Ok(Self::All),
            other => bail!("Unknown role '{}', expected segmentation, estimation or all", other),
        }
    }

    fn writes(self) -> bool {
        matches!(self, Self::Segmentation | Self::All)
    }

    fn reads(self) -> bool {
        matches!(self, Self::Estimation | Self::All)
    }
}

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    role: Role,

    #[serde(default)]
    redpanda: RedpandaConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            role: Role::default(),
            redpanda: RedpandaConfig::default(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires explicit crypto provider selection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        bail!("Failed to install rustls crypto provider");
    }

    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Segment Engine v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config()?;
    if let Some(role) = std::env::args().nth(1) {
        config.role = Role::parse(&role)?;
    }

    info!(
        role = ?config.role,
        brokers = ?config.redpanda.brokers,
        topic = %config.redpanda.topic,
        group_id = %config.redpanda.group_id,
        "Loaded config"
    );

    check_health(&config).await;

    let shutdown = CancellationToken::new();
    let mut state = AppState::new();

    // Write path
    let producer: Option<Arc<Producer>> = if config.role.writes() {
        let producer = Arc::new(
            Producer::new(config.redpanda.clone())
                .await
                .context("Failed to create Redpanda producer")?,
        );
        state = state.with_segmentation(producer.clone());
        Some(producer)
    } else {
        None
    };

    // Read path and ingestion pipeline
    let pipeline = if config.role.reads() {
        let clickhouse = ClickHouseClient::new(config.clickhouse.clone());

        if config.clickhouse.init_schema {
            if let Err(e) = clickhouse_client::schema::init_schema(&clickhouse).await {
                error!("Failed to initialize ClickHouse schema: {}", e);
                // Continue anyway - schema might already exist
            }
        }

        let repository = Arc::new(ClickHouseSegmentRepository::new(clickhouse));
        state = state.with_estimation(repository.clone());

        let group = RedpandaConsumerGroup::new(config.redpanda.clone())
            .await
            .context("Failed to create Redpanda consumer group")?;
        let source = Arc::new(BatchConsumer::new(group, &config.redpanda));

        let coordinator = Arc::new(IngestionCoordinator::new(source, repository));
        let handle = tokio::spawn({
            let coordinator = coordinator.clone();
            let cancel = shutdown.clone();
            async move {
                if let Err(e) = coordinator.run(cancel).await {
                    error!("Ingestion coordinator failed: {}", e);
                }
            }
        });

        Some((coordinator, handle))
    } else {
        None
    };

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_token.cancel();
        })
        .await
        .context("Server error")?;

    info!("Shutting down...");
    shutdown.cancel();

    if let Some((coordinator, handle)) = pipeline {
        coordinator.stop().await;
        if let Err(e) = handle.await {
            error!("Ingestion coordinator task panicked: {}", e);
        }
    }

    if let Some(producer) = producer {
        producer.stop().await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("INGESTION")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // The config crate's nested parsing doesn't work reliably with underscored field names
    if let Ok(role) = std::env::var("INGESTION_ROLE") {
        config.role = Role::parse(&role)?;
    }
    if let Ok(brokers) = std::env::var("INGESTION_REDPANDA_BROKERS") {
        config.redpanda.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(topic) = std::env::var("INGESTION_REDPANDA_TOPIC") {
        config.redpanda.topic = topic;
    }
    if let Ok(group_id) = std::env::var("INGESTION_REDPANDA_GROUP_ID") {
        config.redpanda.group_id = group_id;
    }
    if let Ok(username) = std::env::var("INGESTION_REDPANDA_SASL_USERNAME") {
        config.redpanda.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("INGESTION_REDPANDA_SASL_PASSWORD") {
        config.redpanda.sasl_password = Some(password);
    }
    if let Some(batch_size) = parse_env("INGESTION_REDPANDA_BATCH_SIZE") {
        config.redpanda.batch_size = batch_size;
    }
    if let Some(flush_interval_ms) = parse_env("INGESTION_REDPANDA_FLUSH_INTERVAL_MS") {
        config.redpanda.flush_interval_ms = flush_interval_ms;
    }

    if let Ok(url) = std::env::var("INGESTION_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("INGESTION_CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("INGESTION_CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("INGESTION_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }
    if let Ok(table) = std::env::var("INGESTION_CLICKHOUSE_TABLE") {
        config.clickhouse.table = table;
    }
    if let Ok(view) = std::env::var("INGESTION_CLICKHOUSE_VIEW") {
        config.clickhouse.view = view;
    }

    Ok(config)
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Ignoring unparsable environment override");
            None
        }
    }
}

/// Check component health on startup.
///
/// Only the dependencies the configured role uses are checked and tracked.
async fn check_health(config: &Config) {
    let redpanda_healthy = redpanda::health::check_connection(&config.redpanda).await;
    if redpanda_healthy {
        health().redpanda.set_healthy();
        info!("Redpanda connection: healthy");
    } else {
        health().redpanda.set_unhealthy("Connection failed");
        error!("Redpanda connection: unhealthy");
    }

    let topics = [config.redpanda.topic.as_str()];
    let missing = redpanda::health::missing_topics(&config.redpanda, &topics).await;
    if !missing.is_empty() {
        warn!(missing = ?missing, "Configured topic not found, create it before use");
    }

    if config.role.reads() {
        let clickhouse = ClickHouseClient::new(config.clickhouse.clone());
        if clickhouse_client::health::check_connection(&clickhouse).await {
            health().clickhouse.set_healthy();
            info!("ClickHouse connection: healthy");
        } else {
            health().clickhouse.set_unhealthy("Connection failed");
            error!("ClickHouse connection: unhealthy");
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
