//! ClickHouse for the store suite.
//!
//! Redpanda never runs in a container here; the pipeline suites use
//! in-memory consumer groups and publishers instead.

use clickhouse_client::{health::check_connection, schema::init_schema, ClickHouseClient, ClickHouseConfig};
use std::time::{Duration, Instant};
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use crate::fixtures::unique_segment;

const DATABASE: &str = "segments";
const HTTP_PORT: u16 = 8123;

/// A reachable ClickHouse server: a fresh container, or the one named by
/// `SEGMENT_TEST_CLICKHOUSE_URL` (with `_DB`, `_USER`, `_PASSWORD`).
pub struct ClickHouseServer {
    _container: Option<ContainerAsync<GenericImage>>,
    base: ClickHouseConfig,
}

impl ClickHouseServer {
    pub async fn start() -> Self {
        let (container, base) = match external_config() {
            Some(config) => (None, config),
            None => {
                let (container, url) = start_container().await;
                let config = ClickHouseConfig {
                    url,
                    database: DATABASE.to_string(),
                    username: Some("default".to_string()),
                    ..ClickHouseConfig::default()
                };
                (Some(container), config)
            }
        };

        wait_until_ready(&base, Duration::from_secs(30)).await;

        Self {
            _container: container,
            base,
        }
    }

    /// Store settings with a segment table and count view private to one test.
    pub fn isolated_config(&self) -> ClickHouseConfig {
        let suffix = unique_segment("t").replace('-', "_");
        ClickHouseConfig {
            table: format!("user_segments_{suffix}"),
            view: format!("segment_counts_{suffix}"),
            init_schema: true,
            ..self.base.clone()
        }
    }

    /// A client over a freshly bootstrapped segment table and view.
    pub async fn segment_store(&self) -> ClickHouseClient {
        let client = ClickHouseClient::new(self.isolated_config());
        init_schema(&client)
            .await
            .expect("Failed to create segment table and view");
        client
    }
}

fn external_config() -> Option<ClickHouseConfig> {
    let url = std::env::var("SEGMENT_TEST_CLICKHOUSE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())?;

    Some(ClickHouseConfig {
        url,
        database: std::env::var("SEGMENT_TEST_CLICKHOUSE_DB")
            .unwrap_or_else(|_| DATABASE.to_string()),
        username: std::env::var("SEGMENT_TEST_CLICKHOUSE_USER").ok(),
        password: std::env::var("SEGMENT_TEST_CLICKHOUSE_PASSWORD").ok(),
        ..ClickHouseConfig::default()
    })
}

async fn start_container() -> (ContainerAsync<GenericImage>, String) {
    let container = GenericImage::new("clickhouse/clickhouse-server", "24.3")
        .with_wait_for(WaitFor::seconds(5))
        .with_exposed_port(HTTP_PORT.tcp())
        .with_env_var("CLICKHOUSE_DB", DATABASE)
        .with_env_var("CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT", "1")
        .with_env_var("CLICKHOUSE_USER", "default")
        .with_env_var("CLICKHOUSE_PASSWORD", "")
        .start()
        .await
        .expect("Failed to start ClickHouse");

    let port = container
        .get_host_port_ipv4(HTTP_PORT)
        .await
        .expect("ClickHouse HTTP port not mapped");

    (container, format!("http://127.0.0.1:{port}"))
}

/// Polls the same `SELECT 1` the service runs at startup.
async fn wait_until_ready(config: &ClickHouseConfig, timeout: Duration) {
    let client = ClickHouseClient::new(config.clone());
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if check_connection(&client).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("ClickHouse at {} not ready after {:?}", config.url, timeout);
}
