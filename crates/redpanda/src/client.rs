//! Broker connection helpers shared by the producer and the consumer group.

use rskafka::client::{Client, ClientBuilder, Credentials, SaslConfig};
use std::sync::Arc;
use tracing::info;

use crate::config::RedpandaConfig;
use crate::error::{RedpandaError, Result};

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Connects to the bootstrap brokers.
///
/// TLS and SCRAM-SHA-256 are enabled when both SASL credentials are set.
pub async fn connect(config: &RedpandaConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new(config.brokers.clone());

    if let (Some(username), Some(password)) = (&config.sasl_username, &config.sasl_password) {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.clone(),
                password.clone(),
            )));
    }

    let client = builder.build().await?;

    info!(
        brokers = %config.broker_string(),
        tls = config.has_credentials(),
        "Connected to Redpanda"
    );

    Ok(client)
}

/// Sorted partition ids of `topic`.
pub async fn topic_partitions(client: &Client, topic: &str) -> Result<Vec<i32>> {
    let topics = client.list_topics().await?;

    topics
        .into_iter()
        .find(|t| t.name == topic)
        .map(|t| t.partitions.into_iter().collect::<Vec<_>>())
        .filter(|partitions| !partitions.is_empty())
        .ok_or_else(|| RedpandaError::NoPartitions(topic.to_string()))
}
