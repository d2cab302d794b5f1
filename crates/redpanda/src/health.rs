//! Redpanda health checks.

use std::collections::HashSet;
use tracing::{debug, error, warn};

use crate::client::connect;
use crate::config::RedpandaConfig;

/// Check Redpanda connection health.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    match connect(config).await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => {
                debug!(topics = topics.len(), "Redpanda connection healthy");
                true
            }
            Err(e) => {
                error!("Failed to list Redpanda topics: {}", e);
                false
            }
        },
        Err(e) => {
            error!("Failed to connect to Redpanda: {}", e);
            false
        }
    }
}

/// Returns the subset of `topics` the cluster does not have.
pub async fn missing_topics(config: &RedpandaConfig, topics: &[&str]) -> Vec<String> {
    let all = || topics.iter().map(|t| t.to_string()).collect();

    let client = match connect(config).await {
        Ok(client) => client,
        Err(_) => return all(),
    };

    match client.list_topics().await {
        Ok(existing) => {
            let existing: HashSet<_> = existing.iter().map(|t| t.name.as_str()).collect();
            let missing: Vec<String> = topics
                .iter()
                .filter(|t| !existing.contains(*t))
                .map(|t| t.to_string())
                .collect();

            if !missing.is_empty() {
                warn!(missing = ?missing, "Redpanda topics not found");
            }
            missing
        }
        Err(_) => all(),
    }
}
