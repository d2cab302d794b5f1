//! Producer gateway for segment events.

use async_trait::async_trait;
use chrono::Utc;
use engine_core::SegmentEvent;
use rskafka::{
    client::{
        partition::{PartitionClient, UnknownTopicHandling},
        Client,
    },
    record::Record,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::client::{connect, topic_partitions};
use crate::config::RedpandaConfig;
use crate::error::{RedpandaError, Result};

/// Publishes segment events to the topic.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Serializes and sends one event, waiting for every in-sync replica.
    async fn publish(&self, event: &SegmentEvent) -> Result<()>;

    /// Waits for in-flight sends and releases the transport.
    async fn stop(&self);
}

/// Redpanda-backed [`EventPublisher`].
///
/// Events are spread round-robin across the topic's partitions. rskafka
/// always produces with `acks=all`.
pub struct Producer {
    config: RedpandaConfig,
    client: RwLock<Option<Arc<Client>>>,
    partitions: RwLock<Vec<Arc<PartitionClient>>>,
    next_partition: AtomicUsize,
    gate: PublishGate,
}

impl Producer {
    pub async fn new(config: RedpandaConfig) -> Result<Self> {
        let client = connect(&config).await?;

        info!(
            topic = %config.topic,
            compression = %config.compression,
            "Producer created"
        );

        Ok(Self {
            config,
            client: RwLock::new(Some(Arc::new(client))),
            partitions: RwLock::new(Vec::new()),
            next_partition: AtomicUsize::new(0),
            gate: PublishGate::default(),
        })
    }

    /// Get or create the partition clients for the topic.
    async fn partition_clients(&self) -> Result<Vec<Arc<PartitionClient>>> {
        {
            let cached = self.partitions.read().await;
            if !cached.is_empty() {
                return Ok(cached.clone());
            }
        }

        let mut cached = self.partitions.write().await;
        if !cached.is_empty() {
            return Ok(cached.clone());
        }

        let client = self
            .client
            .read()
            .await
            .clone()
            .ok_or(RedpandaError::Closed)?;

        for partition in topic_partitions(&client, &self.config.topic).await? {
            let partition_client = client
                .partition_client(
                    self.config.topic.clone(),
                    partition,
                    UnknownTopicHandling::Retry,
                )
                .await?;
            cached.push(Arc::new(partition_client));
        }

        debug!(
            topic = %self.config.topic,
            partitions = cached.len(),
            "Partition clients created"
        );

        Ok(cached.clone())
    }

    async fn next_partition_client(&self) -> Result<Arc<PartitionClient>> {
        let clients = self.partition_clients().await?;
        let idx = self.next_partition.fetch_add(1, Ordering::Relaxed) % clients.len();
        Ok(Arc::clone(&clients[idx]))
    }

    async fn send(&self, payload: Vec<u8>) -> Result<()> {
        let client = self.next_partition_client().await?;

        let record = Record {
            key: None,
            value: Some(payload),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let timeout = self.config.request_timeout();
        match tokio::time::timeout(
            timeout,
            client.produce(vec![record], self.config.compression()),
        )
        .await
        {
            Ok(Ok(_offsets)) => Ok(()),
            Ok(Err(e)) => {
                // Leadership may have moved; rebuild partition clients next time.
                self.partitions.write().await.clear();
                Err(e.into())
            }
            Err(_) => Err(RedpandaError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl EventPublisher for Producer {
    async fn publish(&self, event: &SegmentEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        let start = Instant::now();

        let result = self.gate.run(self.send(payload)).await;

        match &result {
            Ok(()) => {
                metrics().events_published.inc();
                debug!(
                    user_id = %event.user_id,
                    segment = %event.segment,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Segment event published"
                );
            }
            Err(e) => {
                metrics().publish_errors.inc();
                error!(
                    topic = %self.config.topic,
                    user_id = %event.user_id,
                    segment = %event.segment,
                    error = %e,
                    "Failed to publish segment event"
                );
            }
        }

        result
    }

    async fn stop(&self) {
        if !self.gate.close().await {
            return;
        }

        self.partitions.write().await.clear();
        self.client.write().await.take();

        info!("Producer stopped");
    }
}

/// Admits publishes until closed. Closing waits for every admitted publish.
///
/// A publish is tracked before it checks the flag, so a close either waits for
/// it or the publish sees the flag and never touches the transport.
#[derive(Debug, Default)]
struct PublishGate {
    closed: AtomicBool,
    in_flight: TaskTracker,
}

impl PublishGate {
    async fn run<T, F>(&self, publish: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let closed = &self.closed;
        self.in_flight
            .track_future(async move {
                if closed.load(Ordering::SeqCst) {
                    return Err(RedpandaError::Closed);
                }
                publish.await
            })
            .await
    }

    /// Closes the gate and waits for admitted publishes. Returns `true` for
    /// the call that closed it.
    async fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        self.in_flight.close();
        self.in_flight.wait().await;
        first
    }
}
