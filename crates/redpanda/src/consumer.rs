//! Consumer group membership.
//!
//! rskafka has no group coordinator support, so a group instance claims every
//! partition of the topic for each session and tracks positions in memory. A
//! periodic metadata read that sees a different partition set ends the
//! session, which the batch consumer treats like a rebalance and re-joins.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use rskafka::client::{
    consumer::{StartOffset, StreamConsumerBuilder},
    partition::{PartitionClient, UnknownTopicHandling},
    Client,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{connect, topic_partitions};
use crate::config::RedpandaConfig;
use crate::error::{RedpandaError, Result};

/// A raw message read from a claimed partition.
#[derive(Debug, Clone)]
pub struct ConsumedMessage {
    pub partition: i32,
    pub offset: i64,
    pub payload: Bytes,
}

/// Next offset to read per partition.
#[derive(Debug, Default)]
pub struct PositionTracker {
    next: Mutex<HashMap<i32, i64>>,
}

impl PositionTracker {
    /// Records `offset` as consumed. Positions never move backwards.
    pub fn mark(&self, partition: i32, offset: i64) {
        let mut next = self.next.lock();
        let entry = next.entry(partition).or_insert(offset + 1);
        *entry = (*entry).max(offset + 1);
    }

    pub fn next_offset(&self, partition: i32) -> Option<i64> {
        self.next.lock().get(&partition).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<i32, i64> {
        self.next.lock().iter().map(|(p, o)| (*p, *o)).collect()
    }
}

/// Message stream of one partition for the life of a session.
pub struct PartitionClaim {
    partition: i32,
    messages: mpsc::Receiver<ConsumedMessage>,
    positions: Arc<PositionTracker>,
}

impl PartitionClaim {
    pub fn new(
        partition: i32,
        messages: mpsc::Receiver<ConsumedMessage>,
        positions: Arc<PositionTracker>,
    ) -> Self {
        Self {
            partition,
            messages,
            positions,
        }
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Next message, or `None` once the session ends.
    pub async fn next(&mut self) -> Option<ConsumedMessage> {
        self.messages.recv().await
    }

    /// Marks `message` consumed for the group.
    pub fn mark(&self, message: &ConsumedMessage) {
        self.positions.mark(self.partition, message.offset);
    }
}

/// One generation of group membership.
pub struct GroupSession {
    claims: Vec<PartitionClaim>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl GroupSession {
    pub fn new(claims: Vec<PartitionClaim>, token: CancellationToken) -> Self {
        Self {
            claims,
            token,
            tasks: Vec::new(),
        }
    }

    /// Background tasks owned by the session, stopped by [`GroupSession::finish`].
    pub fn with_tasks(mut self, tasks: Vec<JoinHandle<()>>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn take_claims(&mut self) -> Vec<PartitionClaim> {
        std::mem::take(&mut self.claims)
    }

    /// Ends the session and waits for its background tasks.
    pub async fn finish(self) {
        self.token.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

#[async_trait]
pub trait ConsumerGroup: Send + Sync + 'static {
    /// Joins the group and claims partitions.
    ///
    /// Returns [`RedpandaError::Closed`] once the group has been closed.
    async fn join(&self, cancel: &CancellationToken) -> Result<GroupSession>;

    /// Leaves the group and releases the transport.
    async fn close(&self) -> Result<()>;
}

/// Group instance backed by a Redpanda cluster.
pub struct RedpandaConsumerGroup {
    config: RedpandaConfig,
    client: RwLock<Option<Arc<Client>>>,
    positions: Arc<PositionTracker>,
    closed: CancellationToken,
}

impl RedpandaConsumerGroup {
    /// Connects to the brokers. A connection failure here is fatal.
    pub async fn new(config: RedpandaConfig) -> Result<Self> {
        let client = connect(&config).await?;

        info!(
            group_id = %config.group_id,
            topic = %config.topic,
            "Consumer group created"
        );

        Ok(Self {
            config,
            client: RwLock::new(Some(Arc::new(client))),
            positions: Arc::new(PositionTracker::default()),
            closed: CancellationToken::new(),
        })
    }

    pub fn positions(&self) -> Arc<PositionTracker> {
        Arc::clone(&self.positions)
    }

    async fn ensure_connected(&self) -> Result<Arc<Client>> {
        {
            let guard = self.client.read().await;
            if let Some(client) = guard.as_ref() {
                return Ok(Arc::clone(client));
            }
        }

        let mut guard = self.client.write().await;
        if let Some(client) = guard.as_ref() {
            return Ok(Arc::clone(client));
        }
        if self.closed.is_cancelled() {
            return Err(RedpandaError::Closed);
        }

        let client = Arc::new(connect(&self.config).await?);
        *guard = Some(Arc::clone(&client));
        Ok(client)
    }

    async fn reset_connection(&self) {
        *self.client.write().await = None;
    }

    async fn claim_partitions(
        &self,
        client: &Client,
        partitions: &[i32],
    ) -> Result<Vec<(i32, Arc<PartitionClient>)>> {
        let mut clients = Vec::with_capacity(partitions.len());
        for &partition in partitions {
            let partition_client = client
                .partition_client(
                    self.config.topic.clone(),
                    partition,
                    UnknownTopicHandling::Retry,
                )
                .await?;
            clients.push((partition, Arc::new(partition_client)));
        }
        Ok(clients)
    }
}

#[async_trait]
impl ConsumerGroup for RedpandaConsumerGroup {
    async fn join(&self, cancel: &CancellationToken) -> Result<GroupSession> {
        if self.closed.is_cancelled() {
            return Err(RedpandaError::Closed);
        }

        let client = self.ensure_connected().await?;
        let claimed = match topic_partitions(&client, &self.config.topic).await {
            Ok(partitions) => partitions,
            Err(e) => {
                self.reset_connection().await;
                return Err(e);
            }
        };
        let partition_clients = self.claim_partitions(&client, &claimed).await?;

        let token = cancel.child_token();
        let fetch = FetchSettings::from(&self.config);
        let mut claims = Vec::with_capacity(partition_clients.len());
        let mut tasks = Vec::with_capacity(partition_clients.len() + 1);

        for (partition, partition_client) in partition_clients {
            let start = self
                .positions
                .next_offset(partition)
                .map(StartOffset::At)
                .unwrap_or_else(|| self.config.start_offset.into());
            let (tx, rx) = mpsc::channel(self.config.batch_size.max(1));

            tasks.push(tokio::spawn(fetch_partition(
                partition_client,
                partition,
                start,
                fetch,
                tx,
                token.clone(),
            )));
            claims.push(PartitionClaim::new(partition, rx, self.positions()));
        }

        tasks.push(tokio::spawn(watch_assignment(
            client,
            self.config.topic.clone(),
            claimed.clone(),
            self.config.metadata_refresh(),
            token.clone(),
            self.closed.clone(),
        )));

        info!(
            group_id = %self.config.group_id,
            topic = %self.config.topic,
            partitions = ?claimed,
            "Joined consumer group"
        );

        Ok(GroupSession::new(claims, token).with_tasks(tasks))
    }

    async fn close(&self) -> Result<()> {
        self.closed.cancel();
        self.reset_connection().await;
        info!(group_id = %self.config.group_id, "Consumer group closed");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct FetchSettings {
    min_bytes: i32,
    max_bytes: i32,
    max_wait_ms: i32,
}

impl From<&RedpandaConfig> for FetchSettings {
    fn from(config: &RedpandaConfig) -> Self {
        Self {
            min_bytes: config.fetch_min_bytes,
            max_bytes: config.fetch_max_bytes,
            max_wait_ms: config.fetch_max_wait_ms,
        }
    }
}

/// Streams one partition into its claim until the session ends.
async fn fetch_partition(
    client: Arc<PartitionClient>,
    partition: i32,
    start: StartOffset,
    fetch: FetchSettings,
    tx: mpsc::Sender<ConsumedMessage>,
    token: CancellationToken,
) {
    let stream = StreamConsumerBuilder::new(client, start)
        .with_min_batch_size(fetch.min_bytes)
        .with_max_batch_size(fetch.max_bytes)
        .with_max_wait_ms(fetch.max_wait_ms)
        .build();
    let mut stream = std::pin::pin!(stream);

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok((record, _high_watermark))) => {
                let message = ConsumedMessage {
                    partition,
                    offset: record.offset,
                    payload: record.record.value.map(Bytes::from).unwrap_or_default(),
                };

                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = tx.send(message) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                warn!(partition, error = %e, "Partition fetch failed, ending session");
                token.cancel();
                break;
            }
            None => break,
        }
    }

    debug!(partition, "Partition fetcher stopped");
}

/// Ends the session when the topic's partition set changes or the group closes.
async fn watch_assignment(
    client: Arc<Client>,
    topic: String,
    claimed: Vec<i32>,
    refresh: Duration,
    token: CancellationToken,
    closed: CancellationToken,
) {
    let mut ticker = interval(refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = closed.cancelled() => {
                token.cancel();
                return;
            }
            _ = ticker.tick() => {}
        }

        match topic_partitions(&client, &topic).await {
            Ok(current) if current != claimed => {
                info!(
                    topic = %topic,
                    previous = ?claimed,
                    current = ?current,
                    "Partition assignment changed, rebalancing"
                );
                token.cancel();
                return;
            }
            Ok(_) => {}
            Err(e) => debug!(topic = %topic, error = %e, "Metadata refresh failed"),
        }
    }
}
