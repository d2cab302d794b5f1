//! Batch source: group membership plus per-partition assembly behind one channel.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::{Batch, BatchAssembler, BatchConfig, BufferPool};
use crate::config::RedpandaConfig;
use crate::consumer::ConsumerGroup;
use crate::error::{RedpandaError, Result};

/// Idle buffers kept for reuse across sessions.
const MAX_IDLE_BUFFERS: usize = 10;

/// Produces batches of raw payloads until closed.
#[async_trait]
pub trait BatchSource: Send + Sync {
    /// Starts consuming and returns the batch channel.
    ///
    /// The channel closes after `cancel` fires or the source is closed and
    /// every assembler has exited.
    fn consume(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Batch>>;

    /// Stops consuming, closes the group, and waits for the consume loop.
    async fn close(&self) -> Result<()>;
}

/// [`BatchSource`] over a [`ConsumerGroup`].
pub struct BatchConsumer<G: ConsumerGroup> {
    group: Arc<G>,
    batch: BatchConfig,
    channel_capacity: usize,
    rejoin_backoff: Duration,
    pool: Arc<BufferPool>,
    shutdown: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<G: ConsumerGroup> BatchConsumer<G> {
    pub fn new(group: G, config: &RedpandaConfig) -> Self {
        Self::with_settings(
            group,
            config.batch_config(),
            config.channel_capacity,
            config.rejoin_backoff(),
        )
    }

    pub fn with_settings(
        group: G,
        batch: BatchConfig,
        channel_capacity: usize,
        rejoin_backoff: Duration,
    ) -> Self {
        let pool = BufferPool::new(batch.max_size, MAX_IDLE_BUFFERS);
        Self {
            group: Arc::new(group),
            batch,
            channel_capacity: channel_capacity.max(1),
            rejoin_backoff,
            pool,
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn group(&self) -> &G {
        &self.group
    }
}

#[async_trait]
impl<G: ConsumerGroup> BatchSource for BatchConsumer<G> {
    fn consume(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Batch>> {
        let mut shutdown = self.shutdown.lock();
        if shutdown.is_some() {
            return Err(RedpandaError::AlreadyStarted);
        }

        let token = cancel.child_token();
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let handle = tokio::spawn(run_group_loop(
            Arc::clone(&self.group),
            tx,
            token.clone(),
            self.batch.clone(),
            Arc::clone(&self.pool),
            self.rejoin_backoff,
        ));

        *shutdown = Some(token);
        *self.handle.lock() = Some(handle);

        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        let token = self.shutdown.lock().clone();
        if let Some(token) = token {
            token.cancel();
        }

        self.group.close().await?;

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Consume loop panicked");
            }
        }

        Ok(())
    }
}

/// Joins, assembles, and re-joins until cancelled or the group closes.
async fn run_group_loop<G: ConsumerGroup>(
    group: Arc<G>,
    tx: mpsc::Sender<Batch>,
    cancel: CancellationToken,
    batch: BatchConfig,
    pool: Arc<BufferPool>,
    rejoin_backoff: Duration,
) {
    info!("Consume loop starting");

    loop {
        if cancel.is_cancelled() || tx.is_closed() {
            break;
        }

        match group.join(&cancel).await {
            Ok(mut session) => {
                let mut assemblers = JoinSet::new();
                for claim in session.take_claims() {
                    let assembler = BatchAssembler::new(
                        claim.partition(),
                        &batch,
                        pool.acquire(),
                        tx.clone(),
                        cancel.clone(),
                    );
                    assemblers.spawn(assembler.run(claim));
                }

                while let Some(joined) = assemblers.join_next().await {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(RedpandaError::Cancelled)) => debug!("Batch assembler cancelled"),
                        Ok(Err(e)) => warn!(error = %e, "Batch assembler stopped"),
                        Err(e) => error!(error = %e, "Batch assembler panicked"),
                    }
                }

                session.finish().await;

                // A session that keeps ending on its own (e.g. a fetch error on
                // every read) must not spin the join loop.
                if !cancel.is_cancelled() {
                    debug!(
                        backoff_ms = rejoin_backoff.as_millis() as u64,
                        "Group session ended, rejoining"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(rejoin_backoff) => {}
                    }
                }
            }
            Err(e) if e.is_terminal() => {
                info!("Consumer group closed");
                break;
            }
            Err(e) => {
                metrics().group_rejoins.inc();
                warn!(
                    error = %e,
                    backoff_ms = rejoin_backoff.as_millis() as u64,
                    "Consumer group session failed, rejoining"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(rejoin_backoff) => {}
                }
            }
        }
    }

    info!("Consume loop stopped");
}
