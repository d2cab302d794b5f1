//! Per-partition batch assembly.
//!
//! One [`BatchAssembler`] runs per claimed partition. It buffers raw payloads
//! into a pooled buffer and forwards an owned copy to the shared batch channel
//! once the buffer is full, the flush interval elapses, or the claim ends.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::consumer::{ConsumedMessage, PartitionClaim};
use crate::error::{RedpandaError, Result};

/// Batch assembly settings.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Messages per batch before a flush
    pub max_size: usize,
    /// Flush a partial batch after this long
    pub flush_interval: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 500,
            flush_interval: Some(Duration::from_secs(1)),
        }
    }
}

/// An ordered run of raw payloads from one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    partition: i32,
    payloads: Vec<Bytes>,
}

impl Batch {
    pub fn new(partition: i32, payloads: Vec<Bytes>) -> Self {
        Self {
            partition,
            payloads,
        }
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn payloads(&self) -> &[Bytes] {
        &self.payloads
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn into_payloads(self) -> Vec<Bytes> {
        self.payloads
    }
}

/// Pool of reusable assembly buffers.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<Bytes>>>,
    buffer_capacity: usize,
    max_idle: usize,
}

impl BufferPool {
    pub fn new(buffer_capacity: usize, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            buffer_capacity,
            max_idle,
        })
    }

    /// Takes an empty buffer, allocating if none is idle.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_capacity));

        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Number of buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    fn release(&self, mut buf: Vec<Bytes>) {
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }
}

/// A buffer borrowed from a [`BufferPool`]; returned cleared on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<Bytes>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    pub fn push(&mut self, payload: Bytes) {
        self.buf.push(payload);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Copies the contents out and clears the buffer, keeping its allocation.
    pub fn take_copy(&mut self) -> Vec<Bytes> {
        let copy = self.buf.to_vec();
        self.buf.clear();
        copy
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

enum Step {
    Message(Option<ConsumedMessage>),
    Tick,
    Stop,
}

/// Turns one partition claim into batches on the shared channel.
pub struct BatchAssembler {
    partition: i32,
    max_size: usize,
    flush_interval: Option<Duration>,
    buffer: PooledBuffer,
    out: mpsc::Sender<Batch>,
    cancel: CancellationToken,
}

impl BatchAssembler {
    pub fn new(
        partition: i32,
        config: &BatchConfig,
        buffer: PooledBuffer,
        out: mpsc::Sender<Batch>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            partition,
            max_size: config.max_size.max(1),
            flush_interval: config.flush_interval,
            buffer,
            out,
            cancel,
        }
    }

    /// Drains the claim until it ends or the consumer is cancelled.
    ///
    /// Each message is marked consumed as soon as it is buffered. Whatever is
    /// buffered when the claim ends is flushed before returning.
    pub async fn run(mut self, mut claim: PartitionClaim) -> Result<()> {
        let cancel = self.cancel.clone();
        let mut ticker = self.flush_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            let step = tokio::select! {
                message = claim.next() => Step::Message(message),
                _ = cancel.cancelled() => Step::Stop,
                _ = next_tick(&mut ticker) => Step::Tick,
            };

            match step {
                Step::Message(Some(message)) => {
                    claim.mark(&message);
                    metrics().messages_consumed.inc();
                    trace!(
                        partition = self.partition,
                        offset = message.offset,
                        "Buffered message"
                    );
                    self.buffer.push(message.payload);

                    if self.buffer.len() >= self.max_size {
                        self.flush().await?;
                    }
                }
                Step::Tick => self.flush().await?,
                Step::Message(None) | Step::Stop => break,
            }
        }

        self.flush().await
    }

    /// Forwards the buffered payloads; an empty buffer is a no-op.
    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = Batch::new(self.partition, self.buffer.take_copy());
        let size = batch.len();

        tokio::select! {
            biased;
            sent = self.out.send(batch) => sent.map_err(|_| RedpandaError::ChannelClosed)?,
            _ = self.cancel.cancelled() => return Err(RedpandaError::Cancelled),
        }

        metrics().batches_assembled.inc();
        debug!(partition = self.partition, size, "Forwarded batch");
        Ok(())
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
