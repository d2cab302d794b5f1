//! Ingestion coordinator.
//!
//! Sole reader of the batch channel. Every received batch is decoded and
//! persisted on its own task:
//! 1. Decode each payload, dropping (and logging) the ones that fail
//! 2. Persist the survivors with one bulk insert
//! 3. Log and discard the batch if the insert fails
//!
//! Broker positions are already marked by the time a batch arrives here, so a
//! failed insert loses that batch.

use engine_core::{Error, SegmentEvent, SegmentRepository};
use parking_lot::Mutex;
use redpanda::{Batch, BatchSource};
use std::sync::Arc;
use std::time::Instant;
use telemetry::metrics;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Coordinator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Running,
    /// Cancelled; waiting for in-flight batches.
    Draining,
    Stopped,
}

/// Dispatches consumed batches to decode/persist tasks.
pub struct IngestionCoordinator {
    source: Arc<dyn BatchSource>,
    repository: Arc<dyn SegmentRepository>,
    tasks: TaskTracker,
    state: Mutex<CoordinatorState>,
}

impl IngestionCoordinator {
    pub fn new(source: Arc<dyn BatchSource>, repository: Arc<dyn SegmentRepository>) -> Self {
        Self {
            source,
            repository,
            tasks: TaskTracker::new(),
            state: Mutex::new(CoordinatorState::Idle),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.lock()
    }

    /// Number of batches currently being decoded or persisted.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Runs the dispatch loop until `cancel` fires or the batch channel closes.
    ///
    /// Only the first call does anything. On exit the coordinator drains via
    /// [`IngestionCoordinator::stop`].
    pub async fn run(&self, cancel: CancellationToken) -> engine_core::Result<()> {
        {
            let mut state = self.state.lock();
            if *state != CoordinatorState::Idle {
                warn!(state = ?*state, "Coordinator already started");
                return Ok(());
            }
            *state = CoordinatorState::Running;
        }

        let mut batches = self
            .source
            .consume(cancel.clone())
            .map_err(|e| Error::internal(format!("Failed to start consuming: {e}")))?;

        info!("Ingestion coordinator running");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Shutdown requested, draining in-flight batches");
                    break;
                }
                batch = batches.recv() => match batch {
                    Some(batch) => {
                        if !self.dispatch(batch) {
                            info!("Coordinator stopping, no longer dispatching");
                            break;
                        }
                    }
                    None => {
                        info!("Batch channel closed");
                        break;
                    }
                },
            }
        }

        self.stop().await;
        Ok(())
    }

    /// Spawns the batch task. Returns `false`, dropping the batch, once
    /// [`IngestionCoordinator::stop`] has begun.
    ///
    /// The state lock is held across the spawn so a concurrent `stop` either
    /// sees the task in the tracker or prevents it.
    fn dispatch(&self, batch: Batch) -> bool {
        let state = self.state.lock();
        if *state != CoordinatorState::Running {
            warn!(
                partition = batch.partition(),
                size = batch.len(),
                "Dropping batch received after stop"
            );
            return false;
        }

        let repository = Arc::clone(&self.repository);
        metrics().batches_in_flight.inc();

        self.tasks.spawn(async move {
            process_batch(repository.as_ref(), batch).await;
            metrics().batches_in_flight.dec();
        });
        drop(state);
        true
    }

    /// Closes the source and waits for every in-flight batch task.
    ///
    /// Safe to call more than once, from any task; every call returns only
    /// after the drain has completed.
    pub async fn stop(&self) {
        let first = {
            let mut state = self.state.lock();
            match *state {
                CoordinatorState::Draining | CoordinatorState::Stopped => false,
                _ => {
                    *state = CoordinatorState::Draining;
                    true
                }
            }
        };

        if first {
            if let Err(e) = self.source.close().await {
                error!(error = %e, "Failed to close batch source");
            }
            self.tasks.close();
        }

        self.tasks.wait().await;

        let mut state = self.state.lock();
        if *state != CoordinatorState::Stopped {
            *state = CoordinatorState::Stopped;
            info!("Ingestion coordinator stopped");
        }
    }
}

/// Decodes and persists one batch. Failures are logged, never returned.
pub async fn process_batch(repository: &dyn SegmentRepository, batch: Batch) {
    let partition = batch.partition();
    let received = batch.len();
    let start = Instant::now();

    let mut segments = Vec::with_capacity(received);
    for payload in batch.payloads() {
        match SegmentEvent::decode(payload) {
            Ok(event) => segments.push(event),
            Err(e) => {
                metrics().decode_errors.inc();
                error!(partition, error = %e, "error unmarshaling segment");
            }
        }
    }

    if segments.is_empty() {
        debug!(partition, received, "No decodable records in batch");
        return;
    }

    match repository.save_user_segments(&segments).await {
        Ok(()) => {
            metrics().rows_persisted.inc_by(segments.len() as u64);
            debug!(
                partition,
                received,
                persisted = segments.len(),
                latency_ms = %start.elapsed().as_millis(),
                "Persisted batch"
            );
        }
        Err(e) => {
            metrics().persist_errors.inc();
            error!(
                partition,
                count = segments.len(),
                error = %e,
                "error saving segments"
            );
        }
    }
}
