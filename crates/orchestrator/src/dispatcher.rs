//! Outbox dispatcher: publishes committed change events to the bus.

use std::sync::Arc;

use event_bus::{EventBus, EventPublisher};
use ledger::InventoryLedger;
use tokio::sync::{Notify, watch};

use crate::config::DispatcherConfig;
use crate::error::Result;

/// Result of one dispatch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResult {
    /// Rows published and removed from the outbox.
    pub published: usize,
    /// True if a publish failed and the run stopped early.
    pub failed: bool,
}

/// Moves outbox rows onto the event bus in commit order.
///
/// A row is removed only after the bus acknowledged it, so a crash between
/// the two steps publishes it again. On a failed publish the run stops, so
/// later changes to an item are never published ahead of earlier ones.
/// Run one dispatcher per ledger.
pub struct OutboxDispatcher<L, B>
where
    L: InventoryLedger,
    B: EventBus,
{
    ledger: L,
    publisher: EventPublisher<B>,
    config: DispatcherConfig,
    signal: Arc<Notify>,
}

impl<L, B> OutboxDispatcher<L, B>
where
    L: InventoryLedger,
    B: EventBus,
{
    /// Creates a new dispatcher.
    pub fn new(ledger: L, bus: B, config: DispatcherConfig) -> Self {
        Self {
            ledger,
            publisher: EventPublisher::new(bus),
            config,
            signal: Arc::new(Notify::new()),
        }
    }

    /// Wakes the dispatcher whenever `signal` is notified.
    pub fn with_signal(mut self, signal: Arc<Notify>) -> Self {
        self.signal = signal;
        self
    }

    pub fn signal(&self) -> Arc<Notify> {
        Arc::clone(&self.signal)
    }

    /// Publishes up to one batch of pending outbox rows.
    #[tracing::instrument(skip(self))]
    pub async fn dispatch_pending(&self) -> Result<DispatchResult> {
        let pending = self.ledger.pending_outbox(self.config.batch_size).await?;
        let mut result = DispatchResult::default();

        for entry in pending {
            match self.publisher.publish_message(entry.to_message()).await {
                Ok(delivery) => {
                    self.ledger.mark_published(entry.id).await?;
                    metrics::counter!("outbox_published_total").increment(1);
                    tracing::debug!(
                        outbox_id = %entry.id,
                        partition = delivery.partition,
                        offset = %delivery.offset,
                        "outbox entry published"
                    );
                    result.published += 1;
                }
                Err(e) => {
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    tracing::warn!(
                        outbox_id = %entry.id,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "outbox publish failed"
                    );
                    self.ledger
                        .record_publish_failure(entry.id, &e.to_string())
                        .await?;
                    result.failed = true;
                    break;
                }
            }
        }

        Ok(result)
    }

    /// Dispatches batches until the outbox is empty or a publish fails.
    ///
    /// Returns the number of rows published.
    pub async fn drain(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let result = self.dispatch_pending().await?;
            total += result.published;
            if result.failed || result.published == 0 {
                return Ok(total);
            }
        }
    }

    /// Dispatches on every tick or signal until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "outbox dispatcher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.dispatch_pending().await {
                // A full batch means more rows are probably waiting
                Ok(result) if !result.failed && result.published == self.config.batch_size => {
                    continue;
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "outbox dispatch failed"),
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.poll_interval) => {}
                () = self.signal.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("outbox dispatcher stopped");
    }
}
