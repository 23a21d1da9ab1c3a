//! Partition consumer that feeds change events to a handler.
//!
//! The consumer supports:
//! - One sequential task per `(topic, partition)` via [`EventConsumer::spawn`]
//! - Single-pass processing of a partition via [`EventConsumer::poll_once`]
//! - Catch-up over every partition via [`EventConsumer::catch_up`]
//!
//! The read position is committed only past messages whose handler returned
//! `Ok`. A failing message is redelivered on the next poll, up to
//! `max_attempts` times, and then handed to the dead-letter sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::{
    BusMessage, ChangeEvent, DeadLetter, DeadLetterSink, EventBus, ItemDeleteEvent, Offset,
    Result, StockUpdateEvent, Topic,
};

/// Error returned by a [`ChangeHandler`]; the message will be retried.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Applies change events to the consuming side's store.
///
/// Handlers must be idempotent: the same event can be delivered more than once.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn handle_stock_update(
        &self,
        event: &StockUpdateEvent,
    ) -> std::result::Result<(), HandlerError>;

    async fn handle_item_delete(
        &self,
        event: &ItemDeleteEvent,
    ) -> std::result::Result<(), HandlerError>;
}

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group whose committed offsets are used.
    pub group: String,
    /// Topics to subscribe to.
    pub topics: Vec<Topic>,
    /// Max messages fetched per poll.
    pub batch_size: usize,
    /// Handling attempts per message before it is dead-lettered.
    pub max_attempts: u32,
    /// Delay before the first redelivery; doubles per attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the redelivery delay.
    pub max_backoff: Duration,
    /// Sleep between polls of an empty partition.
    pub idle_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group: "item-service-group".to_string(),
            topics: Topic::CHANGE_TOPICS.to_vec(),
            batch_size: 100,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            idle_interval: Duration::from_millis(200),
        }
    }
}

impl ConsumerConfig {
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Returns the delay before redelivery attempt `attempt + 1`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Result of one pass over a partition.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Messages handled and committed.
    pub processed: usize,
    /// Messages handed to the dead-letter sink and committed.
    pub dead_lettered: usize,
    /// Attempt number of a message left uncommitted for redelivery, if any.
    pub retry_attempt: Option<u32>,
    /// True if a message could not be dead-lettered and blocks the partition.
    pub stalled: bool,
}

impl PollOutcome {
    /// Returns true if the pass moved the committed offset.
    pub fn made_progress(&self) -> bool {
        self.processed > 0 || self.dead_lettered > 0
    }

    fn merge(&mut self, other: PollOutcome) {
        self.processed += other.processed;
        self.dead_lettered += other.dead_lettered;
        self.retry_attempt = self.retry_attempt.or(other.retry_attempt);
        self.stalled |= other.stalled;
    }
}

/// Consumes change topics and applies them through a [`ChangeHandler`].
pub struct EventConsumer<B, H, D>
where
    B: EventBus,
    H: ChangeHandler,
    D: DeadLetterSink,
{
    bus: B,
    handler: H,
    dead_letters: D,
    config: ConsumerConfig,
    // (topic, partition) -> (offset being retried, failed attempts so far)
    attempts: Mutex<HashMap<(Topic, u32), (Offset, u32)>>,
}

impl<B, H, D> EventConsumer<B, H, D>
where
    B: EventBus,
    H: ChangeHandler,
    D: DeadLetterSink,
{
    /// Creates a new consumer.
    pub fn new(bus: B, handler: H, dead_letters: D, config: ConsumerConfig) -> Self {
        Self {
            bus,
            handler,
            dead_letters,
            config,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Processes one batch from a partition, committing everything that was
    /// handled or dead-lettered.
    #[tracing::instrument(skip(self), fields(group = %self.config.group))]
    pub async fn poll_once(&self, topic: Topic, partition: u32) -> Result<PollOutcome> {
        let batch = self
            .bus
            .poll(&self.config.group, topic, partition, self.config.batch_size)
            .await?;

        let mut outcome = PollOutcome::default();
        let mut commit_to: Option<Offset> = None;

        for message in batch {
            let offset = message.offset;
            tracing::debug!(%topic, partition, %offset, "message received");

            let failure = match ChangeEvent::decode(topic, &message.payload) {
                Ok(event) => match self.apply(&event).await {
                    Ok(()) => None,
                    Err(e) => Some((e.to_string(), true)),
                },
                // Undecodable payloads never succeed on retry
                Err(e) => Some((e.to_string(), false)),
            };

            let Some((error, retryable)) = failure else {
                self.clear_attempts(topic, partition).await;
                metrics::counter!("consumer_messages_processed_total", "topic" => topic.as_str())
                    .increment(1);
                outcome.processed += 1;
                commit_to = Some(offset.next());
                continue;
            };

            let attempt = self.record_attempt(topic, partition, offset).await;
            if retryable && attempt < self.config.max_attempts {
                metrics::counter!("consumer_retries_total", "topic" => topic.as_str())
                    .increment(1);
                tracing::warn!(%topic, partition, %offset, attempt, %error, "handler failed, will redeliver");
                outcome.retry_attempt = Some(attempt);
                break;
            }

            let letter = DeadLetter::new(&self.config.group, message, attempt, &error);
            match self.dead_letters.send(letter).await {
                Ok(()) => {
                    self.clear_attempts(topic, partition).await;
                    metrics::counter!("consumer_dead_lettered_total", "topic" => topic.as_str())
                        .increment(1);
                    tracing::error!(%topic, partition, %offset, attempt, %error, "message dead-lettered");
                    outcome.dead_lettered += 1;
                    commit_to = Some(offset.next());
                }
                Err(sink_error) => {
                    tracing::error!(
                        %topic, partition, %offset, error = %sink_error,
                        "dead-letter sink failed, partition blocked"
                    );
                    outcome.stalled = true;
                    break;
                }
            }
        }

        if let Some(next) = commit_to {
            self.bus
                .commit(&self.config.group, topic, partition, next)
                .await?;
        }

        Ok(outcome)
    }

    /// Polls every subscribed partition until a full pass makes no progress.
    ///
    /// Redeliveries happen immediately, without backoff.
    #[tracing::instrument(skip(self), fields(group = %self.config.group))]
    pub async fn catch_up(&self) -> Result<PollOutcome> {
        let mut total = PollOutcome::default();
        loop {
            let mut pass = PollOutcome::default();
            for topic in &self.config.topics {
                for partition in 0..self.bus.partitions() {
                    pass.merge(self.poll_once(*topic, partition).await?);
                }
            }
            let keep_going = pass.made_progress() || (pass.retry_attempt.is_some() && !pass.stalled);
            total.merge(pass);
            if !keep_going {
                break;
            }
            // Only retries pending: loop again so they either succeed or exhaust
            total.retry_attempt = None;
        }
        tracing::info!(
            processed = total.processed,
            dead_lettered = total.dead_lettered,
            "catch-up complete"
        );
        Ok(total)
    }

    async fn apply(&self, event: &ChangeEvent) -> std::result::Result<(), HandlerError> {
        match event {
            ChangeEvent::StockUpdate(e) => self.handler.handle_stock_update(e).await,
            ChangeEvent::ItemDelete(e) => self.handler.handle_item_delete(e).await,
        }
    }

    async fn record_attempt(&self, topic: Topic, partition: u32, offset: Offset) -> u32 {
        let mut attempts = self.attempts.lock().await;
        let entry = attempts.entry((topic, partition)).or_insert((offset, 0));
        if entry.0 != offset {
            *entry = (offset, 0);
        }
        entry.1 += 1;
        entry.1
    }

    async fn clear_attempts(&self, topic: Topic, partition: u32) {
        self.attempts.lock().await.remove(&(topic, partition));
    }
}

impl<B, H, D> EventConsumer<B, H, D>
where
    B: EventBus + 'static,
    H: ChangeHandler + 'static,
    D: DeadLetterSink + 'static,
{
    /// Spawns one task per subscribed `(topic, partition)`.
    ///
    /// Tasks exit once `shutdown` flips to `true`.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for topic in self.config.topics.clone() {
            for partition in 0..self.bus.partitions() {
                let consumer = Arc::clone(&self);
                let shutdown = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    consumer.run_partition(topic, partition, shutdown).await;
                }));
            }
        }
        tracing::info!(tasks = handles.len(), group = %self.config.group, "consumer started");
        handles
    }

    /// Runs the poll loop for a single partition until shutdown.
    pub async fn run_partition(
        &self,
        topic: Topic,
        partition: u32,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.poll_once(topic, partition).await {
                Ok(outcome) if outcome.stalled => self.config.max_backoff,
                Ok(PollOutcome {
                    retry_attempt: Some(attempt),
                    ..
                }) => self.config.backoff_for(attempt),
                Ok(outcome) if outcome.made_progress() => Duration::ZERO,
                Ok(_) => self.config.idle_interval,
                Err(e) => {
                    tracing::error!(%topic, partition, error = %e, "poll failed");
                    self.config.max_backoff
                }
            };

            if delay.is_zero() {
                continue;
            }

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(%topic, partition, "partition consumer stopped");
    }
}
