//! Polling consumer: topic → batches → store.
//!
//! One consumer per store. Each poll fetches up to `batch_size` messages
//! from the committed offset, applies them as one batch and only then
//! persists the next offset, so a crash replays at most the last batch.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use graphsync_bus::{OffsetStore, TopicSource};
use graphsync_core::config::IngestConfig;
use graphsync_store::Store;

use crate::dispatcher::{BatchDispatcher, BatchReport};
use crate::error::Result;

#[derive(Clone)]
pub struct IngestConsumer {
    dispatcher: BatchDispatcher,
    source: Arc<dyn TopicSource>,
    offsets: Arc<OffsetStore>,
    topic: String,
    batch_size: usize,
    poll_interval: Duration,
}

impl IngestConsumer {
    pub fn new(
        store: Store,
        source: Arc<dyn TopicSource>,
        offsets: Arc<OffsetStore>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            dispatcher: BatchDispatcher::new(store, config.labels_graph_policy),
            source,
            offsets,
            topic: config.topic.clone(),
            batch_size: config.batch_size.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }

    pub fn store(&self) -> &Store {
        self.dispatcher.store()
    }

    /// Key under which this consumer's offset is committed.
    pub fn offset_key(&self) -> String {
        Self::offset_key_for(&self.topic, self.store().name())
    }

    /// Offset-store key for `store`'s position on `topic`.
    pub fn offset_key_for(topic: &str, store: &str) -> String {
        format!("{topic}@{store}")
    }

    /// Next offset this consumer will read.
    pub fn position(&self) -> u64 {
        self.offsets.get(&self.offset_key())
    }

    /// Apply one batch if any messages are waiting.
    ///
    /// Blocks while another writer holds the store.
    pub fn poll_once(&self) -> Result<Option<BatchReport>> {
        let from = self.position();
        let messages = self.source.fetch(&self.topic, from, self.batch_size)?;
        let Some(last) = messages.last().map(|m| m.offset) else {
            return Ok(None);
        };

        let mut batch = self.dispatcher.start_batch(messages.len(), from);
        for message in &messages {
            batch.process(message);
        }
        let report = batch.finish(messages.len(), last);
        self.offsets.commit(&self.offset_key(), last + 1)?;
        Ok(Some(report))
    }

    /// Apply batches until nothing is waiting.
    pub fn drain(&self) -> Result<Vec<BatchReport>> {
        let mut reports = Vec::new();
        while let Some(report) = self.poll_once()? {
            reports.push(report);
        }
        Ok(reports)
    }

    /// Poll on an interval until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            store = %self.store().name(),
            topic = %self.topic,
            offset = self.position(),
            batch_size = self.batch_size,
            "Consumer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let consumer = self.clone();
            match tokio::task::spawn_blocking(move || consumer.drain()).await {
                Ok(Ok(reports)) if !reports.is_empty() => {
                    tracing::debug!(
                        store = %self.store().name(),
                        batches = reports.len(),
                        offset = self.position(),
                        "Caught up"
                    );
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::error!(store = %self.store().name(), error = %e, "Poll failed");
                }
                Err(e) => {
                    tracing::error!(store = %self.store().name(), error = %e, "Poll task panicked");
                }
            }
        }

        tracing::info!(
            store = %self.store().name(),
            offset = self.position(),
            "Consumer stopped"
        );
        Ok(())
    }
}
