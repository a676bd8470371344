//! In-process bus for tests and embedded use.

use std::collections::HashMap;

use graphsync_core::{BusMessage, OutboundMessage};
use parking_lot::Mutex;

use crate::{BoxFuture, BusError, Publisher, Result, TopicSource};

#[derive(Debug, Default)]
pub struct MemoryBus {
    topics: Mutex<HashMap<String, Vec<BusMessage>>>,
    unavailable: Mutex<bool>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail until switched back. Used to exercise
    /// publish-failure paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    pub fn append(&self, message: OutboundMessage) -> Result<u64> {
        if *self.unavailable.lock() {
            return Err(BusError::Unavailable("memory bus switched off".into()));
        }
        let mut topics = self.topics.lock();
        let log = topics.entry(message.topic.clone()).or_default();
        let offset = log.len() as u64;
        log.push(BusMessage {
            topic: message.topic,
            offset,
            headers: message.headers,
            body: message.body,
        });
        Ok(offset)
    }

    /// Every message on a topic.
    pub fn messages(&self, topic: &str) -> Vec<BusMessage> {
        self.topics.lock().get(topic).cloned().unwrap_or_default()
    }
}

impl Publisher for MemoryBus {
    fn publish<'a>(&'a self, message: OutboundMessage) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move { self.append(message) })
    }
}

impl TopicSource for MemoryBus {
    fn fetch(&self, topic: &str, from: u64, max: usize) -> Result<Vec<BusMessage>> {
        let topics = self.topics.lock();
        let Some(log) = topics.get(topic) else {
            return Ok(Vec::new());
        };
        Ok(log
            .iter()
            .skip(from as usize)
            .take(max)
            .cloned()
            .collect())
    }

    fn end_offset(&self, topic: &str) -> Result<u64> {
        Ok(self.topics.lock().get(topic).map_or(0, |l| l.len() as u64))
    }
}
