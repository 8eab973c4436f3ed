use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    Message, Offset, TopicPartitionList,
};
use std::collections::BTreeMap;
use std::time::Duration;

use super::queue::{OrderQueue, RawOrderMessage};
use crate::config::QueueSettings;
use crate::domain::order::OrderError;

// ============================================================================
// Redpanda / Kafka Order Queue
// ============================================================================
//
// Consumes placed orders with manual commits: offsets are committed only when
// a batch is acknowledged. A released batch is rewound by seeking each
// partition back to its first unacknowledged offset, and so is a pull that
// ends before handing its messages over.
//
// ============================================================================

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedpandaOrderQueue {
    consumer: StreamConsumer,
    batch_size: usize,
    batch_wait: Duration,
}

impl RedpandaOrderQueue {
    pub fn new(settings: &QueueSettings) -> Result<Self, OrderError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("group.id", &settings.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "10000")
            .create()
            .map_err(|e| OrderError::Configuration(format!("cannot create queue consumer: {e}")))?;

        consumer
            .subscribe(&[settings.topic.as_str()])
            .map_err(|e| OrderError::Connection(format!("cannot subscribe to {}: {e}", settings.topic)))?;

        tracing::info!(
            brokers = %settings.brokers,
            topic = %settings.topic,
            group_id = %settings.group_id,
            "Subscribed to order queue"
        );

        Ok(Self {
            consumer,
            batch_size: settings.batch_size,
            batch_wait: settings.batch_wait,
        })
    }

    fn rewind(&self, batch: &[RawOrderMessage]) -> Result<(), OrderError> {
        for ((topic, partition), offset) in rewind_offsets(batch) {
            self.consumer
                .seek(&topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
                .map_err(|e| OrderError::persistence("rewind queue", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderQueue for RedpandaOrderQueue {
    async fn pull_order_batch(&self) -> Result<Vec<RawOrderMessage>, OrderError> {
        let deadline = tokio::time::Instant::now() + self.batch_wait;
        let mut batch = InFlight::new(self.batch_size, |pulled: &[RawOrderMessage]| self.rewind(pulled));

        while batch.messages.len() < self.batch_size {
            match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                Err(_) => break,
                Ok(Ok(message)) => batch.messages.push(RawOrderMessage {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                    payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                }),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, pulled = batch.messages.len(), "Failed to receive from order queue");
                    return Err(OrderError::persistence("pull order batch", e));
                }
            }
        }

        let batch = batch.hand_over();
        tracing::debug!(count = batch.len(), "Pulled order batch");
        Ok(batch)
    }

    async fn acknowledge(&self, batch: &[RawOrderMessage]) -> Result<(), OrderError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut offsets = TopicPartitionList::new();
        for ((topic, partition), next) in commit_offsets(batch) {
            offsets
                .add_partition_offset(&topic, partition, Offset::Offset(next))
                .map_err(|e| OrderError::persistence("acknowledge batch", e))?;
        }

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| OrderError::persistence("acknowledge batch", e))?;

        tracing::debug!(count = batch.len(), "Acknowledged order batch");
        Ok(())
    }

    async fn release(&self, batch: &[RawOrderMessage]) -> Result<(), OrderError> {
        self.rewind(batch)?;
        tracing::info!(count = batch.len(), "Released order batch for redelivery");
        Ok(())
    }
}

/// Messages received by a pull that has not returned yet. Unless handed over,
/// they are rewound when the pull ends early, whether on a receive error or
/// because the pull future was dropped.
struct InFlight<F>
where
    F: Fn(&[RawOrderMessage]) -> Result<(), OrderError>,
{
    messages: Vec<RawOrderMessage>,
    rewind: F,
}

impl<F> InFlight<F>
where
    F: Fn(&[RawOrderMessage]) -> Result<(), OrderError>,
{
    fn new(capacity: usize, rewind: F) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
            rewind,
        }
    }

    fn hand_over(mut self) -> Vec<RawOrderMessage> {
        std::mem::take(&mut self.messages)
    }
}

impl<F> Drop for InFlight<F>
where
    F: Fn(&[RawOrderMessage]) -> Result<(), OrderError>,
{
    fn drop(&mut self) {
        if self.messages.is_empty() {
            return;
        }
        match (self.rewind)(&self.messages) {
            Ok(()) => tracing::warn!(count = self.messages.len(), "Pull interrupted; rewound partially pulled batch"),
            Err(e) => tracing::error!(count = self.messages.len(), error = %e, "Could not rewind partially pulled batch"),
        }
    }
}

/// Offsets to commit: one past the highest offset seen per partition.
fn commit_offsets(batch: &[RawOrderMessage]) -> BTreeMap<(String, i32), i64> {
    let mut offsets = BTreeMap::new();
    for message in batch {
        let next = offsets
            .entry((message.topic.clone(), message.partition))
            .or_insert(message.offset + 1);
        *next = (*next).max(message.offset + 1);
    }
    offsets
}

/// Offsets to seek back to: the lowest offset seen per partition.
fn rewind_offsets(batch: &[RawOrderMessage]) -> BTreeMap<(String, i32), i64> {
    let mut offsets = BTreeMap::new();
    for message in batch {
        let first = offsets
            .entry((message.topic.clone(), message.partition))
            .or_insert(message.offset);
        *first = (*first).min(message.offset);
    }
    offsets
}
