use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::domain::order::{normalize_order_id, Order, OrderError, OrderItem};

// ============================================================================
// Order Queue contract
// ============================================================================
//
// Delivery is at-least-once. A pulled batch is either acknowledged once its
// orders are persisted, or released so the same messages are delivered again
// on the next pull. Redelivery is absorbed by the repository's idempotent
// insert.
//
// ============================================================================

/// One undecoded message as delivered by the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOrderMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

impl RawOrderMessage {
    /// Stable across redeliveries of the same message.
    pub fn delivery_id(&self) -> String {
        format!("{}/{}/{}", self.topic, self.partition, self.offset)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderQueue: Send + Sync {
    /// Pulls the next batch. An empty batch means the queue is drained.
    async fn pull_order_batch(&self) -> Result<Vec<RawOrderMessage>, OrderError>;

    /// Marks the batch as consumed.
    async fn acknowledge(&self, batch: &[RawOrderMessage]) -> Result<(), OrderError>;

    /// Hands the batch back for redelivery.
    async fn release(&self, batch: &[RawOrderMessage]) -> Result<(), OrderError>;
}

/// Payload published by the order service.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacedOrder {
    #[serde(default)]
    order_id: Option<String>,
    customer_id: String,
    items: Vec<OrderItem>,
}

/// Decodes a queue message into a new Pending order. A message without an
/// `orderId` gets one derived from its delivery id, so a redelivered copy
/// maps onto the same record.
pub fn decode_order(message: &RawOrderMessage) -> Result<Order, OrderError> {
    let placed: PlacedOrder = serde_json::from_slice(&message.payload).map_err(|e| {
        OrderError::Persistence(format!("message {} is not an order: {e}", message.delivery_id()))
    })?;

    let order_id = match placed.order_id {
        Some(raw) => normalize_order_id(&raw).map_err(|e| {
            OrderError::Persistence(format!("message {} carries a bad order id: {e}", message.delivery_id()))
        })?,
        None => derive_order_id(&message.delivery_id()),
    };

    Ok(Order::pending(order_id, placed.customer_id, placed.items))
}

/// Whole batch or nothing: one undecodable message fails the pull.
pub fn decode_batch(batch: &[RawOrderMessage]) -> Result<Vec<Order>, OrderError> {
    batch.iter().map(decode_order).collect()
}

/// Decimal id from the first 8 bytes of SHA-256(delivery id), kept within
/// the non-negative i64 range so it survives id normalization.
fn derive_order_id(delivery_id: &str) -> String {
    let digest = Sha256::digest(delivery_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) >> 1).to_string()
}
