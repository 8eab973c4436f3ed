// ============================================================================
// Messaging
// ============================================================================
//
// - queue    - OrderQueue contract and order message decoding
// - redpanda - Kafka-protocol consumer implementing OrderQueue
//
// ============================================================================

mod queue;
mod redpanda;

pub use queue::{decode_batch, OrderQueue, RawOrderMessage};
pub use redpanda::RedpandaOrderQueue;

#[cfg(test)]
pub use queue::MockOrderQueue;
