use async_trait::async_trait;

use crate::domain::order::{Order, OrderError};

// ============================================================================
// Order Repository - persistence contract
// ============================================================================
//
// Two backends implement this trait (MongoDB and Cosmos DB) and must behave
// identically:
//
// - insert_orders upserts by order_id. Orders are written in sequence and the
//   first failure stops the batch with a Persistence error. Orders written
//   before the failure stay written; the caller retries the whole batch and
//   the upsert makes that safe.
// - get_pending_orders returns Pending orders sorted by order_id.
// - get_order / update_order fail with NotFound for unknown ids, and
//   update_order never creates a record.
//
// Implementations own their connection pool and are shared across request
// handlers without external locking. Concurrent writers to the same order
// race with last-write-wins; there is no concurrency token.
//
// ============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_orders(&self, orders: &[Order]) -> Result<(), OrderError>;

    async fn get_pending_orders(&self) -> Result<Vec<Order>, OrderError>;

    async fn get_order(&self, id: &str) -> Result<Order, OrderError>;

    async fn update_order(&self, order: &Order) -> Result<(), OrderError>;
}

/// Document field names owned by the order itself. A partition key may not
/// reuse them.
const RESERVED_FIELDS: [&str; 5] = ["id", "orderId", "customerId", "items", "status"];

/// Partition addressing for the partitioned backend. Fixed per repository:
/// every order it writes carries `key: value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKey {
    key: String,
    value: String,
}

impl PartitionKey {
    /// Accepts the key with or without the leading `/` of a partition key path.
    pub fn new(key: &str, value: &str) -> Result<Self, OrderError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(OrderError::Configuration("partition key name is empty".to_string()));
        }
        if key.contains('/') {
            return Err(OrderError::Configuration(format!(
                "nested partition key paths are not supported: {key}"
            )));
        }
        if RESERVED_FIELDS.contains(&key) {
            return Err(OrderError::Configuration(format!(
                "partition key {key} collides with an order field"
            )));
        }
        if value.is_empty() {
            return Err(OrderError::Configuration("partition key value is empty".to_string()));
        }

        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_key_strips_path_prefix() {
        let pk = PartitionKey::new("/storeId", "pet-store").unwrap();
        assert_eq!(pk.key(), "storeId");
        assert_eq!(pk.value(), "pet-store");
    }

    #[test]
    fn test_partition_key_rejects_order_fields() {
        for key in ["id", "/orderId", "status"] {
            assert!(matches!(
                PartitionKey::new(key, "x"),
                Err(OrderError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_partition_key_rejects_empty_parts() {
        assert!(PartitionKey::new("/", "x").is_err());
        assert!(PartitionKey::new("storeId", "").is_err());
        assert!(PartitionKey::new("/a/b", "x").is_err());
    }
}
