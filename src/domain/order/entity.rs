use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::value_objects::{normalize_order_id, OrderItem, OrderStatus};

// ============================================================================
// Order Entity
// ============================================================================

/// An order as stored and served. `order_id` is the only identity key:
/// upserts and lookups address records by it alone.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
}

impl Order {
    /// A freshly observed order. Ingestion always starts orders as Pending.
    pub fn pending(order_id: String, customer_id: String, items: Vec<OrderItem>) -> Self {
        Self {
            order_id,
            customer_id,
            items,
            status: OrderStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Returns the same order with its id in canonical decimal form.
    pub fn normalized(self) -> Result<Self, OrderError> {
        let order_id = normalize_order_id(&self.order_id)?;
        Ok(Self { order_id, ..self })
    }
}
