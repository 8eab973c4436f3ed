use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// A single line item. The service stores items as-is and never prices
/// or validates them: fields beyond the typed ones are kept in `extra` and
/// written back unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: i64,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderItem {
    pub fn new(product_id: i64, quantity: i64, price: f64) -> Self {
        Self {
            product_id,
            quantity,
            price: Some(price),
            extra: Map::new(),
        }
    }
}

/// Fulfillment status, stored and exchanged as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OrderStatus {
    Pending,
    Processing,
    Processed,
}

impl OrderStatus {
    pub const fn code(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Processed => 2,
        }
    }
}

impl From<OrderStatus> for u8 {
    fn from(status: OrderStatus) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for OrderStatus {
    type Error = OrderError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(OrderStatus::Pending),
            1 => Ok(OrderStatus::Processing),
            2 => Ok(OrderStatus::Processed),
            other => Err(OrderError::Validation(format!("unknown order status code {other}"))),
        }
    }
}

/// Parses a raw order identifier as a decimal integer and returns its
/// canonical decimal form (`"007"` becomes `"7"`).
pub fn normalize_order_id(raw: &str) -> Result<String, OrderError> {
    raw.parse::<i64>()
        .map(|id| id.to_string())
        .map_err(|e| OrderError::Validation(format!("order id {raw:?} is not a decimal integer: {e}")))
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_pipeline_wire_format() {
        assert_eq!(serde_json::to_string(&OrderStatus::Pending).unwrap(), "0");
        assert_eq!(serde_json::to_string(&OrderStatus::Processing).unwrap(), "1");
        assert_eq!(serde_json::to_string(&OrderStatus::Processed).unwrap(), "2");

        let status: OrderStatus = serde_json::from_str("1").unwrap();
        assert_eq!(status, OrderStatus::Processing);
    }

    #[test]
    fn test_unknown_status_code_rejected() {
        assert!(serde_json::from_str::<OrderStatus>("7").is_err());
        assert!(matches!(OrderStatus::try_from(3), Err(OrderError::Validation(_))));
    }

    #[test]
    fn test_order_item_uses_camel_case_fields() {
        let item: OrderItem =
            serde_json::from_str(r#"{"productId":3,"quantity":2,"price":12.5}"#).unwrap();

        assert_eq!(item.product_id, 3);
        assert_eq!(item.quantity, 2);
        assert_eq!(item.price, Some(12.5));
        assert!(item.extra.is_empty());
    }

    #[test]
    fn test_order_item_carries_unknown_fields_through() {
        let raw = r#"{"productId":3,"quantity":2,"price":12.5,"sku":"TOY-3","options":{"color":"red"}}"#;
        let item: OrderItem = serde_json::from_str(raw).unwrap();

        assert_eq!(item.extra["sku"], "TOY-3");
        assert_eq!(item.extra["options"]["color"], "red");

        let written = serde_json::to_value(&item).unwrap();
        let original: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(written, original);
    }

    #[test]
    fn test_order_item_without_price_is_accepted() {
        let item: OrderItem = serde_json::from_str(r#"{"productId":3,"quantity":1}"#).unwrap();
        assert_eq!(item.price, None);

        let written = serde_json::to_value(&item).unwrap();
        assert_eq!(written, serde_json::json!({"productId": 3, "quantity": 1}));
    }

    #[test]
    fn test_normalize_strips_leading_zeros() {
        assert_eq!(normalize_order_id("007").unwrap(), "7");
        assert_eq!(normalize_order_id("42").unwrap(), "42");
        assert_eq!(normalize_order_id("+5").unwrap(), "5");
        assert_eq!(normalize_order_id("-0").unwrap(), "0");
    }

    #[test]
    fn test_normalize_rejects_non_decimal() {
        for raw in ["abc", "", " 7", "7 ", "1.5", "0x1f", "99999999999999999999"] {
            assert!(
                matches!(normalize_order_id(raw), Err(OrderError::Validation(_))),
                "{raw:?} should be rejected"
            );
        }
    }
}
