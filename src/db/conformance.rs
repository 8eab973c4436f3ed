// ============================================================================
// Repository conformance scenario
// ============================================================================
//
// One operation sequence that every OrderRepository must answer the same
// way. Each backend's tests run it and compare the transcript against the
// same expected lines, which is what keeps the backends interchangeable.
// Expects an empty store.
//
// ============================================================================

use super::repository::OrderRepository;
use crate::domain::order::{Order, OrderError, OrderItem, OrderStatus};

pub(crate) fn order(id: &str, status: OrderStatus) -> Order {
    // Item fields the service does not model must survive storage.
    let mut wrapped = OrderItem::new(4, 1, 24.25);
    wrapped.extra.insert("giftWrap".to_string(), serde_json::json!({ "paper": "blue" }));

    Order {
        order_id: id.to_string(),
        customer_id: "c1".to_string(),
        items: vec![OrderItem::new(1, 2, 9.5), wrapped],
        status,
    }
}

fn describe<T>(result: &Result<T, OrderError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(OrderError::NotFound(_)) => "not found",
        Err(OrderError::Validation(_)) => "invalid",
        Err(OrderError::Persistence(_)) => "persistence error",
        Err(OrderError::Configuration(_)) => "configuration error",
        Err(OrderError::Connection(_)) => "connection error",
    }
}

async fn pending_ids(repo: &dyn OrderRepository) -> String {
    let pending = repo.get_pending_orders().await.unwrap();
    assert!(pending.iter().all(Order::is_pending));
    pending
        .iter()
        .map(|o| o.order_id.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) async fn run_order_lifecycle(repo: &dyn OrderRepository) -> Vec<String> {
    let mut transcript = Vec::new();

    // Unknown ids
    let missing = repo.get_order("999999").await;
    transcript.push(format!("get 999999: {}", describe(&missing)));

    let update_missing = repo.update_order(&order("999999", OrderStatus::Processed)).await;
    transcript.push(format!("update 999999: {}", describe(&update_missing)));

    let still_missing = repo.get_order("999999").await;
    transcript.push(format!("get 999999 after update: {}", describe(&still_missing)));

    // Empty batch is a no-op
    let empty = repo.insert_orders(&[]).await;
    transcript.push(format!("insert empty: {}", describe(&empty)));

    // Idempotent insert: the redelivered order overwrites the first copy
    let mut first_copy = order("42", OrderStatus::Pending);
    first_copy.customer_id = "c0".to_string();
    let inserted = repo
        .insert_orders(&[
            first_copy,
            order("43", OrderStatus::Processed),
            order("41", OrderStatus::Pending),
        ])
        .await;
    transcript.push(format!("insert 42,43,41: {}", describe(&inserted)));

    let redelivered = repo.insert_orders(&[order("42", OrderStatus::Pending)]).await;
    transcript.push(format!("insert 42 again: {}", describe(&redelivered)));

    // Pending isolation, one record per id
    transcript.push(format!("pending: {}", pending_ids(repo).await));

    // Round trip
    let fetched = repo.get_order("42").await.unwrap();
    transcript.push(format!(
        "get 42 round-trips: {}",
        fetched == order("42", OrderStatus::Pending)
    ));

    // Update replaces the whole record
    let update = repo.update_order(&order("42", OrderStatus::Processed)).await;
    transcript.push(format!("update 42 to processed: {}", describe(&update)));

    let updated = repo.get_order("42").await.unwrap();
    transcript.push(format!("get 42 status: {:?}", updated.status));
    transcript.push(format!("pending after update: {}", pending_ids(repo).await));

    transcript
}

pub(crate) fn expected_transcript() -> Vec<String> {
    [
        "get 999999: not found",
        "update 999999: not found",
        "get 999999 after update: not found",
        "insert empty: ok",
        "insert 42,43,41: ok",
        "insert 42 again: ok",
        "pending: 41,42",
        "get 42 round-trips: true",
        "update 42 to processed: ok",
        "get 42 status: Processed",
        "pending after update: 41",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
