use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::db::OrderRepository;
use crate::domain::order::{Order, OrderError};
use crate::metrics::{outcome, Metrics};
use crate::utils::within;

// ============================================================================
// Order Service
// ============================================================================
//
// The one repository handle for the process, shared by every HTTP worker and
// the ingestion workflow. Each call is delegated unchanged, bounded by the
// caller budget and recorded in the repository metrics.
//
// ============================================================================

#[derive(Clone)]
pub struct OrderService {
    repo: Arc<dyn OrderRepository>,
    metrics: Arc<Metrics>,
    call_timeout: Duration,
}

impl OrderService {
    pub fn new(repo: Arc<dyn OrderRepository>, metrics: Arc<Metrics>, call_timeout: Duration) -> Self {
        Self {
            repo,
            metrics,
            call_timeout,
        }
    }

    pub async fn insert_orders(&self, orders: &[Order]) -> Result<(), OrderError> {
        self.observe("insert_orders", self.repo.insert_orders(orders)).await
    }

    pub async fn get_pending_orders(&self) -> Result<Vec<Order>, OrderError> {
        self.observe("get_pending_orders", self.repo.get_pending_orders()).await
    }

    pub async fn get_order(&self, id: &str) -> Result<Order, OrderError> {
        self.observe("get_order", self.repo.get_order(id)).await
    }

    pub async fn update_order(&self, order: &Order) -> Result<(), OrderError> {
        self.observe("update_order", self.repo.update_order(order)).await
    }

    async fn observe<T, F>(&self, operation: &'static str, call: F) -> Result<T, OrderError>
    where
        F: Future<Output = Result<T, OrderError>>,
    {
        let started = Instant::now();
        let result = within(operation, self.call_timeout, call).await;
        self.metrics
            .record_repository_call(operation, started.elapsed().as_secs_f64(), outcome(&result));

        if let Err(e) = &result {
            tracing::debug!(operation, error = %e, "Repository call failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockOrderRepository;
    use crate::domain::order::{OrderItem, OrderStatus};

    fn service(repo: MockOrderRepository) -> (OrderService, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = OrderService::new(Arc::new(repo), metrics.clone(), Duration::from_secs(5));
        (service, metrics)
    }

    fn order(id: &str) -> Order {
        Order::pending(
            id.to_string(),
            "c1".to_string(),
            vec![OrderItem::new(1, 1, 2.5)],
        )
    }

    #[tokio::test]
    async fn test_delegates_to_repository() {
        let mut repo = MockOrderRepository::new();
        repo.expect_get_order()
            .withf(|id| id == "42")
            .times(1)
            .returning(|id| Ok(order(id)));
        repo.expect_insert_orders()
            .withf(|orders| orders.len() == 2)
            .times(1)
            .returning(|_| Ok(()));
        repo.expect_get_pending_orders()
            .times(1)
            .returning(|| Ok(vec![order("1")]));
        repo.expect_update_order()
            .withf(|order| order.status == OrderStatus::Processed)
            .times(1)
            .returning(|_| Ok(()));

        let (service, _) = service(repo);

        assert_eq!(service.get_order("42").await.unwrap().order_id, "42");
        service.insert_orders(&[order("1"), order("2")]).await.unwrap();
        assert_eq!(service.get_pending_orders().await.unwrap().len(), 1);

        let mut processed = order("42");
        processed.status = OrderStatus::Processed;
        service.update_order(&processed).await.unwrap();
    }

    #[tokio::test]
    async fn test_errors_pass_through_and_are_counted() {
        let mut repo = MockOrderRepository::new();
        repo.expect_get_order()
            .returning(|id| Err(OrderError::NotFound(id.to_string())));

        let (service, metrics) = service(repo);
        let err = service.get_order("999999").await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound(id) if id == "999999"));

        let count = metrics
            .repository_operations
            .with_label_values(&["get_order", "not_found"])
            .get();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_clones_share_one_repository() {
        let mut repo = MockOrderRepository::new();
        repo.expect_get_pending_orders().times(2).returning(|| Ok(Vec::new()));

        let (service, _) = service(repo);
        let clone = service.clone();

        service.get_pending_orders().await.unwrap();
        clone.get_pending_orders().await.unwrap();
    }
}
