use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::domain::order::{Order, OrderError};
use crate::messaging::{decode_batch, OrderQueue, RawOrderMessage};
use crate::metrics::Metrics;
use crate::service::OrderService;
use crate::utils::within;

// ============================================================================
// Ingestion Workflow
// ============================================================================
//
// draining -> persisting -> reporting
//
// 1. pull one batch from the queue and decode it (all or nothing)
// 2. insert the batch; on failure hand it back to the queue and stop
// 3. acknowledge the batch (a failed ack only means a later redelivery,
//    which the idempotent insert absorbs)
// 4. report the current pending set
//
// Runs are serialized so two triggers never interleave one batch's pull and
// acknowledgement, and each run is detached from its caller.
//
// ============================================================================

pub struct IngestionWorkflow {
    queue: Arc<dyn OrderQueue>,
    service: OrderService,
    metrics: Arc<Metrics>,
    call_timeout: Duration,
    drain_lock: Mutex<()>,
}

impl IngestionWorkflow {
    pub fn new(
        queue: Arc<dyn OrderQueue>,
        service: OrderService,
        metrics: Arc<Metrics>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            service,
            metrics,
            call_timeout,
            drain_lock: Mutex::new(()),
        }
    }

    /// Runs one ingestion pass on its own task. Dropping the returned future
    /// (a disconnected HTTP client) does not stop the pass, so a pulled batch
    /// is always acknowledged or released.
    pub async fn run(self: &Arc<Self>) -> Result<Vec<Order>, OrderError> {
        let workflow = Arc::clone(self);
        tokio::spawn(async move { workflow.drain().await })
            .await
            .map_err(|e| OrderError::persistence("ingestion run", e))?
    }

    async fn drain(&self) -> Result<Vec<Order>, OrderError> {
        let _drain = self.drain_lock.lock().await;

        let batch = within("pull_order_batch", self.call_timeout, self.queue.pull_order_batch())
            .await
            .inspect_err(|e| self.aborted("pull", e))?;

        if !batch.is_empty() {
            self.persist(&batch).await?;
        }

        self.service
            .get_pending_orders()
            .await
            .inspect_err(|e| self.aborted("fetch_pending", e))
    }

    async fn persist(&self, batch: &[RawOrderMessage]) -> Result<(), OrderError> {
        let orders = match decode_batch(batch) {
            Ok(orders) => orders,
            Err(e) => {
                self.aborted("decode", &e);
                self.give_back(batch).await;
                return Err(e);
            }
        };

        if let Err(e) = self.service.insert_orders(&orders).await {
            self.aborted("insert", &e);
            self.give_back(batch).await;
            return Err(e);
        }

        self.metrics.orders_ingested.inc_by(orders.len() as u64);
        tracing::info!(count = orders.len(), "Persisted order batch");

        if let Err(e) = within("acknowledge", self.call_timeout, self.queue.acknowledge(batch)).await {
            tracing::warn!(count = batch.len(), error = %e, "Batch persisted but not acknowledged; expect redelivery");
        }
        Ok(())
    }

    async fn give_back(&self, batch: &[RawOrderMessage]) {
        if let Err(e) = within("release", self.call_timeout, self.queue.release(batch)).await {
            tracing::warn!(count = batch.len(), error = %e, "Could not release order batch");
        }
    }

    fn aborted(&self, stage: &str, error: &OrderError) {
        self.metrics.record_ingestion_failure(stage);
        tracing::error!(stage, error = %error, "Order ingestion aborted");
    }
}
