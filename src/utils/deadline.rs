use std::future::Future;
use std::time::Duration;

use crate::domain::order::OrderError;

// ============================================================================
// Caller-budgeted deadlines
// ============================================================================
//
// Every store or queue call made on behalf of a caller runs under the caller's
// budget. Expiry drops the in-flight future and surfaces as a persistence
// failure. There is no retry: the caller decides whether to try again.
//
// ============================================================================

pub async fn within<T, F>(operation: &str, budget: Duration, call: F) -> Result<T, OrderError>
where
    F: Future<Output = Result<T, OrderError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, budget_ms = budget.as_millis() as u64, "Call exceeded its budget");
            Err(OrderError::Persistence(format!(
                "{operation} timed out after {}ms",
                budget.as_millis()
            )))
        }
    }
}
