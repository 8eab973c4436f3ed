// ============================================================================
// HTTP API
// ============================================================================
//
// - routes - order, health and metrics handlers plus error-to-status mapping
// - server - actix-web server bootstrap
//
// ============================================================================

mod routes;
mod server;

use std::sync::Arc;

use crate::ingestion::IngestionWorkflow;
use crate::metrics::Metrics;
use crate::service::OrderService;

pub use routes::configure;
pub use server::start_server;

/// Shared by every worker through `web::Data`.
pub struct AppState {
    pub service: OrderService,
    pub ingestion: Arc<IngestionWorkflow>,
    pub metrics: Arc<Metrics>,
    pub version: String,
}
