use actix_web::{http::StatusCode, web, HttpResponse, Responder, ResponseError};

use super::AppState;
use crate::domain::order::{normalize_order_id, Order, OrderError};

// ============================================================================
// Routes
// ============================================================================
//
// GET  /order/fetch  - run one ingestion pass, return pending orders
// GET  /order/{id}   - single order by id
// PUT  /order        - replace an existing order
// GET  /health       - liveness and version
// GET  /metrics      - Prometheus exposition
//
// Ids are normalized before any store access, so "007" and "7" address the
// same order and a non-numeric id never reaches the repository.
//
// ============================================================================

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/order/fetch", web::get().to(fetch_orders))
        .route("/order/{id}", web::get().to(get_order))
        .route("/order", web::put().to(update_order))
        .route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

impl ResponseError for OrderError {
    fn status_code(&self) -> StatusCode {
        match self {
            OrderError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}

async fn fetch_orders(state: web::Data<AppState>) -> Result<HttpResponse, OrderError> {
    let pending = state.ingestion.run().await?;
    Ok(HttpResponse::Ok().json(pending))
}

async fn get_order(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, OrderError> {
    let id = normalize_order_id(&path.into_inner())?;
    let order = state.service.get_order(&id).await?;
    Ok(HttpResponse::Ok().json(order))
}

async fn update_order(state: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, OrderError> {
    let order: Order = serde_json::from_slice(&body)
        .map_err(|e| OrderError::Validation(format!("malformed order: {e}")))?;
    let order = order.normalized()?;

    state.service.update_order(&order).await?;
    tracing::info!(order_id = %order.order_id, status = ?order.status, "Order updated");
    Ok(HttpResponse::Accepted().finish())
}

async fn health_handler(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": state.version,
    }))
}

async fn metrics_handler(state: web::Data<AppState>) -> Result<HttpResponse, OrderError> {
    let body = state.metrics.render()?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}
