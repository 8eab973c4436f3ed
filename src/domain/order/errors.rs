// ============================================================================
// Order Service Errors
// ============================================================================
//
// Configuration and Connection are fatal at startup. Validation and NotFound
// are client-facing. Persistence covers every backend or queue failure after
// a valid request. Nothing in the service retries on any of them.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl OrderError {
    pub fn missing(setting: &str) -> Self {
        OrderError::Configuration(format!("{setting} is not set"))
    }

    pub fn persistence(operation: &str, err: impl std::fmt::Display) -> Self {
        OrderError::Persistence(format!("{operation} failed: {err}"))
    }
}
