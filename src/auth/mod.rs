// ============================================================================
// Credentials
// ============================================================================
//
// Backends authenticate either with a static secret (connection string,
// username/password, account key) or with a token from the runtime's
// workload identity. Token sources sit behind TokenCredential so repositories
// never care where a token came from.
//
// ============================================================================

mod workload_identity;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::order::OrderError;

pub use workload_identity::WorkloadIdentityCredential;

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 300;

/// Authentication strategy, chosen independently of the backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    WorkloadIdentity,
    StaticCredential,
}

#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, OrderError>;
}

#[cfg(test)]
pub(crate) struct FixedTokenCredential(pub &'static str);

#[cfg(test)]
#[async_trait]
impl TokenCredential for FixedTokenCredential {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken, OrderError> {
        Ok(AccessToken {
            token: self.0.to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}
