use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use super::{AccessToken, TokenCredential};
use crate::domain::order::OrderError;

// ============================================================================
// Workload Identity Credential
// ============================================================================
//
// Exchanges the federated service-account token projected into the pod for
// a Microsoft Entra ID access token (client-credentials grant with a JWT
// client assertion). Tokens are cached per scope until close to expiry.
//
// ============================================================================

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";
const JWT_BEARER_ASSERTION: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

pub struct WorkloadIdentityCredential {
    http: reqwest::Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    token_file: PathBuf,
    cache: Mutex<HashMap<String, AccessToken>>,
}

impl WorkloadIdentityCredential {
    pub fn new(
        http: reqwest::Client,
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http,
            authority_host: authority_host.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            token_file: token_file.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Reads the variables the workload identity webhook injects into the pod.
    pub fn from_env(http: reqwest::Client) -> Result<Self, OrderError> {
        Self::from_lookup(http, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        http: reqwest::Client,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, OrderError> {
        let require = |name: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| OrderError::missing(name))
        };

        let client_id = require("AZURE_CLIENT_ID")?;
        let tenant_id = require("AZURE_TENANT_ID")?;
        let token_file = require("AZURE_FEDERATED_TOKEN_FILE")?;
        let authority_host = lookup("AZURE_AUTHORITY_HOST")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());

        Ok(Self::new(http, authority_host, tenant_id, client_id, token_file))
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    async fn request_token(&self, scope: &str) -> Result<AccessToken, OrderError> {
        // The projected token rotates, so it is re-read on every exchange.
        let assertion = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|e| {
                OrderError::Connection(format!(
                    "cannot read federated token file {}: {e}",
                    self.token_file.display()
                ))
            })?;

        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("scope", scope),
                ("client_assertion_type", JWT_BEARER_ASSERTION),
                ("client_assertion", assertion.trim()),
            ])
            .send()
            .await
            .map_err(|e| OrderError::Connection(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrderError::Connection(format!(
                "token endpoint rejected workload identity ({status}): {body}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| OrderError::Connection(format!("malformed token response: {e}")))?;

        tracing::debug!(scope = %scope, expires_in = body.expires_in, "Acquired workload identity token");

        Ok(AccessToken {
            token: body.access_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        })
    }
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, OrderError> {
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.get(scope) {
            if token.is_fresh(Utc::now()) {
                return Ok(token.clone());
            }
        }

        let token = self.request_token(scope).await?;
        cache.insert(scope.to_string(), token.clone());
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn test_from_lookup_requires_injected_variables() {
        let vars: HashMap<&str, &str> = [
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_FEDERATED_TOKEN_FILE", "/var/run/token"),
        ]
        .into_iter()
        .collect();

        let result = WorkloadIdentityCredential::from_lookup(reqwest::Client::new(), |name| {
            vars.get(name).map(|v| v.to_string())
        });

        match result {
            Err(OrderError::Configuration(message)) => assert!(message.contains("AZURE_TENANT_ID")),
            other => panic!("expected configuration error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_from_lookup_defaults_authority_host() {
        let credential = WorkloadIdentityCredential::from_lookup(reqwest::Client::new(), |name| {
            match name {
                "AZURE_CLIENT_ID" => Some("client".to_string()),
                "AZURE_TENANT_ID" => Some("tenant".to_string()),
                "AZURE_FEDERATED_TOKEN_FILE" => Some("/var/run/token".to_string()),
                _ => None,
            }
        })
        .unwrap();

        assert_eq!(
            credential.token_url(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token"
        );
    }

    #[tokio::test]
    async fn test_exchanges_federated_token_and_caches_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .and(body_string_contains("client_assertion=federated-jwt"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "entra-token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let file = token_file("federated-jwt\n");
        let credential = WorkloadIdentityCredential::new(
            reqwest::Client::new(),
            server.uri(),
            "tenant",
            "client",
            file.path(),
        );

        let first = credential.get_token("https://cosmos.example/.default").await.unwrap();
        let second = credential.get_token("https://cosmos.example/.default").await.unwrap();

        assert_eq!(first.token, "entra-token");
        assert_eq!(second.token, "entra-token");
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("AADSTS700016"))
            .mount(&server)
            .await;

        let file = token_file("federated-jwt");
        let credential = WorkloadIdentityCredential::new(
            reqwest::Client::new(),
            server.uri(),
            "tenant",
            "client",
            file.path(),
        );

        let err = credential.get_token("scope").await.unwrap_err();
        assert!(matches!(err, OrderError::Connection(message) if message.contains("AADSTS700016")));
    }

    #[tokio::test]
    async fn test_missing_token_file_is_connection_error() {
        let credential = WorkloadIdentityCredential::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            "tenant",
            "client",
            "/nonexistent/federated-token",
        );

        let err = credential.get_token("scope").await.unwrap_err();
        assert!(matches!(err, OrderError::Connection(_)));
    }
}
