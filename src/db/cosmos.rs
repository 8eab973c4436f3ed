use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::SystemTime;

use super::repository::{OrderRepository, PartitionKey};
use crate::auth::TokenCredential;
use crate::domain::order::{Order, OrderError, OrderStatus};

// ============================================================================
// Cosmos DB (NoSQL API) Order Repository
// ============================================================================
//
// Talks to the Cosmos DB REST API directly. Each order is one document whose
// `id` is the order id, plus the repository's partition key field. All
// requests are scoped to that single logical partition.
//
// Single-document writes are atomic in Cosmos DB, so a cancelled upsert or
// replace is either fully applied or not applied.
//
// ============================================================================

const API_VERSION: &str = "2018-12-31";

const PENDING_QUERY: &str = "SELECT * FROM c WHERE c.status = @status ORDER BY c.orderId";

/// How requests are signed.
enum CosmosAuth {
    /// Account key, HMAC-SHA256 signature per request.
    MasterKey(Vec<u8>),
    /// Microsoft Entra ID bearer token for the account's scope.
    Token {
        credential: Arc<dyn TokenCredential>,
        scope: String,
    },
}

impl CosmosAuth {
    async fn header(
        &self,
        verb: &Method,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> Result<String, OrderError> {
        let raw = match self {
            CosmosAuth::MasterKey(key) => {
                let signature = master_key_signature(key, verb, resource_type, resource_link, date)?;
                format!("type=master&ver=1.0&sig={signature}")
            }
            CosmosAuth::Token { credential, scope } => {
                let token = credential.get_token(scope).await?;
                format!("type=aad&ver=1.0&sig={}", token.token)
            }
        };
        Ok(urlencoding::encode(&raw).into_owned())
    }
}

fn master_key_signature(
    key: &[u8],
    verb: &Method,
    resource_type: &str,
    resource_link: &str,
    date: &str,
) -> Result<String, OrderError> {
    let payload = format!(
        "{}\n{}\n{}\n{}\n\n",
        verb.as_str().to_lowercase(),
        resource_type.to_lowercase(),
        resource_link,
        date.to_lowercase()
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| OrderError::Configuration(format!("unusable account key: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

#[derive(Deserialize)]
struct QueryPage {
    #[serde(rename = "Documents")]
    documents: Vec<Order>,
}

pub struct CosmosOrderRepository {
    http: reqwest::Client,
    endpoint: String,
    database: String,
    container: String,
    partition_key: PartitionKey,
    partition_header: String,
    auth: CosmosAuth,
}

impl std::fmt::Debug for CosmosOrderRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosOrderRepository")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("container", &self.container)
            .field("partition_key", &self.partition_key)
            .finish()
    }
}

impl CosmosOrderRepository {
    /// Connects with the account key (base64, as shown in the portal).
    pub async fn connect_with_key(
        http: reqwest::Client,
        endpoint: &str,
        database: &str,
        container: &str,
        account_key: &str,
        partition_key: PartitionKey,
    ) -> Result<Self, OrderError> {
        let key = BASE64_STANDARD
            .decode(account_key.trim())
            .map_err(|e| OrderError::Configuration(format!("account key is not valid base64: {e}")))?;

        Self::connect(http, endpoint, database, container, partition_key, CosmosAuth::MasterKey(key)).await
    }

    /// Connects with a token credential (workload identity).
    pub async fn connect_with_credential(
        http: reqwest::Client,
        endpoint: &str,
        database: &str,
        container: &str,
        credential: Arc<dyn TokenCredential>,
        partition_key: PartitionKey,
    ) -> Result<Self, OrderError> {
        let scope = token_scope(endpoint)?;
        Self::connect(
            http,
            endpoint,
            database,
            container,
            partition_key,
            CosmosAuth::Token { credential, scope },
        )
        .await
    }

    async fn connect(
        http: reqwest::Client,
        endpoint: &str,
        database: &str,
        container: &str,
        partition_key: PartitionKey,
        auth: CosmosAuth,
    ) -> Result<Self, OrderError> {
        let partition_header = serde_json::to_string(&[partition_key.value()])
            .map_err(|e| OrderError::Configuration(format!("partition value: {e}")))?;

        let repo = Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            database: database.to_string(),
            container: container.to_string(),
            partition_key,
            partition_header,
            auth,
        };

        repo.verify_container().await?;

        tracing::info!(
            endpoint = %repo.endpoint,
            database = %repo.database,
            container = %repo.container,
            partition_key = %repo.partition_key.key(),
            "Connected to Cosmos DB"
        );

        Ok(repo)
    }

    fn collection_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.database, self.container)
    }

    fn document_link(&self, id: &str) -> String {
        format!("{}/docs/{}", self.collection_link(), id)
    }

    /// Builds a signed request. `url_path` is what is requested, `resource_link`
    /// is what gets signed; they differ for feed operations on `docs`.
    async fn request(
        &self,
        method: Method,
        url_path: &str,
        resource_type: &str,
        resource_link: &str,
    ) -> Result<RequestBuilder, OrderError> {
        let date = httpdate::fmt_http_date(SystemTime::now());
        let authorization = self.auth.header(&method, resource_type, resource_link, &date).await?;

        Ok(self
            .http
            .request(method, format!("{}/{}", self.endpoint, url_path))
            .header("authorization", authorization)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header("x-ms-documentdb-partitionkey", self.partition_header.as_str()))
    }

    async fn verify_container(&self) -> Result<(), OrderError> {
        let link = self.collection_link();
        let response = self
            .request(Method::GET, &link, "colls", &link)
            .await?
            .send()
            .await
            .map_err(|e| OrderError::Connection(format!("cannot reach {}: {e}", self.endpoint)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(OrderError::Connection(format!(
            "container {link} is not accessible ({status}): {body}"
        )))
    }

    /// The stored document: the order plus `id` and the partition field.
    fn document(&self, order: &Order) -> Result<Value, OrderError> {
        let mut document = serde_json::to_value(order)
            .map_err(|e| OrderError::persistence("serialize order", e))?;

        if let Value::Object(fields) = &mut document {
            fields.insert("id".to_string(), Value::String(order.order_id.clone()));
            fields.insert(
                self.partition_key.key().to_string(),
                Value::String(self.partition_key.value().to_string()),
            );
        }
        Ok(document)
    }

    async fn upsert(&self, order: &Order) -> Result<(), OrderError> {
        let link = self.collection_link();
        let response = self
            .request(Method::POST, &format!("{link}/docs"), "docs", &link)
            .await?
            .header("x-ms-documentdb-is-upsert", "True")
            .json(&self.document(order)?)
            .send()
            .await
            .map_err(|e| OrderError::persistence("upsert order", e))?;

        expect_success(response, "upsert order").await.map(|_| ())
    }

    async fn query_page(
        &self,
        continuation: Option<&str>,
    ) -> Result<(Vec<Order>, Option<String>), OrderError> {
        let link = self.collection_link();
        let body = json!({
            "query": PENDING_QUERY,
            "parameters": [{ "name": "@status", "value": OrderStatus::Pending.code() }],
        });

        let mut request = self
            .request(Method::POST, &format!("{link}/docs"), "docs", &link)
            .await?
            .header("x-ms-documentdb-isquery", "True")
            .header("content-type", "application/query+json")
            .body(body.to_string());
        if let Some(token) = continuation {
            request = request.header("x-ms-continuation", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OrderError::persistence("query pending orders", e))?;
        let response = expect_success(response, "query pending orders").await?;

        let next = response
            .headers()
            .get("x-ms-continuation")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let page: QueryPage = response
            .json()
            .await
            .map_err(|e| OrderError::persistence("decode pending orders", e))?;

        Ok((page.documents, next))
    }
}

#[async_trait]
impl OrderRepository for CosmosOrderRepository {
    async fn insert_orders(&self, orders: &[Order]) -> Result<(), OrderError> {
        for (written, order) in orders.iter().enumerate() {
            if let Err(e) = self.upsert(order).await {
                tracing::error!(
                    order_id = %order.order_id,
                    written = written,
                    total = orders.len(),
                    error = %e,
                    "Failed to upsert order"
                );
                return Err(OrderError::Persistence(format!(
                    "order {} not stored after {written} of {} orders: {e}",
                    order.order_id,
                    orders.len()
                )));
            }
        }

        tracing::info!(count = orders.len(), "Upserted orders into Cosmos DB");
        Ok(())
    }

    async fn get_pending_orders(&self) -> Result<Vec<Order>, OrderError> {
        let mut orders = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let (page, next) = self.query_page(continuation.as_deref()).await?;
            orders.extend(page);
            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        tracing::debug!(count = orders.len(), "Loaded pending orders from Cosmos DB");
        Ok(orders)
    }

    async fn get_order(&self, id: &str) -> Result<Order, OrderError> {
        let link = self.document_link(id);
        let response = self
            .request(Method::GET, &link, "docs", &link)
            .await?
            .send()
            .await
            .map_err(|e| OrderError::persistence("read order", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(OrderError::NotFound(id.to_string()));
        }

        expect_success(response, "read order")
            .await?
            .json()
            .await
            .map_err(|e| OrderError::persistence("decode order", e))
    }

    async fn update_order(&self, order: &Order) -> Result<(), OrderError> {
        let link = self.document_link(&order.order_id);
        let response = self
            .request(Method::PUT, &link, "docs", &link)
            .await?
            .json(&self.document(order)?)
            .send()
            .await
            .map_err(|e| OrderError::persistence("replace order", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(OrderError::NotFound(order.order_id.clone()));
        }

        expect_success(response, "replace order").await?;
        tracing::info!(order_id = %order.order_id, status = ?order.status, "Updated order");
        Ok(())
    }
}

async fn expect_success(response: Response, operation: &str) -> Result<Response, OrderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(OrderError::persistence(operation, format!("{status}: {body}")))
}

/// Entra ID scope for a Cosmos DB account endpoint.
fn token_scope(endpoint: &str) -> Result<String, OrderError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| OrderError::Configuration(format!("invalid Cosmos DB endpoint {endpoint}: {e}")))?;
    Ok(format!("{}/.default", url.origin().ascii_serialization()))
}

// ============================================================================
// Unit Tests
// ============================================================================
