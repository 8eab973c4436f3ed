use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::doc;
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, Credential, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use serde::Deserialize;
use std::time::Duration;

use super::repository::OrderRepository;
use crate::auth::TokenCredential;
use crate::domain::order::{Order, OrderError, OrderStatus};

// ============================================================================
// MongoDB Order Repository
// ============================================================================
//
// Works against MongoDB and any MongoDB-API service (Cosmos DB for MongoDB).
// Orders are addressed by their `orderId` field; the driver-assigned `_id`
// is never read. A unique index on `orderId` keeps concurrent upserts of the
// same order from inserting twice. Every write touches exactly one document,
// which MongoDB applies atomically.
//
// ============================================================================

const APP_NAME: &str = "makeline-service";
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Scope for Azure Resource Manager, used to list account connection strings.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionStrings {
    connection_strings: Vec<ConnectionStringEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionStringEntry {
    connection_string: String,
}

/// Asks Azure Resource Manager for the account's connection strings and
/// returns the first (primary) one. `list_url` is the full
/// `.../listConnectionStrings?api-version=...` URL.
pub async fn fetch_connection_string(
    http: &reqwest::Client,
    credential: &dyn TokenCredential,
    list_url: &str,
) -> Result<String, OrderError> {
    let token = credential.get_token(MANAGEMENT_SCOPE).await?;

    let response = http
        .post(list_url)
        .bearer_auth(&token.token)
        .header("content-length", "0")
        .send()
        .await
        .map_err(|e| OrderError::Connection(format!("cannot list connection strings: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OrderError::Connection(format!(
            "listing connection strings was rejected ({status}): {body}"
        )));
    }

    let listed: ConnectionStrings = response
        .json()
        .await
        .map_err(|e| OrderError::Connection(format!("malformed connection string listing: {e}")))?;

    listed
        .connection_strings
        .into_iter()
        .next()
        .map(|entry| entry.connection_string)
        .ok_or_else(|| OrderError::Connection("account returned no connection strings".to_string()))
}

/// `orderId_1`, unique. Creating it again is a no-op.
fn order_id_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "orderId": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

pub struct MongoOrderRepository {
    collection: Collection<Order>,
}

impl MongoOrderRepository {
    /// Connects with a connection string and optional username/password
    /// (the credential overrides any embedded in the URI).
    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, OrderError> {
        let mut options = ClientOptions::parse(uri).await.map_err(|e| {
            if matches!(*e.kind, ErrorKind::InvalidArgument { .. }) {
                OrderError::Configuration(format!("invalid MongoDB connection string: {e}"))
            } else {
                OrderError::Connection(format!("cannot resolve MongoDB connection string: {e}"))
            }
        })?;

        if let Some(username) = username.filter(|u| !u.is_empty()) {
            let mut credential = Credential::default();
            credential.username = Some(username.to_string());
            credential.password = password.map(str::to_string);
            options.credential = Some(credential);
        }
        options.app_name = Some(APP_NAME.to_string());
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);

        let client = Client::with_options(options)
            .map_err(|e| OrderError::Configuration(format!("invalid MongoDB client options: {e}")))?;
        let db = client.database(database);

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| OrderError::Connection(format!("MongoDB ping failed: {e}")))?;

        let orders = db.collection::<Order>(collection);
        orders
            .create_index(order_id_index())
            .await
            .map_err(|e| OrderError::Connection(format!("cannot ensure unique orderId index: {e}")))?;

        tracing::info!(database = %database, collection = %collection, "Connected to MongoDB");

        Ok(Self { collection: orders })
    }

    /// Connects with workload identity: the connection string is fetched
    /// from Azure Resource Manager instead of being configured.
    pub async fn connect_with_credential(
        http: &reqwest::Client,
        credential: &dyn TokenCredential,
        list_connection_strings_url: &str,
        database: &str,
        collection: &str,
    ) -> Result<Self, OrderError> {
        let uri = fetch_connection_string(http, credential, list_connection_strings_url).await?;
        Self::connect(&uri, database, collection, None, None).await
    }
}

#[async_trait]
impl OrderRepository for MongoOrderRepository {
    async fn insert_orders(&self, orders: &[Order]) -> Result<(), OrderError> {
        for (written, order) in orders.iter().enumerate() {
            let result = self
                .collection
                .replace_one(doc! { "orderId": order.order_id.as_str() }, order)
                .upsert(true)
                .await;

            if let Err(e) = result {
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

        tracing::info!(count = orders.len(), "Upserted orders into MongoDB");
        Ok(())
    }

    async fn get_pending_orders(&self) -> Result<Vec<Order>, OrderError> {
        let cursor = self
            .collection
            .find(doc! { "status": i32::from(OrderStatus::Pending.code()) })
            .sort(doc! { "orderId": 1 })
            .await
            .map_err(|e| OrderError::persistence("query pending orders", e))?;

        let orders: Vec<Order> = cursor
            .try_collect()
            .await
            .map_err(|e| OrderError::persistence("read pending orders", e))?;

        tracing::debug!(count = orders.len(), "Loaded pending orders from MongoDB");
        Ok(orders)
    }

    async fn get_order(&self, id: &str) -> Result<Order, OrderError> {
        self.collection
            .find_one(doc! { "orderId": id })
            .await
            .map_err(|e| OrderError::persistence("read order", e))?
            .ok_or_else(|| OrderError::NotFound(id.to_string()))
    }

    async fn update_order(&self, order: &Order) -> Result<(), OrderError> {
        let result = self
            .collection
            .replace_one(doc! { "orderId": order.order_id.as_str() }, order)
            .await
            .map_err(|e| OrderError::persistence("replace order", e))?;

        if result.matched_count == 0 {
            return Err(OrderError::NotFound(order.order_id.clone()));
        }

        tracing::info!(order_id = %order.order_id, status = ?order.status, "Updated order");
        Ok(())
    }
}
