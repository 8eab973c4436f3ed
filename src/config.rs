use std::time::Duration;

use crate::auth::AuthMode;
use crate::domain::order::OrderError;

// ============================================================================
// Configuration
// ============================================================================
//
// Read from environment variables. A `.env` file in the working directory is
// loaded first when present.
//
// Only value shape is checked here, plus the call budget against the queue
// wait. Whether the database settings are complete for the chosen backend and
// auth mode is decided by the backend factory.
//
// ============================================================================

/// Which document store backs the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// MongoDB API (MongoDB, Cosmos DB for MongoDB).
    MongoDb,
    /// Cosmos DB NoSQL API, partitioned containers.
    CosmosDbSql,
}

impl BackendKind {
    pub fn parse(raw: Option<&str>) -> Result<Self, OrderError> {
        match raw.map(str::trim).unwrap_or_default().to_lowercase().as_str() {
            "" | "mongodb" => Ok(Self::MongoDb),
            "cosmosdbsql" => Ok(Self::CosmosDbSql),
            other => Err(OrderError::Configuration(format!(
                "ORDER_DB_API must be mongodb or cosmosdbsql, got {other:?}"
            ))),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MongoDb => "mongodb",
            Self::CosmosDbSql => "cosmosdbsql",
        }
    }
}

/// Everything the backend factory may need. Required-ness depends on the
/// (backend, auth) pair, so every field is optional here.
#[derive(Clone)]
pub struct DatabaseSettings {
    pub backend: BackendKind,
    pub auth: AuthMode,
    pub database_name: Option<String>,
    pub collection_name: Option<String>,
    pub container_name: Option<String>,
    pub partition_key: Option<String>,
    pub partition_value: Option<String>,
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub list_connection_strings_url: Option<String>,
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("backend", &self.backend)
            .field("auth", &self.auth)
            .field("database_name", &self.database_name)
            .field("collection_name", &self.collection_name)
            .field("container_name", &self.container_name)
            .field("partition_key", &self.partition_key)
            .field("partition_value", &self.partition_value)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("list_connection_strings_url", &self.list_connection_strings_url)
            .finish()
    }
}

/// Order queue (Kafka / Redpanda) consumer settings.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    /// Most messages pulled per ingestion.
    pub batch_size: usize,
    /// How long a pull waits for the batch to fill.
    pub batch_wait: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "orders".to_string(),
            group_id: "makeline-service".to_string(),
            batch_size: 10,
            batch_wait: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub queue: QueueSettings,
    pub port: u16,
    pub app_version: String,
    /// Budget for each repository or queue call made on behalf of a request.
    pub call_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, OrderError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, OrderError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let queue_defaults = QueueSettings::default();

        let database = DatabaseSettings {
            backend: BackendKind::parse(get("ORDER_DB_API").as_deref())?,
            auth: parse_auth_mode(get("USE_WORKLOAD_IDENTITY_AUTH").as_deref())?,
            database_name: get("ORDER_DB_NAME"),
            collection_name: get("ORDER_DB_COLLECTION_NAME"),
            container_name: get("ORDER_DB_CONTAINER_NAME"),
            partition_key: get("ORDER_DB_PARTITION_KEY"),
            partition_value: get("ORDER_DB_PARTITION_VALUE"),
            endpoint: get("AZURE_COSMOS_RESOURCEENDPOINT").or_else(|| get("ORDER_DB_URI")),
            username: get("ORDER_DB_USERNAME"),
            password: get("ORDER_DB_PASSWORD"),
            list_connection_strings_url: get("ORDER_DB_LIST_CONNECTION_STRING_URL"),
        };

        let queue = QueueSettings {
            brokers: get("ORDER_QUEUE_BROKERS").unwrap_or(queue_defaults.brokers),
            topic: get("ORDER_QUEUE_TOPIC").unwrap_or(queue_defaults.topic),
            group_id: get("ORDER_QUEUE_GROUP_ID").unwrap_or(queue_defaults.group_id),
            batch_size: parse_or("ORDER_QUEUE_BATCH_SIZE", get("ORDER_QUEUE_BATCH_SIZE"), queue_defaults.batch_size)?,
            batch_wait: Duration::from_millis(parse_or(
                "ORDER_QUEUE_BATCH_WAIT_MS",
                get("ORDER_QUEUE_BATCH_WAIT_MS"),
                queue_defaults.batch_wait.as_millis() as u64,
            )?),
        };

        if queue.batch_size == 0 {
            return Err(OrderError::Configuration("ORDER_QUEUE_BATCH_SIZE must be at least 1".to_string()));
        }

        let call_timeout = Duration::from_millis(parse_or(
            "ORDER_CALL_TIMEOUT_MS",
            get("ORDER_CALL_TIMEOUT_MS"),
            10_000,
        )?);

        // A pull may legitimately take the whole batch wait.
        if call_timeout <= queue.batch_wait {
            return Err(OrderError::Configuration(format!(
                "ORDER_CALL_TIMEOUT_MS ({} ms) must exceed ORDER_QUEUE_BATCH_WAIT_MS ({} ms)",
                call_timeout.as_millis(),
                queue.batch_wait.as_millis()
            )));
        }

        Ok(Self {
            database,
            queue,
            port: parse_or("PORT", get("PORT"), 3001)?,
            app_version: get("APP_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            call_timeout,
        })
    }
}

fn parse_auth_mode(raw: Option<&str>) -> Result<AuthMode, OrderError> {
    match raw.map(|value| value.trim().to_lowercase()).as_deref() {
        None | Some("false") => Ok(AuthMode::StaticCredential),
        Some("true") => Ok(AuthMode::WorkloadIdentity),
        Some(other) => Err(OrderError::Configuration(format!(
            "USE_WORKLOAD_IDENTITY_AUTH must be true or false, got {other:?}"
        ))),
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, OrderError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| OrderError::Configuration(format!("{name} is invalid ({value:?}): {e}"))),
    }
}
