use std::sync::Arc;

use super::cosmos::CosmosOrderRepository;
use super::mongo::MongoOrderRepository;
use super::repository::{OrderRepository, PartitionKey};
use crate::auth::{AuthMode, TokenCredential, WorkloadIdentityCredential};
use crate::config::{BackendKind, DatabaseSettings};
use crate::domain::order::OrderError;

// ============================================================================
// Backend Factory
// ============================================================================
//
// Two independent axes, four explicit constructors:
//
//   backend \ auth | WorkloadIdentity               | StaticCredential
//   ---------------+--------------------------------+------------------------------
//   MongoDb        | list-connection-strings URL    | connection URI (+user/pass)
//   CosmosDbSql    | endpoint + partition key       | endpoint + key + partition key
//
// Settings are validated into a BackendPlan before any I/O, so missing values
// fail with Configuration. Connecting then validates reachability once; a
// repository that comes back from here is connected.
//
// ============================================================================

/// A fully specified backend, one variant per (backend, auth) pair.
#[derive(Clone, PartialEq)]
pub enum BackendPlan {
    MongoStatic {
        uri: String,
        database: String,
        collection: String,
        username: Option<String>,
        password: Option<String>,
    },
    MongoWorkloadIdentity {
        list_connection_strings_url: String,
        database: String,
        collection: String,
    },
    CosmosStatic {
        endpoint: String,
        database: String,
        container: String,
        account_key: String,
        partition_key: PartitionKey,
    },
    CosmosWorkloadIdentity {
        endpoint: String,
        database: String,
        container: String,
        partition_key: PartitionKey,
    },
}

impl std::fmt::Debug for BackendPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

fn require(value: &Option<String>, setting: &str) -> Result<String, OrderError> {
    value.clone().ok_or_else(|| OrderError::missing(setting))
}

impl BackendPlan {
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self, OrderError> {
        let database = require(&settings.database_name, "ORDER_DB_NAME")?;

        match (settings.backend, settings.auth) {
            (BackendKind::MongoDb, AuthMode::StaticCredential) => Ok(Self::MongoStatic {
                uri: require(&settings.endpoint, "ORDER_DB_URI")?,
                database,
                collection: require(&settings.collection_name, "ORDER_DB_COLLECTION_NAME")?,
                username: settings.username.clone(),
                password: settings.password.clone(),
            }),
            (BackendKind::MongoDb, AuthMode::WorkloadIdentity) => Ok(Self::MongoWorkloadIdentity {
                list_connection_strings_url: require(
                    &settings.list_connection_strings_url,
                    "ORDER_DB_LIST_CONNECTION_STRING_URL",
                )?,
                database,
                collection: require(&settings.collection_name, "ORDER_DB_COLLECTION_NAME")?,
            }),
            (BackendKind::CosmosDbSql, AuthMode::StaticCredential) => Ok(Self::CosmosStatic {
                endpoint: require(&settings.endpoint, "AZURE_COSMOS_RESOURCEENDPOINT")?,
                database,
                container: require(&settings.container_name, "ORDER_DB_CONTAINER_NAME")?,
                account_key: require(&settings.password, "ORDER_DB_PASSWORD")?,
                partition_key: partition_key(settings)?,
            }),
            (BackendKind::CosmosDbSql, AuthMode::WorkloadIdentity) => Ok(Self::CosmosWorkloadIdentity {
                endpoint: require(&settings.endpoint, "AZURE_COSMOS_RESOURCEENDPOINT")?,
                database,
                container: require(&settings.container_name, "ORDER_DB_CONTAINER_NAME")?,
                partition_key: partition_key(settings)?,
            }),
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            Self::MongoStatic { .. } | Self::MongoWorkloadIdentity { .. } => BackendKind::MongoDb,
            Self::CosmosStatic { .. } | Self::CosmosWorkloadIdentity { .. } => BackendKind::CosmosDbSql,
        }
    }

    pub fn auth(&self) -> AuthMode {
        match self {
            Self::MongoWorkloadIdentity { .. } | Self::CosmosWorkloadIdentity { .. } => {
                AuthMode::WorkloadIdentity
            }
            Self::MongoStatic { .. } | Self::CosmosStatic { .. } => AuthMode::StaticCredential,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::MongoStatic { .. } => "MongoDB with username and password",
            Self::MongoWorkloadIdentity { .. } => "MongoDB with workload identity",
            Self::CosmosStatic { .. } => "Cosmos DB with account key",
            Self::CosmosWorkloadIdentity { .. } => "Cosmos DB with workload identity",
        }
    }

    /// Builds and connects the repository. Workload identity plans use
    /// `credential` when given, otherwise one built from the pod environment.
    pub async fn connect(
        self,
        http: reqwest::Client,
        credential: Option<Arc<dyn TokenCredential>>,
    ) -> Result<Arc<dyn OrderRepository>, OrderError> {
        tracing::info!(backend = %self.backend().as_str(), auth = ?self.auth(), "Using {}", self.describe());

        let workload_identity = |http: &reqwest::Client| -> Result<Arc<dyn TokenCredential>, OrderError> {
            match &credential {
                Some(credential) => Ok(credential.clone()),
                None => Ok(Arc::new(WorkloadIdentityCredential::from_env(http.clone())?)),
            }
        };

        let repo: Arc<dyn OrderRepository> = match self {
            Self::MongoStatic { uri, database, collection, username, password } => Arc::new(
                MongoOrderRepository::connect(
                    &uri,
                    &database,
                    &collection,
                    username.as_deref(),
                    password.as_deref(),
                )
                .await?,
            ),
            Self::MongoWorkloadIdentity { list_connection_strings_url, database, collection } => {
                let credential = workload_identity(&http)?;
                Arc::new(
                    MongoOrderRepository::connect_with_credential(
                        &http,
                        credential.as_ref(),
                        &list_connection_strings_url,
                        &database,
                        &collection,
                    )
                    .await?,
                )
            }
            Self::CosmosStatic { endpoint, database, container, account_key, partition_key } => Arc::new(
                CosmosOrderRepository::connect_with_key(
                    http,
                    &endpoint,
                    &database,
                    &container,
                    &account_key,
                    partition_key,
                )
                .await?,
            ),
            Self::CosmosWorkloadIdentity { endpoint, database, container, partition_key } => {
                let credential = workload_identity(&http)?;
                Arc::new(
                    CosmosOrderRepository::connect_with_credential(
                        http,
                        &endpoint,
                        &database,
                        &container,
                        credential,
                        partition_key,
                    )
                    .await?,
                )
            }
        };

        Ok(repo)
    }
}

fn partition_key(settings: &DatabaseSettings) -> Result<PartitionKey, OrderError> {
    PartitionKey::new(
        &require(&settings.partition_key, "ORDER_DB_PARTITION_KEY")?,
        &require(&settings.partition_value, "ORDER_DB_PARTITION_VALUE")?,
    )
}

/// Validates settings and connects the configured backend.
pub async fn connect_repository(settings: &DatabaseSettings) -> Result<Arc<dyn OrderRepository>, OrderError> {
    let plan = BackendPlan::from_settings(settings)?;
    plan.connect(reqwest::Client::new(), None).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FixedTokenCredential;
    use crate::db::conformance;
    use crate::db::cosmos::tests::{start_fake, CONTAINER, DATABASE};
    use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};

    fn settings(backend: BackendKind, auth: AuthMode) -> DatabaseSettings {
        DatabaseSettings {
            backend,
            auth,
            database_name: Some("orderdb".to_string()),
            collection_name: Some("orders".to_string()),
            container_name: Some("orders".to_string()),
            partition_key: Some("storeId".to_string()),
            partition_value: Some("pets".to_string()),
            endpoint: Some("mongodb://localhost:27017".to_string()),
            username: Some("user".to_string()),
            password: Some(BASE64_STANDARD.encode("key")),
            list_connection_strings_url: Some("https://management.example/list".to_string()),
        }
    }

    const ALL: [(BackendKind, AuthMode); 4] = [
        (BackendKind::MongoDb, AuthMode::StaticCredential),
        (BackendKind::MongoDb, AuthMode::WorkloadIdentity),
        (BackendKind::CosmosDbSql, AuthMode::StaticCredential),
        (BackendKind::CosmosDbSql, AuthMode::WorkloadIdentity),
    ];

    #[test]
    fn test_every_combination_maps_to_its_own_plan() {
        for (backend, auth) in ALL {
            let plan = BackendPlan::from_settings(&settings(backend, auth)).unwrap();
            assert_eq!(plan.backend(), backend);
            assert_eq!(plan.auth(), auth);
        }
    }

    #[test]
    fn test_database_name_required_everywhere() {
        for (backend, auth) in ALL {
            let mut s = settings(backend, auth);
            s.database_name = None;
            match BackendPlan::from_settings(&s) {
                Err(OrderError::Configuration(message)) => assert!(message.contains("ORDER_DB_NAME")),
                other => panic!("{backend:?}/{auth:?}: expected configuration error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_required_settings_per_combination() {
        let cases: [(BackendKind, AuthMode, fn(&mut DatabaseSettings), &str); 8] = [
            (BackendKind::MongoDb, AuthMode::StaticCredential, |s| s.endpoint = None, "ORDER_DB_URI"),
            (BackendKind::MongoDb, AuthMode::StaticCredential, |s| s.collection_name = None, "ORDER_DB_COLLECTION_NAME"),
            (BackendKind::MongoDb, AuthMode::WorkloadIdentity, |s| s.list_connection_strings_url = None, "ORDER_DB_LIST_CONNECTION_STRING_URL"),
            (BackendKind::MongoDb, AuthMode::WorkloadIdentity, |s| s.collection_name = None, "ORDER_DB_COLLECTION_NAME"),
            (BackendKind::CosmosDbSql, AuthMode::StaticCredential, |s| s.password = None, "ORDER_DB_PASSWORD"),
            (BackendKind::CosmosDbSql, AuthMode::StaticCredential, |s| s.container_name = None, "ORDER_DB_CONTAINER_NAME"),
            (BackendKind::CosmosDbSql, AuthMode::WorkloadIdentity, |s| s.partition_key = None, "ORDER_DB_PARTITION_KEY"),
            (BackendKind::CosmosDbSql, AuthMode::WorkloadIdentity, |s| s.partition_value = None, "ORDER_DB_PARTITION_VALUE"),
        ];

        for (backend, auth, unset, setting) in cases {
            let mut s = settings(backend, auth);
            unset(&mut s);
            match BackendPlan::from_settings(&s) {
                Err(OrderError::Configuration(message)) => assert!(message.contains(setting), "{message}"),
                other => panic!("{backend:?}/{auth:?} without {setting}: got {other:?}"),
            }
        }
    }

    #[test]
    fn test_settings_not_needed_by_a_combination_are_ignored() {
        let mut s = settings(BackendKind::MongoDb, AuthMode::WorkloadIdentity);
        s.endpoint = None;
        s.password = None;
        s.partition_key = None;
        assert!(BackendPlan::from_settings(&s).is_ok());

        let mut s = settings(BackendKind::CosmosDbSql, AuthMode::WorkloadIdentity);
        s.password = None;
        s.collection_name = None;
        assert!(BackendPlan::from_settings(&s).is_ok());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let plan = BackendPlan::from_settings(&settings(BackendKind::MongoDb, AuthMode::StaticCredential)).unwrap();
        assert_eq!(format!("{plan:?}"), "MongoDB with username and password");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_connection_error() {
        let mut s = settings(BackendKind::CosmosDbSql, AuthMode::StaticCredential);
        s.endpoint = Some("http://127.0.0.1:9".to_string());

        let result = connect_repository(&s).await;
        assert!(matches!(result, Err(OrderError::Connection(_))));
    }

    #[tokio::test]
    async fn test_workload_identity_without_pod_identity_fails_fast() {
        let plan = BackendPlan::CosmosWorkloadIdentity {
            endpoint: "http://127.0.0.1:9".to_string(),
            database: DATABASE.to_string(),
            container: CONTAINER.to_string(),
            partition_key: PartitionKey::new("storeId", "pets").unwrap(),
        };

        // The test process has no AZURE_FEDERATED_TOKEN_FILE, so either the
        // credential cannot be built or the endpoint cannot be reached.
        let result = plan.connect(reqwest::Client::new(), None).await;
        assert!(matches!(
            result,
            Err(OrderError::Configuration(_)) | Err(OrderError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_connected_cosmos_repository_honours_contract() {
        let (server, _fake) = start_fake().await;
        let mut s = settings(BackendKind::CosmosDbSql, AuthMode::WorkloadIdentity);
        s.endpoint = Some(server.uri());

        let repo = BackendPlan::from_settings(&s)
            .unwrap()
            .connect(reqwest::Client::new(), Some(Arc::new(FixedTokenCredential("entra-token"))))
            .await
            .unwrap();

        let transcript = conformance::run_order_lifecycle(repo.as_ref()).await;
        assert_eq!(transcript, conformance::expected_transcript());
    }
}
