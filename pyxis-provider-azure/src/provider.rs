//! Azure Provider implementation
//!
//! Dispatches the generic CRUD operations onto the per-resource handlers and
//! validates configuration against the resource schemas before any remote
//! call is made.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pyxis_core::lock::MutexKv;
use pyxis_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use pyxis_core::resource::{Resource, ResourceId, State};
use pyxis_core::schema::ResourceSchema;
use pyxis_core::waiter;

use crate::api::{HdInsightApi, SqlApi, SubscriptionsApi};
use crate::resources::{hdinsight_application, mssql_database, subscription};

/// Azure management-plane provider
pub struct AzureProvider {
    pub(crate) hdinsight: Arc<dyn HdInsightApi>,
    pub(crate) sql: Arc<dyn SqlApi>,
    pub(crate) subscriptions: Arc<dyn SubscriptionsApi>,
    pub(crate) locks: MutexKv,
    /// Fires when the enclosing operation is being torn down; convergence
    /// waits abort promptly between probes
    pub(crate) cancel: CancellationToken,
    /// Refuse to create resources that already exist remotely, directing the
    /// user to import them instead
    pub(crate) require_import: bool,
    /// Overall limit on waiting for a cluster to settle
    pub(crate) cluster_timeout: Duration,
}

impl AzureProvider {
    pub fn new(
        hdinsight: Arc<dyn HdInsightApi>,
        sql: Arc<dyn SqlApi>,
        subscriptions: Arc<dyn SubscriptionsApi>,
    ) -> Self {
        Self {
            hdinsight,
            sql,
            subscriptions,
            locks: MutexKv::new(),
            cancel: CancellationToken::new(),
            require_import: false,
            cluster_timeout: waiter::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_require_import(mut self, require_import: bool) -> Self {
        self.require_import = require_import;
        self
    }

    pub fn with_cluster_timeout(mut self, timeout: Duration) -> Self {
        self.cluster_timeout = timeout;
        self
    }

    fn schema_for(&self, resource_type: &str) -> Option<ResourceSchema> {
        self.schemas()
            .into_iter()
            .find(|s| s.resource_type == resource_type)
    }

    fn validate(&self, resource: &Resource) -> ProviderResult<()> {
        let schema = self
            .schema_for(&resource.id.resource_type)
            .ok_or_else(|| unknown_resource_type(&resource.id))?;
        schema.validate(&resource.attributes).map_err(|e| {
            ProviderError::new(format!("invalid configuration: {e}"))
                .for_resource(resource.id.clone())
        })
    }
}

fn unknown_resource_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

impl Provider for AzureProvider {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn schemas(&self) -> Vec<ResourceSchema> {
        vec![
            hdinsight_application::schema(),
            mssql_database::schema(),
            subscription::schema(),
        ]
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            match id.resource_type.as_str() {
                hdinsight_application::RESOURCE_TYPE => {
                    self.read_hdinsight_application(&id, &identifier).await
                }
                mssql_database::RESOURCE_TYPE => self.read_mssql_database(&id, &identifier).await,
                subscription::RESOURCE_TYPE => self.read_subscription(&id, &identifier).await,
                _ => Err(unknown_resource_type(&id)),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            self.validate(&resource)?;
            match resource.id.resource_type.as_str() {
                hdinsight_application::RESOURCE_TYPE => {
                    self.create_hdinsight_application(&resource).await
                }
                mssql_database::RESOURCE_TYPE => {
                    self.create_or_update_mssql_database(&resource, None).await
                }
                subscription::RESOURCE_TYPE => self.create_subscription(&resource).await,
                _ => Err(unknown_resource_type(&resource.id)),
            }
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        _identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            match id.resource_type.as_str() {
                mssql_database::RESOURCE_TYPE => {
                    self.validate(&to)?;
                    self.create_or_update_mssql_database(&to, Some(&from)).await
                }
                hdinsight_application::RESOURCE_TYPE | subscription::RESOURCE_TYPE => {
                    Err(ProviderError::new(format!(
                        "update is not supported for {}, delete and recreate",
                        id.resource_type
                    ))
                    .for_resource(id))
                }
                _ => Err(unknown_resource_type(&id)),
            }
        })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            match id.resource_type.as_str() {
                hdinsight_application::RESOURCE_TYPE => {
                    self.delete_hdinsight_application(&id, &identifier).await
                }
                mssql_database::RESOURCE_TYPE => {
                    self.delete_mssql_database(&id, &identifier).await
                }
                subscription::RESOURCE_TYPE => self.delete_subscription(&id).await,
                _ => Err(unknown_resource_type(&id)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use pyxis_core::resource::Value;

    use super::*;
    use crate::api::{
        ApiError, ApiResult, Application, Cluster, ClusterProperties, Database, Subscription,
        SubscriptionCreation, SubscriptionPolicies,
    };

    const SUB: &str = "00000000-0000-0000-0000-000000000000";

    fn cluster_arm_id(resource_group: &str, cluster: &str) -> String {
        format!(
            "/subscriptions/{SUB}/resourceGroups/{resource_group}/providers/Microsoft.HDInsight/clusters/{cluster}"
        )
    }

    fn application_arm_id(resource_group: &str, cluster: &str, name: &str) -> String {
        format!("{}/applications/{name}", cluster_arm_id(resource_group, cluster))
    }

    fn database_arm_id(resource_group: &str, server: &str, name: &str) -> String {
        format!(
            "/subscriptions/{SUB}/resourceGroups/{resource_group}/providers/Microsoft.Sql/servers/{server}/databases/{name}"
        )
    }

    // -----------------------------------------------------------------------
    // Fake management-plane clients
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct FakeHdInsight {
        clusters: Mutex<HashMap<(String, String), String>>,
        applications: Mutex<HashMap<(String, String, String), Application>>,
        /// States handed out by successive get_cluster calls; once drained,
        /// the cluster reports `Running`
        cluster_states: Mutex<VecDeque<String>>,
    }

    impl FakeHdInsight {
        fn with_cluster(self, resource_group: &str, cluster: &str) -> Self {
            self.clusters.lock().unwrap().insert(
                (resource_group.to_string(), cluster.to_string()),
                cluster_arm_id(resource_group, cluster),
            );
            self
        }

        fn with_states<const N: usize>(self, states: [&str; N]) -> Self {
            *self.cluster_states.lock().unwrap() =
                states.iter().map(|s| s.to_string()).collect();
            self
        }
    }

    #[async_trait]
    impl HdInsightApi for FakeHdInsight {
        async fn get_cluster(
            &self,
            resource_group: &str,
            cluster_name: &str,
        ) -> ApiResult<Cluster> {
            let key = (resource_group.to_string(), cluster_name.to_string());
            let id = self
                .clusters
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or(ApiError::NotFound)?;
            let state = self
                .cluster_states
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "Running".to_string());
            Ok(Cluster {
                id,
                name: cluster_name.to_string(),
                properties: ClusterProperties {
                    cluster_state: Some(state),
                },
            })
        }

        async fn get_application(
            &self,
            resource_group: &str,
            cluster_name: &str,
            name: &str,
        ) -> ApiResult<Application> {
            let key = (
                resource_group.to_string(),
                cluster_name.to_string(),
                name.to_string(),
            );
            self.applications
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or(ApiError::NotFound)
        }

        async fn create_application(
            &self,
            resource_group: &str,
            cluster_name: &str,
            name: &str,
            application: &Application,
        ) -> ApiResult<()> {
            let mut stored = application.clone();
            stored.id = Some(application_arm_id(resource_group, cluster_name, name));
            self.applications.lock().unwrap().insert(
                (
                    resource_group.to_string(),
                    cluster_name.to_string(),
                    name.to_string(),
                ),
                stored,
            );
            Ok(())
        }

        async fn delete_application(
            &self,
            resource_group: &str,
            cluster_name: &str,
            name: &str,
        ) -> ApiResult<()> {
            let key = (
                resource_group.to_string(),
                cluster_name.to_string(),
                name.to_string(),
            );
            self.applications
                .lock()
                .unwrap()
                .remove(&key)
                .map(|_| ())
                .ok_or(ApiError::NotFound)
        }
    }

    #[derive(Default)]
    struct FakeSql {
        databases: Mutex<HashMap<(String, String, String), Database>>,
        last_payload: Mutex<Option<Database>>,
    }

    #[async_trait]
    impl SqlApi for FakeSql {
        async fn get_database(
            &self,
            resource_group: &str,
            server_name: &str,
            name: &str,
        ) -> ApiResult<Database> {
            let key = (
                resource_group.to_string(),
                server_name.to_string(),
                name.to_string(),
            );
            self.databases
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .ok_or(ApiError::NotFound)
        }

        async fn create_or_update_database(
            &self,
            resource_group: &str,
            server_name: &str,
            name: &str,
            database: &Database,
        ) -> ApiResult<Database> {
            *self.last_payload.lock().unwrap() = Some(database.clone());
            let mut stored = database.clone();
            stored.id = Some(database_arm_id(resource_group, server_name, name));
            self.databases.lock().unwrap().insert(
                (
                    resource_group.to_string(),
                    server_name.to_string(),
                    name.to_string(),
                ),
                stored.clone(),
            );
            Ok(stored)
        }

        async fn delete_database(
            &self,
            resource_group: &str,
            server_name: &str,
            name: &str,
        ) -> ApiResult<()> {
            let key = (
                resource_group.to_string(),
                server_name.to_string(),
                name.to_string(),
            );
            self.databases
                .lock()
                .unwrap()
                .remove(&key)
                .map(|_| ())
                .ok_or(ApiError::NotFound)
        }
    }

    #[derive(Default)]
    struct FakeSubscriptions {
        created: Mutex<Vec<(String, SubscriptionCreation)>>,
    }

    #[async_trait]
    impl SubscriptionsApi for FakeSubscriptions {
        async fn create_in_enrollment_account(
            &self,
            enrollment_account: &str,
            parameters: &SubscriptionCreation,
        ) -> ApiResult<String> {
            self.created
                .lock()
                .unwrap()
                .push((enrollment_account.to_string(), parameters.clone()));
            Ok(SUB.to_string())
        }

        async fn get(&self, subscription_id: &str) -> ApiResult<Subscription> {
            let created = self.created.lock().unwrap();
            let (_, parameters) = created.first().ok_or(ApiError::NotFound)?;
            if subscription_id != SUB {
                return Err(ApiError::NotFound);
            }
            Ok(Subscription {
                id: format!("/subscriptions/{SUB}"),
                subscription_id: SUB.to_string(),
                display_name: parameters.display_name.clone(),
                state: Some("Enabled".to_string()),
                subscription_policies: Some(SubscriptionPolicies {
                    location_placement_id: Some("Internal_2014-09-01".to_string()),
                    quota_id: Some("Internal_2014-09-01".to_string()),
                    spending_limit: Some("Off".to_string()),
                }),
            })
        }
    }

    fn provider(
        hdinsight: FakeHdInsight,
        sql: FakeSql,
        subscriptions: FakeSubscriptions,
    ) -> AzureProvider {
        AzureProvider::new(Arc::new(hdinsight), Arc::new(sql), Arc::new(subscriptions))
    }

    fn application_resource() -> Resource {
        let install = Value::List(vec![Value::Map(HashMap::from([
            ("name".to_string(), Value::String("install".into())),
            (
                "uri".to_string(),
                Value::String("https://example.com/install.sh".into()),
            ),
            (
                "roles".to_string(),
                Value::List(vec![Value::String("edgenode".into())]),
            ),
        ]))]);

        Resource::new(hdinsight_application::RESOURCE_TYPE, "app1")
            .with_attribute("name", Value::String("app1".into()))
            .with_attribute(
                "cluster_id",
                Value::String(cluster_arm_id("group1", "cluster1")),
            )
            .with_attribute("marketplace_identifier", Value::String("EmptyNode".into()))
            .with_attribute("vm_size", Value::String("Standard_D3_V2".into()))
            .with_attribute("install_script_action", install)
    }

    fn database_resource() -> Resource {
        Resource::new(mssql_database::RESOURCE_TYPE, "accounts")
            .with_attribute("name", Value::String("accounts".into()))
            .with_attribute("location", Value::String("West Europe".into()))
            .with_attribute("resource_group_name", Value::String("group1".into()))
            .with_attribute("server_name", Value::String("server1".into()))
            .with_attribute(
                "collation",
                Value::String("SQL_Latin1_General_CP1_CI_AS".into()),
            )
            .with_attribute(
                "tags",
                Value::Map(HashMap::from([(
                    "env".to_string(),
                    Value::String("staging".into()),
                )])),
            )
    }

    // -----------------------------------------------------------------------
    // HDInsight application
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn hdinsight_application_create_waits_for_cluster_and_reads_back() {
        // existence check sees Running, then the cluster cycles through the
        // provisioning states before settling
        let hdinsight = FakeHdInsight::default()
            .with_cluster("group1", "cluster1")
            .with_states([
                "Running",
                "Accepted",
                "AzureVMConfiguration",
                "HDInsightConfiguration",
                "Running",
                "Running",
                "Running",
            ]);
        let provider = provider(hdinsight, FakeSql::default(), FakeSubscriptions::default());

        let state = provider.create(&application_resource()).await.unwrap();

        assert!(state.exists);
        assert_eq!(
            state.identifier.as_deref(),
            Some(application_arm_id("group1", "cluster1", "app1").as_str())
        );
        assert_eq!(state.get_str("marketplace_identifier"), Some("EmptyNode"));
        assert_eq!(
            state.get_str("cluster_id"),
            Some(cluster_arm_id("group1", "cluster1").as_str())
        );
        // the API can transform vm_size, so it is never reflected
        assert!(state.get_str("vm_size").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn hdinsight_application_create_requires_the_cluster() {
        let provider = provider(
            FakeHdInsight::default(),
            FakeSql::default(),
            FakeSubscriptions::default(),
        );

        let err = provider.create(&application_resource()).await.unwrap_err();
        assert!(err.to_string().contains("was not found in Resource Group"));
    }

    #[tokio::test(start_paused = true)]
    async fn hdinsight_application_create_rejects_existing_when_importing() {
        let hdinsight = FakeHdInsight::default().with_cluster("group1", "cluster1");
        hdinsight
            .create_application(
                "group1",
                "cluster1",
                "app1",
                &existing_application(),
            )
            .await
            .unwrap();
        let provider = provider(hdinsight, FakeSql::default(), FakeSubscriptions::default())
            .with_require_import(true);

        let err = provider.create(&application_resource()).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test(start_paused = true)]
    async fn hdinsight_application_create_fails_when_cluster_fails() {
        let hdinsight = FakeHdInsight::default()
            .with_cluster("group1", "cluster1")
            .with_states(["Running", "Accepted", "Failed"]);
        let provider = provider(hdinsight, FakeSql::default(), FakeSubscriptions::default());

        let err = provider.create(&application_resource()).await.unwrap_err();
        assert!(err.to_string().contains("re-enter the `Running` state"));
    }

    #[tokio::test(start_paused = true)]
    async fn hdinsight_application_read_reports_not_found() {
        let hdinsight = FakeHdInsight::default().with_cluster("group1", "cluster1");
        let provider = provider(hdinsight, FakeSql::default(), FakeSubscriptions::default());

        let id = ResourceId::new(hdinsight_application::RESOURCE_TYPE, "app1");
        let state = provider
            .read(&id, &application_arm_id("group1", "cluster1", "app1"))
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test(start_paused = true)]
    async fn hdinsight_application_delete_tolerates_missing_application() {
        let hdinsight = FakeHdInsight::default().with_cluster("group1", "cluster1");
        let provider = provider(hdinsight, FakeSql::default(), FakeSubscriptions::default());

        let id = ResourceId::new(hdinsight_application::RESOURCE_TYPE, "app1");
        provider
            .delete(&id, &application_arm_id("group1", "cluster1", "app1"))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn hdinsight_application_update_is_rejected() {
        let provider = provider(
            FakeHdInsight::default(),
            FakeSql::default(),
            FakeSubscriptions::default(),
        );

        let id = ResourceId::new(hdinsight_application::RESOURCE_TYPE, "app1");
        let from = State::not_found(id.clone());
        let err = provider
            .update(&id, "ignored", &from, &application_resource())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("delete and recreate"));
    }

    #[tokio::test(start_paused = true)]
    async fn cluster_mutations_queue_behind_the_named_lock() {
        let hdinsight = Arc::new(FakeHdInsight::default().with_cluster("group1", "cluster1"));
        hdinsight
            .create_application("group1", "cluster1", "app1", &existing_application())
            .await
            .unwrap();
        let provider = Arc::new(AzureProvider::new(
            hdinsight.clone(),
            Arc::new(FakeSql::default()),
            Arc::new(FakeSubscriptions::default()),
        ));

        let guard = provider
            .locks
            .lock_scoped(hdinsight_application::LOCK_SCOPE, "cluster1")
            .await;

        let handle = {
            let provider = provider.clone();
            tokio::spawn(async move {
                let id = ResourceId::new(hdinsight_application::RESOURCE_TYPE, "app1");
                provider
                    .delete(&id, &application_arm_id("group1", "cluster1", "app1"))
                    .await
            })
        };

        // the delete is parked on the cluster lock, nothing has been removed
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!hdinsight.applications.lock().unwrap().is_empty());

        drop(guard);
        handle.await.unwrap().unwrap();
        assert!(hdinsight.applications.lock().unwrap().is_empty());
    }

    fn existing_application() -> Application {
        use crate::api::{ApplicationProperties, ComputeProfile, HardwareProfile, Role};
        Application {
            id: None,
            properties: ApplicationProperties {
                application_type: "CustomApplication".to_string(),
                marketplace_identifier: "EmptyNode".to_string(),
                compute_profile: ComputeProfile {
                    roles: vec![Role {
                        name: "edgenode".to_string(),
                        target_instance_count: 1,
                        hardware_profile: HardwareProfile {
                            vm_size: "Standard_D3_V2".to_string(),
                        },
                    }],
                },
                https_endpoints: vec![],
                install_script_actions: vec![],
                uninstall_script_actions: vec![],
            },
        }
    }

    // -----------------------------------------------------------------------
    // SQL database
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn mssql_database_create_sends_normalized_payload() {
        let sql = FakeSql::default();
        let provider = provider(FakeHdInsight::default(), sql, FakeSubscriptions::default());

        let state = provider.create(&database_resource()).await.unwrap();

        assert!(state.exists);
        assert_eq!(
            state.identifier.as_deref(),
            Some(database_arm_id("group1", "server1", "accounts").as_str())
        );
        assert_eq!(state.get_str("location"), Some("westeurope"));
        assert_eq!(
            state.get_str("collation"),
            Some("SQL_Latin1_General_CP1_CI_AS")
        );
        let tags = state.attributes.get("tags").and_then(Value::as_map).unwrap();
        assert_eq!(tags.get("env"), Some(&Value::String("staging".into())));
    }

    #[tokio::test]
    async fn mssql_database_create_defaults_create_mode() {
        let sql = Arc::new(FakeSql::default());
        let provider = AzureProvider::new(
            Arc::new(FakeHdInsight::default()),
            sql.clone(),
            Arc::new(FakeSubscriptions::default()),
        );

        provider.create(&database_resource()).await.unwrap();

        let payload = sql.last_payload.lock().unwrap().clone().unwrap();
        assert_eq!(payload.properties.create_mode.as_deref(), Some("Default"));
        assert_eq!(payload.location, "westeurope");
        assert_eq!(payload.tags.get("env").map(String::as_str), Some("staging"));
    }

    #[tokio::test]
    async fn mssql_database_edition_is_sent_and_reflected() {
        let sql = Arc::new(FakeSql::default());
        let provider = AzureProvider::new(
            Arc::new(FakeHdInsight::default()),
            sql.clone(),
            Arc::new(FakeSubscriptions::default()),
        );

        let resource =
            database_resource().with_attribute("edition", Value::String("Standard".into()));
        let state = provider.create(&resource).await.unwrap();

        let payload = sql.last_payload.lock().unwrap().clone().unwrap();
        assert_eq!(payload.properties.edition.as_deref(), Some("Standard"));
        assert_eq!(state.get_str("edition"), Some("Standard"));
    }

    #[tokio::test]
    async fn mssql_database_update_drops_stale_objective_id() {
        let sql = Arc::new(FakeSql::default());
        let provider = AzureProvider::new(
            Arc::new(FakeHdInsight::default()),
            sql.clone(),
            Arc::new(FakeSubscriptions::default()),
        );

        let objective_id = "455330e1-00cd-488b-b5fa-177c226f28b7";
        let id = ResourceId::new(mssql_database::RESOURCE_TYPE, "accounts");
        let from = State::existing(
            id.clone(),
            HashMap::from([
                (
                    "requested_service_objective_name".to_string(),
                    Value::String("S0".into()),
                ),
                (
                    "requested_service_objective_id".to_string(),
                    Value::String(objective_id.into()),
                ),
            ]),
        );
        let to = database_resource()
            .with_attribute(
                "requested_service_objective_name",
                Value::String("S1".into()),
            )
            .with_attribute(
                "requested_service_objective_id",
                Value::String(objective_id.into()),
            );

        provider
            .update(&id, "ignored", &from, &to)
            .await
            .unwrap();

        let payload = sql.last_payload.lock().unwrap().clone().unwrap();
        assert_eq!(
            payload.properties.requested_service_objective_name.as_deref(),
            Some("S1")
        );
        // the name changed on its own, so the stale id must not be sent
        assert_eq!(payload.properties.requested_service_objective_id, None);
    }

    #[tokio::test]
    async fn mssql_database_create_rejects_bad_deletion_date() {
        let provider = provider(
            FakeHdInsight::default(),
            FakeSql::default(),
            FakeSubscriptions::default(),
        );

        let resource = database_resource().with_attribute(
            "source_database_deletion_date",
            Value::String("yesterday".into()),
        );
        let err = provider.create(&resource).await.unwrap_err();
        assert!(err.to_string().contains("RFC3339"));
    }

    #[tokio::test]
    async fn mssql_database_create_rejects_existing_when_importing() {
        let sql = FakeSql::default();
        sql.create_or_update_database(
            "group1",
            "server1",
            "accounts",
            &Database {
                id: None,
                location: "westeurope".to_string(),
                tags: HashMap::new(),
                sku: None,
                properties: Default::default(),
            },
        )
        .await
        .unwrap();
        let provider = provider(FakeHdInsight::default(), sql, FakeSubscriptions::default())
            .with_require_import(true);

        let err = provider.create(&database_resource()).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn mssql_database_delete_tolerates_missing_database() {
        let provider = provider(
            FakeHdInsight::default(),
            FakeSql::default(),
            FakeSubscriptions::default(),
        );

        let id = ResourceId::new(mssql_database::RESOURCE_TYPE, "accounts");
        provider
            .delete(&id, &database_arm_id("group1", "server1", "accounts"))
            .await
            .unwrap();
    }

    // -----------------------------------------------------------------------
    // Subscription
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn subscription_create_reads_back_policies() {
        let provider = provider(
            FakeHdInsight::default(),
            FakeSql::default(),
            FakeSubscriptions::default(),
        );

        let resource = Resource::new(subscription::RESOURCE_TYPE, "dev")
            .with_attribute("name", Value::String("dev".into()))
            .with_attribute("enrollment_account", Value::String("ea1".into()))
            .with_attribute("offer_type", Value::String("MS-AZR-0017P".into()));

        let state = provider.create(&resource).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some(SUB));
        assert_eq!(state.get_str("subscription_id"), Some(SUB));
        assert_eq!(state.get_str("display_name"), Some("dev"));
        assert_eq!(state.get_str("state"), Some("Enabled"));
        assert_eq!(state.get_str("spending_limit"), Some("Off"));
    }

    #[tokio::test]
    async fn subscription_delete_is_a_noop() {
        let provider = provider(
            FakeHdInsight::default(),
            FakeSql::default(),
            FakeSubscriptions::default(),
        );

        let id = ResourceId::new(subscription::RESOURCE_TYPE, "dev");
        provider.delete(&id, SUB).await.unwrap();
    }

    // -----------------------------------------------------------------------
    // Dispatch and validation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn create_validates_against_the_schema() {
        let provider = provider(
            FakeHdInsight::default(),
            FakeSql::default(),
            FakeSubscriptions::default(),
        );

        let resource =
            database_resource().with_attribute("colour", Value::String("blue".into()));
        let err = provider.create(&resource).await.unwrap_err();
        assert!(err.to_string().contains("Unknown attribute"));
    }

    #[tokio::test]
    async fn unknown_resource_types_are_rejected() {
        let provider = provider(
            FakeHdInsight::default(),
            FakeSql::default(),
            FakeSubscriptions::default(),
        );

        let resource = Resource::new("storage_account", "logs");
        let err = provider.create(&resource).await.unwrap_err();
        assert!(err.to_string().contains("unknown resource type"));
    }
}
