//! Management-plane client seam
//!
//! The resource handlers talk to Azure through these traits; the concrete
//! HTTP/SDK client (and its authentication) is supplied by the embedding
//! application. Wire types serialize to the camelCase JSON the ARM endpoints
//! expect.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error from a management API call
#[derive(Debug, Error)]
pub enum ApiError {
    /// The entity does not exist (HTTP 404)
    #[error("resource was not found")]
    NotFound,

    /// Any other failed request
    #[error("management API request failed: {0}")]
    Request(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// HDInsight
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub properties: ClusterProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub vm_size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: String,
    pub target_instance_count: i32,
    pub hardware_profile: HardwareProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeProfile {
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptAction {
    pub name: String,
    pub uri: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpsEndpoint {
    pub destination_port: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_port: Option<i32>,
    pub access_modes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationProperties {
    pub application_type: String,
    pub marketplace_identifier: String,
    pub compute_profile: ComputeProfile,
    #[serde(rename = "httpsEndpoints", default)]
    pub https_endpoints: Vec<HttpsEndpoint>,
    #[serde(default)]
    pub install_script_actions: Vec<ScriptAction>,
    #[serde(default)]
    pub uninstall_script_actions: Vec<ScriptAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub properties: ApplicationProperties,
}

#[async_trait]
pub trait HdInsightApi: Send + Sync {
    async fn get_cluster(&self, resource_group: &str, cluster_name: &str) -> ApiResult<Cluster>;

    async fn get_application(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
    ) -> ApiResult<Application>;

    /// Issue the create and wait for the management operation to be accepted
    async fn create_application(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
        application: &Application,
    ) -> ApiResult<()>;

    async fn delete_application(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
    ) -> ApiResult<()>;
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSku {
    pub name: String,
    pub tier: String,
    pub capacity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_database_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_database_deletion_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_point_in_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_service_objective_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_service_objective_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elastic_pool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_secondary_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub location: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<DatabaseSku>,
    pub properties: DatabaseProperties,
}

#[async_trait]
pub trait SqlApi: Send + Sync {
    async fn get_database(
        &self,
        resource_group: &str,
        server_name: &str,
        name: &str,
    ) -> ApiResult<Database>;

    /// Issue the create/update and wait for the operation to complete
    async fn create_or_update_database(
        &self,
        resource_group: &str,
        server_name: &str,
        name: &str,
        database: &Database,
    ) -> ApiResult<Database>;

    async fn delete_database(
        &self,
        resource_group: &str,
        server_name: &str,
        name: &str,
    ) -> ApiResult<()>;
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCreation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub offer_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub additional_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionPolicies {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_placement_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spending_limit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subscription {
    pub id: String,
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_policies: Option<SubscriptionPolicies>,
}

#[async_trait]
pub trait SubscriptionsApi: Send + Sync {
    /// Create a subscription under an enrollment account; returns the new
    /// subscription GUID once provisioning has been accepted
    async fn create_in_enrollment_account(
        &self,
        enrollment_account: &str,
        parameters: &SubscriptionCreation,
    ) -> ApiResult<String>;

    async fn get(&self, subscription_id: &str) -> ApiResult<Subscription>;
}
