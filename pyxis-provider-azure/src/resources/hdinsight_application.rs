//! HDInsight application resource
//!
//! An application is installed onto an existing HDInsight cluster. The
//! management API acknowledges the install/uninstall immediately (the
//! deployment starts inside Ambari), so both create and delete must wait for
//! the parent cluster to re-enter the `Running` state before the operation
//! can be considered done. The cluster also only tolerates one change at a
//! time, so mutations are serialized through the named lock registry.

use std::collections::HashMap;
use std::time::Duration;

use pyxis_core::provider::{ProviderError, ProviderResult};
use pyxis_core::resource::{Resource, ResourceId, State, Value};
use pyxis_core::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema};
use pyxis_core::waiter::{ProbeError, StateWaiter};

use crate::api::{
    ApiError, Application, ApplicationProperties, ComputeProfile, HardwareProfile, HttpsEndpoint,
    Role, ScriptAction,
};
use crate::azure::{parse_azure_resource_id, validate_resource_id_value};
use crate::provider::AzureProvider;

pub const RESOURCE_TYPE: &str = "hdinsight_application";

/// Lock scope shared by everything that mutates an HDInsight cluster
pub(crate) const LOCK_SCOPE: &str = "azurerm_hdinsight";

const VALID_ROLES: [&str; 4] = ["edgenode", "headnode", "workernode", "zookeepernode"];

fn roles_type() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::Enum(
        VALID_ROLES.iter().map(|r| r.to_string()).collect(),
    )))
}

fn script_action_block(roles_required: bool) -> AttributeType {
    let roles = if roles_required {
        AttributeSchema::required(roles_type()).force_new()
    } else {
        AttributeSchema::optional(roles_type()).force_new()
    };
    AttributeType::List(Box::new(AttributeType::Block(
        BlockSchema::new()
            .attribute(
                "name",
                AttributeSchema::required(AttributeType::String).force_new(),
            )
            .attribute(
                "uri",
                AttributeSchema::required(AttributeType::String).force_new(),
            )
            .attribute("roles", roles),
    )))
}

pub fn schema() -> ResourceSchema {
    let https_endpoint = AttributeType::List(Box::new(AttributeType::Block(
        BlockSchema::new()
            .attribute(
                "destination_port",
                AttributeSchema::required(AttributeType::Int).force_new(),
            )
            .attribute(
                "public_port",
                AttributeSchema::optional(AttributeType::Int).force_new(),
            )
            .attribute(
                "access_modes",
                AttributeSchema::optional(AttributeType::List(Box::new(AttributeType::String)))
                    .force_new(),
            ),
    )));

    ResourceSchema::new(RESOURCE_TYPE)
        .attribute(
            "name",
            AttributeSchema::required(AttributeType::String).force_new(),
        )
        .attribute(
            "cluster_id",
            AttributeSchema::required(AttributeType::Custom {
                name: "ResourceId".to_string(),
                validate: validate_resource_id_value,
            })
            .force_new(),
        )
        .attribute(
            "marketplace_identifier",
            AttributeSchema::required(AttributeType::String).force_new(),
        )
        .attribute(
            "vm_size",
            AttributeSchema::required(AttributeType::String).force_new(),
        )
        .attribute(
            "install_script_action",
            AttributeSchema::required(script_action_block(false)).force_new(),
        )
        .attribute(
            "uninstall_script_action",
            AttributeSchema::optional(script_action_block(true)).force_new(),
        )
        .attribute(
            "https_endpoint",
            AttributeSchema::optional(https_endpoint).force_new(),
        )
}

impl AzureProvider {
    pub(crate) async fn create_hdinsight_application(
        &self,
        resource: &Resource,
    ) -> ProviderResult<State> {
        let id = resource.id.clone();
        log::info!("preparing arguments for HDInsight Application creation");

        let name = required_str(resource, "name")?;
        let cluster_id_raw = required_str(resource, "cluster_id")?;
        let cluster_id = parse_azure_resource_id(cluster_id_raw).map_err(|e| {
            ProviderError::new("`cluster_id` is not a valid resource ID")
                .with_cause(e)
                .for_resource(id.clone())
        })?;
        let cluster_name = cluster_id
            .segment("clusters")
            .ok_or_else(|| {
                ProviderError::new("`cluster_id` does not reference an HDInsight cluster")
                    .for_resource(id.clone())
            })?
            .to_string();
        let resource_group = cluster_id.resource_group.clone();

        match self.hdinsight.get_cluster(&resource_group, &cluster_name).await {
            Ok(_) => {}
            Err(ApiError::NotFound) => {
                return Err(ProviderError::new(format!(
                    "HDInsight Cluster {cluster_name:?} was not found in Resource Group {resource_group:?}"
                ))
                .for_resource(id));
            }
            Err(e) => {
                return Err(ProviderError::new(format!(
                    "retrieving HDInsight Cluster {cluster_name:?} (Resource Group {resource_group:?})"
                ))
                .with_cause(e)
                .for_resource(id));
            }
        }

        if self.require_import {
            match self
                .hdinsight
                .get_application(&resource_group, &cluster_name, name)
                .await
            {
                Ok(existing) => {
                    return Err(ProviderError::new(format!(
                        "an HDInsight Application with ID {:?} already exists - import it to manage it",
                        existing.id.unwrap_or_default()
                    ))
                    .for_resource(id));
                }
                Err(ApiError::NotFound) => {}
                Err(e) => {
                    return Err(ProviderError::new(format!(
                        "checking for presence of existing HDInsight Application {name:?} (Cluster {cluster_name:?} / Resource Group {resource_group:?})"
                    ))
                    .with_cause(e)
                    .for_resource(id));
                }
            }
        }

        let application = Application {
            id: None,
            properties: ApplicationProperties {
                application_type: "CustomApplication".to_string(),
                marketplace_identifier: required_str(resource, "marketplace_identifier")?
                    .to_string(),
                compute_profile: ComputeProfile {
                    // the API only accepts a single edge node here
                    roles: vec![Role {
                        name: "edgenode".to_string(),
                        target_instance_count: 1,
                        hardware_profile: HardwareProfile {
                            vm_size: required_str(resource, "vm_size")?.to_string(),
                        },
                    }],
                },
                https_endpoints: expand_https_endpoints(resource.attributes.get("https_endpoint")),
                install_script_actions: expand_script_actions(
                    resource.attributes.get("install_script_action"),
                ),
                uninstall_script_actions: expand_script_actions(
                    resource.attributes.get("uninstall_script_action"),
                ),
            },
        };

        // only one change can be made to an HDInsight Cluster at any one time
        let _lock = self.locks.lock_scoped(LOCK_SCOPE, &cluster_name).await;

        self.hdinsight
            .create_application(&resource_group, &cluster_name, name, &application)
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "creating HDInsight Application {name:?} (Cluster {cluster_name:?} / Resource Group {resource_group:?})"
                ))
                .with_cause(e)
                .for_resource(id.clone())
            })?;

        // the create is acknowledged as soon as the deployment starts within
        // Ambari; the cluster has to re-enter `Running` before we can read
        self.wait_for_hdinsight_cluster(&resource_group, &cluster_name)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        let read = self
            .hdinsight
            .get_application(&resource_group, &cluster_name, name)
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "retrieving HDInsight Application {name:?} (Cluster {cluster_name:?} / Resource Group {resource_group:?})"
                ))
                .with_cause(e)
                .for_resource(id.clone())
            })?;

        let identifier = read.id.filter(|v| !v.is_empty()).ok_or_else(|| {
            ProviderError::new(format!(
                "cannot read ID for HDInsight Application {name:?} (Cluster {cluster_name:?} / Resource Group {resource_group:?})"
            ))
            .for_resource(id.clone())
        })?;

        self.read_hdinsight_application(&id, &identifier).await
    }

    pub(crate) async fn read_hdinsight_application(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let parsed = parse_azure_resource_id(identifier)
            .map_err(|e| ProviderError::new("invalid application ID").with_cause(e).for_resource(id.clone()))?;
        let resource_group = parsed.resource_group.clone();
        let cluster_name = parsed
            .segment("clusters")
            .ok_or_else(|| missing_segment(id, identifier, "clusters"))?
            .to_string();
        let name = parsed
            .segment("applications")
            .ok_or_else(|| missing_segment(id, identifier, "applications"))?
            .to_string();

        let application = match self
            .hdinsight
            .get_application(&resource_group, &cluster_name, &name)
            .await
        {
            Ok(application) => application,
            Err(ApiError::NotFound) => {
                log::debug!(
                    "HDInsight Application {:?} (Cluster {:?} / Resource Group {:?}) was not found - removing from state",
                    name,
                    cluster_name,
                    resource_group
                );
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => {
                return Err(ProviderError::new(format!(
                    "retrieving HDInsight Application {name:?} (Cluster {cluster_name:?} / Resource Group {resource_group:?})"
                ))
                .with_cause(e)
                .for_resource(id.clone()));
            }
        };

        let cluster = match self.hdinsight.get_cluster(&resource_group, &cluster_name).await {
            Ok(cluster) => cluster,
            Err(ApiError::NotFound) => {
                log::debug!(
                    "HDInsight Cluster {:?} (Resource Group {:?}) was not found - removing from state",
                    cluster_name,
                    resource_group
                );
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => {
                return Err(ProviderError::new(format!(
                    "retrieving HDInsight Cluster {cluster_name:?} (Resource Group {resource_group:?})"
                ))
                .with_cause(e)
                .for_resource(id.clone()));
            }
        };

        let props = &application.properties;
        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), Value::String(name));
        attributes.insert("cluster_id".to_string(), Value::String(cluster.id));
        // vm_size is not reflected: the API can transform the value it returns
        attributes.insert(
            "marketplace_identifier".to_string(),
            Value::String(props.marketplace_identifier.clone()),
        );
        attributes.insert(
            "https_endpoint".to_string(),
            flatten_https_endpoints(&props.https_endpoints),
        );
        attributes.insert(
            "install_script_action".to_string(),
            flatten_script_actions(&props.install_script_actions),
        );
        attributes.insert(
            "uninstall_script_action".to_string(),
            flatten_script_actions(&props.uninstall_script_actions),
        );

        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    pub(crate) async fn delete_hdinsight_application(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let parsed = parse_azure_resource_id(identifier)
            .map_err(|e| ProviderError::new("invalid application ID").with_cause(e).for_resource(id.clone()))?;
        let resource_group = parsed.resource_group.clone();
        let cluster_name = parsed
            .segment("clusters")
            .ok_or_else(|| missing_segment(id, identifier, "clusters"))?
            .to_string();
        let name = parsed
            .segment("applications")
            .ok_or_else(|| missing_segment(id, identifier, "applications"))?
            .to_string();

        // only one change can be made to an HDInsight Cluster at any one time
        let _lock = self.locks.lock_scoped(LOCK_SCOPE, &cluster_name).await;

        match self
            .hdinsight
            .delete_application(&resource_group, &cluster_name, &name)
            .await
        {
            Ok(()) | Err(ApiError::NotFound) => {}
            Err(e) => {
                return Err(ProviderError::new(format!(
                    "deleting HDInsight Application {name:?} (Cluster {cluster_name:?} / Resource Group {resource_group:?})"
                ))
                .with_cause(e)
                .for_resource(id.clone()));
            }
        }

        // same as create: the uninstall is acknowledged immediately, the
        // cluster settles back into `Running` afterwards
        self.wait_for_hdinsight_cluster(&resource_group, &cluster_name)
            .await
            .map_err(|e| e.for_resource(id.clone()))
    }

    /// Wait for an HDInsight cluster to re-enter the `Running` state
    async fn wait_for_hdinsight_cluster(
        &self,
        resource_group: &str,
        cluster_name: &str,
    ) -> ProviderResult<()> {
        log::debug!(
            "waiting for HDInsight Cluster {:?} (Resource Group {:?}) to be `Running`",
            cluster_name,
            resource_group
        );

        let waiter = StateWaiter::new("running")
            .pending(["accepted", "azurevmconfiguration", "hdinsightconfiguration"])
            .failure(["failed"])
            .timeout(self.cluster_timeout)
            .poll_interval(Duration::from_secs(20))
            .stability_count(3)
            // a 404 for a cluster we know exists is a defect, not a pending
            // state; mapping it keeps the label in the error message
            .on_not_found("not_found");

        let api = self.hdinsight.clone();
        let rg = resource_group.to_string();
        let cluster = cluster_name.to_string();
        let probe = move || {
            let api = api.clone();
            let rg = rg.clone();
            let cluster = cluster.clone();
            async move {
                match api.get_cluster(&rg, &cluster).await {
                    Ok(cluster) => Ok(cluster.properties.cluster_state.unwrap_or_default()),
                    Err(ApiError::NotFound) => Err(ProbeError::NotFound),
                    Err(e) => Err(ProbeError::remote(e)),
                }
            }
        };

        waiter.wait(probe, &self.cancel).await.map_err(|e| {
            ProviderError::new(format!(
                "waiting for HDInsight Cluster {cluster_name:?} (Resource Group {resource_group:?}) to re-enter the `Running` state"
            ))
            .with_cause(e)
        })?;

        Ok(())
    }
}

fn required_str<'a>(resource: &'a Resource, key: &str) -> ProviderResult<&'a str> {
    resource.get_str(key).ok_or_else(|| {
        ProviderError::new(format!("`{key}` is required")).for_resource(resource.id.clone())
    })
}

fn missing_segment(id: &ResourceId, identifier: &str, segment: &str) -> ProviderError {
    ProviderError::new(format!(
        "application ID {identifier:?} is missing the {segment:?} segment"
    ))
    .for_resource(id.clone())
}

fn expand_script_actions(value: Option<&Value>) -> Vec<ScriptAction> {
    let mut actions = Vec::new();
    let Some(items) = value.and_then(Value::as_list) else {
        return actions;
    };

    for item in items {
        let Some(map) = item.as_map() else { continue };
        actions.push(ScriptAction {
            name: map
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            uri: map
                .get("uri")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            roles: map
                .get("roles")
                .map(Value::as_string_list)
                .unwrap_or_default(),
        });
    }

    actions
}

fn flatten_script_actions(actions: &[ScriptAction]) -> Value {
    Value::List(
        actions
            .iter()
            .map(|action| {
                let mut output = HashMap::new();
                output.insert("name".to_string(), Value::String(action.name.clone()));
                output.insert("uri".to_string(), Value::String(action.uri.clone()));
                output.insert(
                    "roles".to_string(),
                    Value::List(
                        action
                            .roles
                            .iter()
                            .map(|r| Value::String(r.clone()))
                            .collect(),
                    ),
                );
                Value::Map(output)
            })
            .collect(),
    )
}

fn expand_https_endpoints(value: Option<&Value>) -> Vec<HttpsEndpoint> {
    let mut endpoints = Vec::new();
    let Some(items) = value.and_then(Value::as_list) else {
        return endpoints;
    };

    for item in items {
        let Some(map) = item.as_map() else { continue };
        let destination_port = map
            .get("destination_port")
            .and_then(Value::as_int)
            .unwrap_or_default() as i32;
        // zero means "let the service assign one"
        let public_port = map
            .get("public_port")
            .and_then(Value::as_int)
            .filter(|port| *port > 0)
            .map(|port| port as i32);

        endpoints.push(HttpsEndpoint {
            destination_port,
            public_port,
            access_modes: map
                .get("access_modes")
                .map(Value::as_string_list)
                .unwrap_or_default(),
        });
    }

    endpoints
}

fn flatten_https_endpoints(endpoints: &[HttpsEndpoint]) -> Value {
    Value::List(
        endpoints
            .iter()
            .map(|endpoint| {
                let mut output = HashMap::new();
                output.insert(
                    "destination_port".to_string(),
                    Value::Int(endpoint.destination_port as i64),
                );
                output.insert(
                    "public_port".to_string(),
                    Value::Int(endpoint.public_port.unwrap_or_default() as i64),
                );
                output.insert(
                    "access_modes".to_string(),
                    Value::List(
                        endpoint
                            .access_modes
                            .iter()
                            .map(|m| Value::String(m.clone()))
                            .collect(),
                    ),
                );
                Value::Map(output)
            })
            .collect(),
    )
}
