//! SQL database resource
//!
//! Create and update share one handler: the management API exposes a single
//! CreateOrUpdate operation whose `createMode` selects between a fresh
//! database, a copy, a restore and the other modes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use pyxis_core::provider::{ProviderError, ProviderResult};
use pyxis_core::resource::{Resource, ResourceId, State, Value};
use pyxis_core::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema};

use crate::api::{ApiError, Database, DatabaseProperties, DatabaseSku};
use crate::azure::{normalize_location, parse_azure_resource_id, validate_database_name_value};
use crate::provider::AzureProvider;

pub const RESOURCE_TYPE: &str = "mssql_database";

const CREATE_MODES: [&str; 10] = [
    "Copy",
    "Default",
    "OnlineSecondary",
    "PointInTimeRestore",
    "Recovery",
    "Restore",
    "RestoreExternalBackup",
    "RestoreExternalBackupSecondary",
    "RestoreLongTermRetentionBackup",
    "Secondary",
];

const SKU_NAMES: [&str; 7] = [
    "BasicPool",
    "StandardPool",
    "PremiumPool",
    "GP_Gen4",
    "GP_Gen5",
    "BC_Gen4",
    "BC_Gen5",
];

const SKU_TIERS: [&str; 5] = [
    "Basic",
    "Standard",
    "Premium",
    "GeneralPurpose",
    "BusinessCritical",
];

const SKU_FAMILIES: [&str; 2] = ["Gen4", "Gen5"];

fn string_enum(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

pub fn schema() -> ResourceSchema {
    let sku = AttributeType::List(Box::new(AttributeType::Block(
        BlockSchema::new()
            .attribute("name", AttributeSchema::required(string_enum(&SKU_NAMES)))
            .attribute("tier", AttributeSchema::required(string_enum(&SKU_TIERS)))
            .attribute("capacity", AttributeSchema::required(AttributeType::Int))
            .attribute(
                "family",
                AttributeSchema::optional(string_enum(&SKU_FAMILIES)),
            ),
    )));

    ResourceSchema::new(RESOURCE_TYPE)
        .attribute(
            "name",
            AttributeSchema::required(AttributeType::Custom {
                name: "DatabaseName".to_string(),
                validate: validate_database_name_value,
            })
            .force_new(),
        )
        .attribute("location", AttributeSchema::required(AttributeType::String))
        .attribute(
            "resource_group_name",
            AttributeSchema::required(AttributeType::String).force_new(),
        )
        .attribute(
            "server_name",
            AttributeSchema::required(AttributeType::String).force_new(),
        )
        .attribute(
            "create_mode",
            AttributeSchema::optional(string_enum(&CREATE_MODES)),
        )
        .attribute("edition", AttributeSchema::optional(AttributeType::String))
        .attribute("collation", AttributeSchema::optional(AttributeType::String))
        .attribute(
            "max_size_bytes",
            AttributeSchema::optional(AttributeType::String),
        )
        .attribute(
            "source_database_id",
            AttributeSchema::optional(AttributeType::String),
        )
        .attribute(
            "source_database_deletion_date",
            AttributeSchema::optional(AttributeType::String),
        )
        .attribute(
            "requested_service_objective_id",
            AttributeSchema::optional(AttributeType::String),
        )
        .attribute(
            "requested_service_objective_name",
            AttributeSchema::optional(AttributeType::String),
        )
        .attribute(
            "elastic_pool_name",
            AttributeSchema::optional(AttributeType::String),
        )
        .attribute(
            "restore_point_in_time",
            AttributeSchema::optional(AttributeType::String),
        )
        .attribute(
            "tags",
            AttributeSchema::optional(AttributeType::Map(Box::new(AttributeType::String))),
        )
        .attribute("sku", AttributeSchema::optional(sku))
}

impl AzureProvider {
    /// Shared by create and update; `prior` is the last known remote state
    /// when updating
    pub(crate) async fn create_or_update_mssql_database(
        &self,
        resource: &Resource,
        prior: Option<&State>,
    ) -> ProviderResult<State> {
        let id = resource.id.clone();

        let name = required_str(resource, "name")?.to_string();
        let server_name = required_str(resource, "server_name")?.to_string();
        let resource_group = required_str(resource, "resource_group_name")?.to_string();
        let location = normalize_location(required_str(resource, "location")?);
        let create_mode = resource.get_str("create_mode").unwrap_or("Default");

        if self.require_import && prior.is_none() {
            match self.sql.get_database(&resource_group, &server_name, &name).await {
                Ok(existing) => {
                    return Err(ProviderError::new(format!(
                        "a SQL Database with ID {:?} already exists - import it to manage it",
                        existing.id.unwrap_or_default()
                    ))
                    .for_resource(id));
                }
                Err(ApiError::NotFound) => {}
                Err(e) => {
                    return Err(ProviderError::new(format!(
                        "checking for presence of existing SQL Database {name:?} (Resource Group {resource_group:?}, Server {server_name:?})"
                    ))
                    .with_cause(e)
                    .for_resource(id));
                }
            }
        }

        let mut properties = DatabaseProperties {
            create_mode: Some(create_mode.to_string()),
            ..Default::default()
        };

        if let Some(v) = resource.get_str("source_database_id") {
            properties.source_database_id = Some(v.to_string());
        }
        if let Some(v) = resource.get_str("edition") {
            properties.edition = Some(v.to_string());
        }
        if let Some(v) = resource.get_str("collation") {
            properties.collation = Some(v.to_string());
        }
        if let Some(v) = resource.get_str("max_size_bytes") {
            properties.max_size_bytes = Some(v.to_string());
        }
        if let Some(v) = resource.get_str("source_database_deletion_date") {
            properties.source_database_deletion_date =
                Some(parse_rfc3339(&id, "source_database_deletion_date", v)?);
        }
        if let Some(v) = resource.get_str("requested_service_objective_id") {
            let parsed = Uuid::parse_str(v).map_err(|e| {
                ProviderError::new(format!(
                    "`requested_service_objective_id` wasn't a valid UUID {v:?}"
                ))
                .with_cause(e)
                .for_resource(id.clone())
            })?;
            properties.requested_service_objective_id = Some(parsed);
        }
        if let Some(v) = resource.get_str("requested_service_objective_name") {
            properties.requested_service_objective_name = Some(v.to_string());
        }
        if let Some(v) = resource.get_str("elastic_pool_name") {
            properties.elastic_pool_name = Some(v.to_string());
        }
        if let Some(v) = resource.get_str("restore_point_in_time") {
            properties.restore_point_in_time = Some(parse_rfc3339(&id, "restore_point_in_time", v)?);
        }

        // when only the service objective name changed, the stale id would
        // contradict it and the API rejects the request
        if let Some(prior) = prior {
            let name_changed = prior.get_str("requested_service_objective_name")
                != resource.get_str("requested_service_objective_name");
            let id_changed = prior.get_str("requested_service_objective_id")
                != resource.get_str("requested_service_objective_id");
            if name_changed && !id_changed {
                properties.requested_service_objective_id = None;
            }
        }

        let database = Database {
            id: None,
            location,
            tags: expand_tags(resource.attributes.get("tags")),
            sku: expand_sku(resource.attributes.get("sku")),
            properties,
        };

        self.sql
            .create_or_update_database(&resource_group, &server_name, &name, &database)
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "issuing create/update request for SQL Database {name:?} (Resource Group {resource_group:?}, Server {server_name:?})"
                ))
                .with_cause(e)
                .for_resource(id.clone())
            })?;

        let response = self
            .sql
            .get_database(&resource_group, &server_name, &name)
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "retrieving SQL Database {name:?} (Resource Group {resource_group:?}, Server {server_name:?})"
                ))
                .with_cause(e)
                .for_resource(id.clone())
            })?;

        let identifier = response.id.filter(|v| !v.is_empty()).ok_or_else(|| {
            ProviderError::new(format!(
                "cannot read ID for SQL Database {name:?} (Resource Group {resource_group:?}, Server {server_name:?})"
            ))
            .for_resource(id.clone())
        })?;

        self.read_mssql_database(&id, &identifier).await
    }

    pub(crate) async fn read_mssql_database(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let parsed = parse_azure_resource_id(identifier)
            .map_err(|e| ProviderError::new("invalid database ID").with_cause(e).for_resource(id.clone()))?;
        let resource_group = parsed.resource_group.clone();
        let server_name = parsed
            .segment("servers")
            .ok_or_else(|| missing_segment(id, identifier, "servers"))?
            .to_string();
        let name = parsed
            .segment("databases")
            .ok_or_else(|| missing_segment(id, identifier, "databases"))?
            .to_string();

        let database = match self.sql.get_database(&resource_group, &server_name, &name).await {
            Ok(database) => database,
            Err(ApiError::NotFound) => {
                log::info!(
                    "SQL Database {:?} was not found - removing from state",
                    identifier
                );
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => {
                return Err(ProviderError::new(format!(
                    "making read request on SQL Database {name:?}"
                ))
                .with_cause(e)
                .for_resource(id.clone()));
            }
        };

        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), Value::String(name));
        attributes.insert(
            "resource_group_name".to_string(),
            Value::String(resource_group),
        );
        attributes.insert("server_name".to_string(), Value::String(server_name));
        attributes.insert(
            "location".to_string(),
            Value::String(normalize_location(&database.location)),
        );

        // the API does not echo create_mode or the source database back;
        // the configured values are left alone
        let props = &database.properties;
        insert_opt_string(&mut attributes, "collation", props.collation.as_deref());
        insert_opt_string(
            &mut attributes,
            "default_secondary_location",
            props.default_secondary_location.as_deref(),
        );
        insert_opt_string(&mut attributes, "edition", props.edition.as_deref());
        insert_opt_string(
            &mut attributes,
            "elastic_pool_name",
            props.elastic_pool_name.as_deref(),
        );
        insert_opt_string(
            &mut attributes,
            "max_size_bytes",
            props.max_size_bytes.as_deref(),
        );
        insert_opt_string(
            &mut attributes,
            "requested_service_objective_name",
            props.requested_service_objective_name.as_deref(),
        );
        if let Some(objective_id) = props.requested_service_objective_id {
            attributes.insert(
                "requested_service_objective_id".to_string(),
                Value::String(objective_id.to_string()),
            );
        }
        insert_opt_datetime(&mut attributes, "creation_date", props.creation_date);
        insert_opt_datetime(
            &mut attributes,
            "restore_point_in_time",
            props.restore_point_in_time,
        );
        insert_opt_datetime(
            &mut attributes,
            "source_database_deletion_date",
            props.source_database_deletion_date,
        );

        if !database.tags.is_empty() {
            attributes.insert("tags".to_string(), flatten_tags(&database.tags));
        }
        if let Some(sku) = &database.sku {
            attributes.insert("sku".to_string(), flatten_sku(sku));
        }

        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    pub(crate) async fn delete_mssql_database(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let parsed = parse_azure_resource_id(identifier)
            .map_err(|e| ProviderError::new("invalid database ID").with_cause(e).for_resource(id.clone()))?;
        let resource_group = parsed.resource_group.clone();
        let server_name = parsed
            .segment("servers")
            .ok_or_else(|| missing_segment(id, identifier, "servers"))?
            .to_string();
        let name = parsed
            .segment("databases")
            .ok_or_else(|| missing_segment(id, identifier, "databases"))?
            .to_string();

        match self.sql.delete_database(&resource_group, &server_name, &name).await {
            Ok(()) | Err(ApiError::NotFound) => Ok(()),
            Err(e) => Err(ProviderError::new(format!("deleting SQL Database {name:?}"))
                .with_cause(e)
                .for_resource(id.clone())),
        }
    }
}

fn required_str<'a>(resource: &'a Resource, key: &str) -> ProviderResult<&'a str> {
    resource.get_str(key).ok_or_else(|| {
        ProviderError::new(format!("`{key}` is required")).for_resource(resource.id.clone())
    })
}

fn missing_segment(id: &ResourceId, identifier: &str, segment: &str) -> ProviderError {
    ProviderError::new(format!(
        "database ID {identifier:?} is missing the {segment:?} segment"
    ))
    .for_resource(id.clone())
}

fn parse_rfc3339(id: &ResourceId, field: &str, value: &str) -> ProviderResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            ProviderError::new(format!("`{field}` wasn't a valid RFC3339 date {value:?}"))
                .with_cause(e)
                .for_resource(id.clone())
        })
}

fn insert_opt_string(attributes: &mut HashMap<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        attributes.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn insert_opt_datetime(
    attributes: &mut HashMap<String, Value>,
    key: &str,
    value: Option<DateTime<Utc>>,
) {
    if let Some(value) = value {
        attributes.insert(key.to_string(), Value::String(value.to_rfc3339()));
    }
}

fn expand_tags(value: Option<&Value>) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    if let Some(Value::Map(map)) = value {
        for (key, tag) in map {
            if let Value::String(tag) = tag {
                tags.insert(key.clone(), tag.clone());
            }
        }
    }
    tags
}

fn flatten_tags(tags: &HashMap<String, String>) -> Value {
    Value::Map(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// First entry of the `sku` block, if configured
fn expand_sku(value: Option<&Value>) -> Option<DatabaseSku> {
    let map = value.and_then(Value::as_list)?.first()?.as_map()?;
    Some(DatabaseSku {
        name: map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        tier: map
            .get("tier")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        capacity: map.get("capacity").and_then(Value::as_int).unwrap_or_default(),
        family: map
            .get("family")
            .and_then(Value::as_str)
            .map(|f| f.to_string()),
    })
}

fn flatten_sku(sku: &DatabaseSku) -> Value {
    let mut map = HashMap::new();
    map.insert("name".to_string(), Value::String(sku.name.clone()));
    map.insert("tier".to_string(), Value::String(sku.tier.clone()));
    map.insert("capacity".to_string(), Value::Int(sku.capacity));
    if let Some(family) = &sku.family {
        map.insert("family".to_string(), Value::String(family.clone()));
    }
    Value::List(vec![Value::Map(map)])
}
