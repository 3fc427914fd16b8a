//! Helpers for Azure Resource Manager conventions
//!
//! Resource IDs, location normalization and name validation shared by the
//! resource handlers.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use pyxis_core::resource::Value;

/// Error parsing an ARM resource ID
#[derive(Debug, Clone, Error)]
pub enum IdParseError {
    #[error("cannot parse an empty resource ID")]
    Empty,

    #[error("resource ID {id:?} has an odd number of path segments")]
    UnevenSegments { id: String },

    #[error("resource ID {id:?} is missing the {element:?} element")]
    MissingElement { id: String, element: String },
}

/// Components of an ARM resource ID
///
/// `/subscriptions/{guid}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}/...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider: Option<String>,
    /// Remaining key/value segments, e.g. "clusters" -> "cluster1"
    pub path: HashMap<String, String>,
}

impl AzureResourceId {
    /// A path segment by its key, e.g. `segment("clusters")`
    pub fn segment(&self, key: &str) -> Option<&str> {
        self.path.get(key).map(String::as_str)
    }
}

/// Parse an ARM resource ID into its components
pub fn parse_azure_resource_id(id: &str) -> Result<AzureResourceId, IdParseError> {
    let trimmed = id.trim_matches('/');
    if trimmed.is_empty() {
        return Err(IdParseError::Empty);
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.len() % 2 != 0 {
        return Err(IdParseError::UnevenSegments { id: id.to_string() });
    }

    let mut subscription_id = None;
    let mut resource_group = None;
    let mut provider = None;
    let mut path = HashMap::new();

    for pair in segments.chunks(2) {
        let (key, value) = (pair[0], pair[1]);
        match key {
            "subscriptions" => subscription_id = Some(value.to_string()),
            // the API is case-inconsistent about this segment
            "resourceGroups" | "resourcegroups" => resource_group = Some(value.to_string()),
            "providers" => provider = Some(value.to_string()),
            _ => {
                path.insert(key.to_string(), value.to_string());
            }
        }
    }

    let missing = |element: &str| IdParseError::MissingElement {
        id: id.to_string(),
        element: element.to_string(),
    };

    Ok(AzureResourceId {
        subscription_id: subscription_id.ok_or_else(|| missing("subscriptions"))?,
        resource_group: resource_group.ok_or_else(|| missing("resourceGroups"))?,
        provider,
        path,
    })
}

/// Normalize an Azure location for comparison ("West Europe" -> "westeurope")
pub fn normalize_location(location: &str) -> String {
    location.to_lowercase().replace(' ', "")
}

static DATABASE_NAME_FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[<>*%&:\\/?]").expect("static pattern"));

/// Validate an Azure SQL database name
///
/// Names may not contain `<>*%&:\/?`, may not end in a period or a space
/// and must be 1-128 characters long.
pub fn validate_mssql_database_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 128 {
        return Err(format!(
            "database name must be between 1 and 128 characters, got {}",
            name.len()
        ));
    }
    if name.ends_with('.') || name.ends_with(' ') {
        return Err("database name cannot end with a period or a space".to_string());
    }
    if DATABASE_NAME_FORBIDDEN.is_match(name) {
        return Err(r"database name cannot contain any of <>*%&:\/?".to_string());
    }
    Ok(())
}

/// Schema validator for attributes that must hold an ARM resource ID
pub fn validate_resource_id_value(value: &Value) -> Result<(), String> {
    match value {
        Value::String(s) => parse_azure_resource_id(s).map(|_| ()).map_err(|e| e.to_string()),
        _ => Err("expected a resource ID string".to_string()),
    }
}

/// Schema validator for database name attributes
pub fn validate_database_name_value(value: &Value) -> Result<(), String> {
    match value {
        Value::String(s) => validate_mssql_database_name(s),
        _ => Err("expected a string".to_string()),
    }
}
