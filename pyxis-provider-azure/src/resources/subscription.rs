//! Subscription resource
//!
//! Provisions a subscription under an Enterprise Agreement enrollment
//! account. Subscriptions cannot be deleted through the management API, so
//! delete only stops managing the resource.

use std::collections::HashMap;

use pyxis_core::provider::{ProviderError, ProviderResult};
use pyxis_core::resource::{Resource, ResourceId, State, Value};
use pyxis_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use crate::api::{ApiError, SubscriptionCreation};
use crate::provider::AzureProvider;

pub const RESOURCE_TYPE: &str = "subscription";

fn validate_display_name(value: &Value) -> Result<(), String> {
    match value {
        Value::String(s) if (1..=24).contains(&s.len()) => Ok(()),
        Value::String(s) => Err(format!(
            "name must be between 1 and 24 characters, got {}",
            s.len()
        )),
        _ => Err("expected a string".to_string()),
    }
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .attribute(
            "name",
            AttributeSchema::optional(AttributeType::Custom {
                name: "DisplayName".to_string(),
                validate: validate_display_name,
            })
            .force_new(),
        )
        .attribute(
            "enrollment_account",
            AttributeSchema::required(AttributeType::String).force_new(),
        )
        .attribute(
            "offer_type",
            AttributeSchema::required(AttributeType::String).force_new(),
        )
        .attribute(
            "owners",
            AttributeSchema::optional(AttributeType::List(Box::new(AttributeType::String)))
                .force_new(),
        )
        .attribute(
            "additional_parameters",
            AttributeSchema::optional(AttributeType::Map(Box::new(AttributeType::String)))
                .force_new(),
        )
}

impl AzureProvider {
    pub(crate) async fn create_subscription(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        log::info!("preparing arguments for Subscription creation");

        let enrollment_account = resource.get_str("enrollment_account").ok_or_else(|| {
            ProviderError::new("`enrollment_account` is required").for_resource(id.clone())
        })?;
        let offer_type = resource
            .get_str("offer_type")
            .ok_or_else(|| ProviderError::new("`offer_type` is required").for_resource(id.clone()))?;

        let parameters = SubscriptionCreation {
            display_name: resource.get_str("name").map(|v| v.to_string()),
            offer_type: offer_type.to_string(),
            owners: resource
                .attributes
                .get("owners")
                .map(Value::as_string_list)
                .unwrap_or_default(),
            additional_parameters: expand_parameters(
                resource.attributes.get("additional_parameters"),
            ),
        };

        let subscription_id = self
            .subscriptions
            .create_in_enrollment_account(enrollment_account, &parameters)
            .await
            .map_err(|e| {
                ProviderError::new(format!(
                    "creating Subscription under enrollment account {enrollment_account:?}"
                ))
                .with_cause(e)
                .for_resource(id.clone())
            })?;

        let read = self.subscriptions.get(&subscription_id).await.map_err(|e| {
            ProviderError::new(format!(
                "waiting for Subscription {subscription_id:?} to finish creating"
            ))
            .with_cause(e)
            .for_resource(id.clone())
        })?;

        if read.subscription_id.is_empty() {
            return Err(
                ProviderError::new(format!("cannot read Subscription {subscription_id:?}"))
                    .for_resource(id),
            );
        }

        self.read_subscription(&id, &read.subscription_id).await
    }

    pub(crate) async fn read_subscription(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let subscription = match self.subscriptions.get(identifier).await {
            Ok(subscription) => subscription,
            Err(ApiError::NotFound) => {
                log::debug!("Subscription {:?} was not found - removing from state", identifier);
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => {
                return Err(ProviderError::new("reading subscription")
                    .with_cause(e)
                    .for_resource(id.clone()));
            }
        };

        let mut attributes = HashMap::new();
        attributes.insert(
            "subscription_id".to_string(),
            Value::String(subscription.subscription_id),
        );
        if let Some(display_name) = subscription.display_name {
            attributes.insert("display_name".to_string(), Value::String(display_name));
        }
        if let Some(state) = subscription.state {
            attributes.insert("state".to_string(), Value::String(state));
        }
        if let Some(policies) = subscription.subscription_policies {
            if let Some(v) = policies.location_placement_id {
                attributes.insert("location_placement_id".to_string(), Value::String(v));
            }
            if let Some(v) = policies.quota_id {
                attributes.insert("quota_id".to_string(), Value::String(v));
            }
            if let Some(v) = policies.spending_limit {
                attributes.insert("spending_limit".to_string(), Value::String(v));
            }
        }

        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    pub(crate) async fn delete_subscription(&self, id: &ResourceId) -> ProviderResult<()> {
        // subscriptions cannot be deleted through the management API;
        // dropping one from configuration simply stops managing it
        log::debug!("subscription {} cannot be deleted; removing from state only", id);
        Ok(())
    }
}

fn expand_parameters(value: Option<&Value>) -> HashMap<String, String> {
    let mut parameters = HashMap::new();
    if let Some(Value::Map(map)) = value {
        for (key, parameter) in map {
            if let Value::String(parameter) = parameter {
                parameters.insert(key.clone(), parameter.clone());
            }
        }
    }
    parameters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_length_is_validated() {
        assert!(validate_display_name(&Value::String("production".into())).is_ok());
        assert!(validate_display_name(&Value::String("".into())).is_err());
        assert!(validate_display_name(&Value::String("x".repeat(25))).is_err());
    }

    #[test]
    fn schema_requires_enrollment_account_and_offer_type() {
        let attributes = HashMap::from([(
            "enrollment_account".to_string(),
            Value::String("dev".into()),
        )]);
        let err = schema().validate(&attributes).unwrap_err();
        assert!(err.to_string().contains("offer_type"));
    }

    #[test]
    fn additional_parameters_expand_to_string_map() {
        let value = Value::Map(HashMap::from([(
            "costCenter".to_string(),
            Value::String("1234".into()),
        )]));
        let parameters = expand_parameters(Some(&value));
        assert_eq!(parameters.get("costCenter").map(String::as_str), Some("1234"));
    }
}
