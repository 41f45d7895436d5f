//! Network security perimeter profile resource

use super::{plan_with_schema, PlannedChange, Resource, ResourceState};
use crate::client::{Clients, DeleteOptions, NspProfile};
use crate::error::{ResourceError, ResourceResult};
use crate::ids::{IdParseError, PerimeterId, ProfileId};
use crate::location;
use crate::schema::{AttributeType, ResourceSchema, SchemaAttribute, SchemaBlock};
use crate::validation::{self, FieldValidator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const RESOURCE_TYPE: &str = "azurerm_network_security_perimeter_profile";

const VALIDATORS: &[FieldValidator] = &[
    FieldValidator::new("name", validation::string_is_not_empty),
    FieldValidator::new("resource_group_name", validation::resource_group_name),
    FieldValidator::new("perimeter_id", validation::perimeter_id),
    FieldValidator::new("location", validation::string_is_not_empty),
    FieldValidator::new("tags", validation::tags),
];

/// Configuration and state of a profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub resource_group_name: String,
    pub perimeter_id: String,
    pub location: String,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
}

impl ProfileModel {
    /// Request body for create-or-update: always the full location and tags
    fn to_payload(&self) -> NspProfile {
        NspProfile {
            location: Some(location::normalize(&self.location)),
            tags: Some(self.tags.clone().unwrap_or_default()),
            ..Default::default()
        }
    }
}

pub struct ProfileResource;

impl ProfileResource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProfileResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for ProfileResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description("Resource ID of the profile")
                    .computed(),
            )
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the profile")
                    .required()
                    .force_new(),
            )
            .with_attribute(
                "resource_group_name",
                SchemaAttribute::string()
                    .with_description("Resource group of the parent perimeter")
                    .required()
                    .force_new(),
            )
            .with_attribute(
                "perimeter_id",
                SchemaAttribute::string()
                    .with_description("Resource ID of the parent network security perimeter")
                    .required()
                    .force_new(),
            )
            .with_attribute(
                "location",
                SchemaAttribute::string()
                    .with_description("Azure region of the profile")
                    .required(),
            )
            .with_attribute(
                "tags",
                SchemaAttribute::map(AttributeType::String)
                    .with_description("Tags assigned to the profile")
                    .optional(),
            )
            .with_description("Manages a Network Security Perimeter Profile");

        ResourceSchema::new(0, block)
    }

    fn validators(&self) -> &'static [FieldValidator] {
        VALIDATORS
    }

    fn validate_id(&self, id: &str) -> Result<(), IdParseError> {
        ProfileId::parse(id).map(|_| ())
    }

    async fn create(
        &self,
        clients: &Clients,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let config: ProfileModel = planned.decode()?;

        let perimeter = PerimeterId::parse(&config.perimeter_id)?;
        if perimeter.subscription_id != clients.subscription_id
            || perimeter.resource_group_name != config.resource_group_name
        {
            return Err(ResourceError::Decode(format!(
                "perimeter_id {} must be in subscription {:?} and resource group {:?}",
                perimeter, clients.subscription_id, config.resource_group_name
            )));
        }

        let id = ProfileId::new(
            &clients.subscription_id,
            &config.resource_group_name,
            &perimeter.perimeter_name,
            &config.name,
        );

        match clients.profiles.get_profile(&id).await {
            Ok(_) => {
                return Err(ResourceError::AlreadyExists {
                    resource_type: RESOURCE_TYPE,
                    id: id.to_string(),
                })
            }
            Err(e) if e.was_not_found() => {}
            Err(e) => {
                return Err(ResourceError::upstream(
                    "checking for presence of existing",
                    &id,
                    e,
                ))
            }
        }

        tracing::info!(%id, "creating network security perimeter profile");
        clients
            .profiles
            .create_or_update_profile(&id, &config.to_payload())
            .await
            .map_err(|e| ResourceError::upstream("creating", &id, e))?;

        let mut state = planned.clone();
        state.set_id(&id);
        Ok(state)
    }

    async fn read(
        &self,
        clients: &Clients,
        current: &ResourceState,
    ) -> ResourceResult<Option<ResourceState>> {
        let id = ProfileId::parse(&current.id()?)?;

        let response = match clients.profiles.get_profile(&id).await {
            Ok(response) => response,
            Err(e) if e.was_not_found() => {
                tracing::info!(%id, "profile no longer exists, removing from state");
                return Ok(None);
            }
            Err(e) => return Err(ResourceError::upstream("retrieving", &id, e)),
        };

        let mut state = ProfileModel {
            id: Some(id.to_string()),
            name: id.profile_name.clone(),
            resource_group_name: id.resource_group_name.clone(),
            perimeter_id: id.perimeter_id().to_string(),
            ..Default::default()
        };
        if let Some(model) = response.model {
            state.location = location::normalize(model.location.as_deref().unwrap_or_default());
            state.tags = Some(model.tags.unwrap_or_default());
        }

        ResourceState::encode(&state).map(Some)
    }

    async fn update(
        &self,
        clients: &Clients,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let id = ProfileId::parse(&current.id()?)?;
        let config: ProfileModel = planned.decode()?;

        tracing::info!(%id, "updating network security perimeter profile");
        clients
            .profiles
            .create_or_update_profile(&id, &config.to_payload())
            .await
            .map_err(|e| ResourceError::upstream("updating", &id, e))?;

        let mut state = planned.clone();
        state.set_id(&id);
        Ok(state)
    }

    async fn delete(&self, clients: &Clients, current: &ResourceState) -> ResourceResult<()> {
        let id = ProfileId::parse(&current.id()?)?;

        tracing::info!(%id, "deleting network security perimeter profile");
        clients
            .profiles
            .delete_profile_then_poll(&id, DeleteOptions::default())
            .await
            .map_err(|e| ResourceError::upstream("deleting", &id, e))
    }

    /// Plans carry the normalized location so refreshes do not show a diff
    fn plan_change(
        &self,
        prior: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> PlannedChange {
        let mut change = plan_with_schema(&self.schema(), prior, proposed);
        if let Some(location) = proposed.get_string("location") {
            change
                .planned_state
                .set("location", Value::String(location::normalize(&location)));
        }
        change
    }
}
