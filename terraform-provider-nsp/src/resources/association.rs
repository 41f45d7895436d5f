//! Network security perimeter resource association resource
//!
//! An association links a profile to a private-link resource. Its name is
//! `<last segment of resource_id>-<uuid>`, generated once at create time; every
//! later operation works from the id persisted in state.

use super::{Resource, ResourceState};
use crate::client::{Clients, NspAssociation, NspAssociationProperties, SubResource};
use crate::error::{ResourceError, ResourceResult};
use crate::ids::{self, IdParseError, ProfileId, ResourceAssociationId};
use crate::schema::{ResourceSchema, SchemaAttribute, SchemaBlock};
use crate::validation::{self, FieldValidator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const RESOURCE_TYPE: &str = "azurerm_network_security_perimeter_resource_association";

const VALIDATORS: &[FieldValidator] = &[
    FieldValidator::new("resource_id", validation::string_is_not_empty),
    FieldValidator::new("profile_id", validation::profile_id),
    FieldValidator::new("access_mode", validation::access_mode),
];

/// Turns the target resource's name into a fresh association name
pub type NameGenerator = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// `<base>-<random v4 uuid>`
pub fn random_name(base: &str) -> String {
    format!("{}-{}", base, Uuid::new_v4())
}

/// Configuration and state of an association
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssociationModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub profile_id: String,
    pub resource_id: String,
    pub access_mode: String,
}

/// Which configured fields differ from the prior state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub profile_id: bool,
    pub resource_id: bool,
    pub access_mode: bool,
}

impl ChangeSet {
    pub fn between(prior: &AssociationModel, planned: &AssociationModel) -> Self {
        Self {
            profile_id: prior.profile_id != planned.profile_id,
            resource_id: prior.resource_id != planned.resource_id,
            access_mode: prior.access_mode != planned.access_mode,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.profile_id || self.resource_id || self.access_mode)
    }
}

/// Next full set of properties for an update
///
/// Changed fields take the configured value, unchanged ones keep what the
/// service returned. Read-only fields are dropped from the request.
pub fn merge_properties(
    existing: NspAssociationProperties,
    config: &AssociationModel,
    changes: ChangeSet,
) -> NspAssociationProperties {
    let mut next = NspAssociationProperties {
        provisioning_state: None,
        has_provisioning_issues: None,
        ..existing
    };

    if changes.profile_id {
        next.profile = Some(SubResource::new(&config.profile_id));
    }
    if changes.resource_id {
        next.private_link_resource = Some(SubResource::new(&config.resource_id));
    }
    if changes.access_mode {
        next.access_mode = Some(config.access_mode.clone());
    }

    next
}

pub struct AssociationResource {
    name_generator: NameGenerator,
}

impl AssociationResource {
    pub fn new() -> Self {
        Self {
            name_generator: Arc::new(random_name),
        }
    }

    /// Replace the random name generator, e.g. with a deterministic one
    pub fn with_name_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.name_generator = Arc::new(generator);
        self
    }
}

impl Default for AssociationResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for AssociationResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description("Resource ID of the association")
                    .computed(),
            )
            .with_attribute(
                "resource_id",
                SchemaAttribute::string()
                    .with_description("Resource ID of the private-link resource to associate")
                    .required()
                    .force_new(),
            )
            .with_attribute(
                "profile_id",
                SchemaAttribute::string()
                    .with_description("Resource ID of the network security perimeter profile")
                    .required(),
            )
            .with_attribute(
                "access_mode",
                SchemaAttribute::string()
                    .with_description("Access mode of the association: Audit, Enforced or Learning")
                    .required(),
            )
            .with_description("Manages a Network Security Perimeter Resource Association");

        ResourceSchema::new(0, block)
    }

    fn validators(&self) -> &'static [FieldValidator] {
        VALIDATORS
    }

    fn validate_id(&self, id: &str) -> Result<(), IdParseError> {
        ResourceAssociationId::parse(id).map(|_| ())
    }

    async fn create(
        &self,
        clients: &Clients,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let config: AssociationModel = planned.decode()?;

        let perimeter = ProfileId::parse(&config.profile_id)?.perimeter_id();
        let base_name = ids::last_segment(&config.resource_id).ok_or_else(|| {
            ResourceError::Decode(format!(
                "resource_id {:?} has no name segment",
                config.resource_id
            ))
        })?;
        let name = (self.name_generator)(base_name);

        let id = ResourceAssociationId::new(
            &perimeter.subscription_id,
            &perimeter.resource_group_name,
            &perimeter.perimeter_name,
            &name,
        );

        match clients.associations.get_association(&id).await {
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

        let payload = NspAssociation {
            properties: Some(NspAssociationProperties {
                access_mode: Some(config.access_mode.clone()),
                private_link_resource: Some(SubResource::new(&config.resource_id)),
                profile: Some(SubResource::new(&config.profile_id)),
                ..Default::default()
            }),
            ..Default::default()
        };

        tracing::info!(%id, resource_id = %config.resource_id, "creating resource association");
        clients
            .associations
            .create_or_update_association(&id, &payload)
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
        let id = ResourceAssociationId::parse(&current.id()?)?;

        let response = match clients.associations.get_association(&id).await {
            Ok(response) => response,
            Err(e) if e.was_not_found() => {
                tracing::info!(%id, "resource association no longer exists, removing from state");
                return Ok(None);
            }
            Err(e) => return Err(ResourceError::upstream("retrieving", &id, e)),
        };

        let properties = match response.model.and_then(|m| m.properties) {
            Some(properties) => properties,
            None => {
                tracing::warn!(
                    %id,
                    "resource association returned without properties, only the id is known"
                );
                NspAssociationProperties::default()
            }
        };

        let state = AssociationModel {
            id: Some(id.to_string()),
            profile_id: properties.profile.and_then(|p| p.id).unwrap_or_default(),
            resource_id: properties
                .private_link_resource
                .and_then(|r| r.id)
                .unwrap_or_default(),
            access_mode: properties.access_mode.unwrap_or_default(),
        };

        ResourceState::encode(&state).map(Some)
    }

    async fn update(
        &self,
        clients: &Clients,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let id = ResourceAssociationId::parse(&current.id()?)?;
        let prior: AssociationModel = current.decode()?;
        let config: AssociationModel = planned.decode()?;
        let changes = ChangeSet::between(&prior, &config);

        let existing = clients
            .associations
            .get_association(&id)
            .await
            .map_err(|e| ResourceError::upstream("retrieving", &id, e))?;
        let model = existing.model.ok_or_else(|| {
            ResourceError::InvalidState(format!("retrieving {}: `model` was nil", id))
        })?;
        let properties = model.properties.ok_or_else(|| {
            ResourceError::InvalidState(format!("retrieving {}: `properties` was nil", id))
        })?;

        if changes.profile_id {
            if let Ok(profile) = ProfileId::parse(&config.profile_id) {
                if profile.perimeter_id() != id.perimeter_id() {
                    tracing::warn!(
                        %id,
                        profile_id = %config.profile_id,
                        "profile belongs to a different perimeter than the association"
                    );
                }
            }
        }

        let payload = NspAssociation {
            properties: Some(merge_properties(properties, &config, changes)),
            ..Default::default()
        };

        tracing::info!(%id, ?changes, "updating resource association");
        clients
            .associations
            .create_or_update_association(&id, &payload)
            .await
            .map_err(|e| ResourceError::upstream("updating", &id, e))?;

        let mut state = planned.clone();
        state.set_id(&id);
        Ok(state)
    }

    async fn delete(&self, clients: &Clients, current: &ResourceState) -> ResourceResult<()> {
        let id = ResourceAssociationId::parse(&current.id()?)?;

        tracing::info!(%id, "deleting resource association");
        clients
            .associations
            .delete_association(&id)
            .await
            .map(|_| ())
            .map_err(|e| ResourceError::upstream("deleting", &id, e))
    }
}
