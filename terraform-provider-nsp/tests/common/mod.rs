//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use terraform_provider_nsp::client::{
    AssociationsApi, ClientError, Clients, DeleteOptions, NspAssociation, NspProfile, ProfilesApi,
    Response, Result,
};
use terraform_provider_nsp::ids::{ProfileId, ResourceAssociationId};
use terraform_provider_nsp::resources::ResourceState;

pub const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

pub fn perimeter_id() -> String {
    format!(
        "/subscriptions/{}/resourceGroups/rg1/providers/Microsoft.Network/networkSecurityPerimeters/perim1",
        SUBSCRIPTION
    )
}

pub fn profile_id(name: &str) -> String {
    format!("{}/profiles/{}", perimeter_id(), name)
}

pub fn private_endpoint_id(name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/rg2/providers/Microsoft.Network/privateEndpoints/{}",
        SUBSCRIPTION, name
    )
}

/// Profile configuration as Terraform would send it
pub fn profile_config(name: &str, location: &str, tags: serde_json::Value) -> ResourceState {
    let mut state = ResourceState::new();
    state.set("name", json!(name));
    state.set("resource_group_name", json!("rg1"));
    state.set("perimeter_id", json!(perimeter_id()));
    state.set("location", json!(location));
    state.set("tags", tags);
    state
}

/// Association configuration as Terraform would send it
pub fn association_config(profile_id: &str, resource_id: &str, access_mode: &str) -> ResourceState {
    let mut state = ResourceState::new();
    state.set("profile_id", json!(profile_id));
    state.set("resource_id", json!(resource_id));
    state.set("access_mode", json!(access_mode));
    state
}

/// A call the handlers made against the fake
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetProfile(String),
    PutProfile(String, NspProfile),
    DeleteProfile(String),
    GetAssociation(String),
    PutAssociation(String, NspAssociation),
    DeleteAssociation(String),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Call::GetProfile(_) | Call::GetAssociation(_))
    }
}

/// In-memory stand-in for the Resource Manager API
#[derive(Default)]
pub struct FakeArm {
    profiles: Mutex<HashMap<String, NspProfile>>,
    associations: Mutex<HashMap<String, NspAssociation>>,
    calls: Mutex<Vec<Call>>,
    failure: Mutex<Option<(u16, String)>>,
    empty_models: AtomicBool,
}

impl FakeArm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn clients(self: &Arc<Self>) -> Clients {
        Clients {
            subscription_id: SUBSCRIPTION.to_string(),
            profiles: self.clone(),
            associations: self.clone(),
        }
    }

    /// Fail every call with this status until cleared
    pub fn fail_with(&self, status: u16, message: &str) {
        *self.failure.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Successful GETs return no body
    pub fn return_empty_models(&self, empty: bool) {
        self.empty_models.store(empty, Ordering::SeqCst);
    }

    pub fn insert_profile(&self, id: &str, profile: NspProfile) {
        self.profiles.lock().unwrap().insert(id.to_string(), profile);
    }

    pub fn insert_association(&self, id: &str, association: NspAssociation) {
        self.associations
            .lock()
            .unwrap()
            .insert(id.to_string(), association);
    }

    pub fn profile(&self, id: &str) -> Option<NspProfile> {
        self.profiles.lock().unwrap().get(id).cloned()
    }

    pub fn association(&self, id: &str) -> Option<NspAssociation> {
        self.associations.lock().unwrap().get(id).cloned()
    }

    pub fn association_ids(&self) -> Vec<String> {
        self.associations.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().clone() {
            Some((404, message)) => Err(ClientError::NotFound(message)),
            Some((status, message)) => Err(ClientError::Api { status, message }),
            None => Ok(()),
        }
    }

    fn model<T>(&self, model: T) -> Option<T> {
        if self.empty_models.load(Ordering::SeqCst) {
            None
        } else {
            Some(model)
        }
    }
}

#[async_trait]
impl ProfilesApi for FakeArm {
    async fn get_profile(&self, id: &ProfileId) -> Result<Response<NspProfile>> {
        let key = id.to_string();
        self.record(Call::GetProfile(key.clone()))?;
        match self.profile(&key) {
            Some(profile) => Ok(Response::new(200, self.model(profile))),
            None => Err(ClientError::NotFound(key)),
        }
    }

    async fn create_or_update_profile(
        &self,
        id: &ProfileId,
        profile: &NspProfile,
    ) -> Result<Response<NspProfile>> {
        let key = id.to_string();
        self.record(Call::PutProfile(key.clone(), profile.clone()))?;

        let stored = NspProfile {
            id: Some(key.clone()),
            name: Some(id.profile_name.clone()),
            resource_type: Some("Microsoft.Network/networkSecurityPerimeters/profiles".to_string()),
            ..profile.clone()
        };
        self.insert_profile(&key, stored.clone());
        Ok(Response::new(200, Some(stored)))
    }

    async fn delete_profile_then_poll(&self, id: &ProfileId, _options: DeleteOptions) -> Result<()> {
        let key = id.to_string();
        self.record(Call::DeleteProfile(key.clone()))?;
        match self.profiles.lock().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound(key)),
        }
    }
}

#[async_trait]
impl AssociationsApi for FakeArm {
    async fn get_association(&self, id: &ResourceAssociationId) -> Result<Response<NspAssociation>> {
        let key = id.to_string();
        self.record(Call::GetAssociation(key.clone()))?;
        match self.association(&key) {
            Some(association) => Ok(Response::new(200, self.model(association))),
            None => Err(ClientError::NotFound(key)),
        }
    }

    async fn create_or_update_association(
        &self,
        id: &ResourceAssociationId,
        association: &NspAssociation,
    ) -> Result<Response<NspAssociation>> {
        let key = id.to_string();
        self.record(Call::PutAssociation(key.clone(), association.clone()))?;

        let mut stored = NspAssociation {
            id: Some(key.clone()),
            name: Some(id.association_name.clone()),
            resource_type: Some(
                "Microsoft.Network/networkSecurityPerimeters/resourceAssociations".to_string(),
            ),
            ..association.clone()
        };
        if let Some(properties) = stored.properties.as_mut() {
            properties.provisioning_state = Some("Succeeded".to_string());
        }
        self.insert_association(&key, stored.clone());
        Ok(Response::new(200, Some(stored)))
    }

    async fn delete_association(&self, id: &ResourceAssociationId) -> Result<Response<()>> {
        let key = id.to_string();
        self.record(Call::DeleteAssociation(key.clone()))?;
        match self.associations.lock().unwrap().remove(&key) {
            Some(_) => Ok(Response::new(200, None)),
            None => Err(ClientError::NotFound(key)),
        }
    }
}
