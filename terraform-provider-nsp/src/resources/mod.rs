//! Terraform Resources for Network Security Perimeters
//!
//! Defines the resources that can be managed via Terraform.

pub mod association;
pub mod profile;

pub use association::{AssociationResource, NameGenerator};
pub use profile::ProfileResource;

use crate::client::Clients;
use crate::error::{ResourceError, ResourceResult};
use crate::ids::IdParseError;
use crate::schema::ResourceSchema;
use crate::validation::FieldValidator;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Resource state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub values: HashMap<String, Value>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// The persisted resource id
    pub fn id(&self) -> ResourceResult<String> {
        self.get_string("id")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ResourceError::Decode("resource ID is not set".to_string()))
    }

    pub fn set_id(&mut self, id: impl ToString) {
        self.set("id", Value::String(id.to_string()));
    }

    /// Decode the flat attribute set into a typed model
    pub fn decode<T: DeserializeOwned>(&self) -> ResourceResult<T> {
        let object: serde_json::Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Encode a typed model into a flat attribute set
    pub fn encode<T: Serialize>(model: &T) -> ResourceResult<Self> {
        match serde_json::to_value(model)? {
            Value::Object(object) => Ok(Self {
                values: object.into_iter().collect(),
            }),
            other => Err(ResourceError::Decode(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }
}

impl From<HashMap<String, Value>> for ResourceState {
    fn from(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

/// Per-operation time limits, enforced by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

/// Outcome of planning a change
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChange {
    pub planned_state: ResourceState,
    /// Attributes whose change replaces the resource, sorted
    pub requires_replace: Vec<String>,
}

/// Resource trait
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &'static str;

    /// Get the schema for this resource
    fn schema(&self) -> ResourceSchema;

    /// Attribute validators, run before the configuration is decoded
    fn validators(&self) -> &'static [FieldValidator];

    /// Check that an id handed to import has this resource's shape
    fn validate_id(&self, id: &str) -> Result<(), IdParseError>;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Create a new resource
    async fn create(&self, clients: &Clients, planned: &ResourceState)
        -> ResourceResult<ResourceState>;

    /// Read an existing resource, `None` when it no longer exists
    async fn read(
        &self,
        clients: &Clients,
        current: &ResourceState,
    ) -> ResourceResult<Option<ResourceState>>;

    /// Update an existing resource
    async fn update(
        &self,
        clients: &Clients,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Delete a resource
    async fn delete(&self, clients: &Clients, current: &ResourceState) -> ResourceResult<()>;

    /// Plan changes
    fn plan_change(
        &self,
        prior: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> PlannedChange {
        plan_with_schema(&self.schema(), prior, proposed)
    }
}

/// Plan a change from the schema alone
///
/// A new resource gets an unknown (null) id, an existing one keeps its id, and
/// every changed `force_new` attribute is reported as requiring replacement.
pub fn plan_with_schema(
    schema: &ResourceSchema,
    prior: Option<&ResourceState>,
    proposed: &ResourceState,
) -> PlannedChange {
    let mut planned_state = proposed.clone();

    let Some(prior) = prior else {
        planned_state.set("id", Value::Null);
        return PlannedChange {
            planned_state,
            requires_replace: Vec::new(),
        };
    };

    if let Some(id) = prior.get("id").filter(|v| !v.is_null()) {
        planned_state.set("id", id.clone());
    }

    let requires_replace = schema
        .block
        .force_new_attributes()
        .into_iter()
        .filter(|name| {
            let before = prior.get(name).filter(|v| !v.is_null());
            let after = proposed.get(name).filter(|v| !v.is_null());
            before != after
        })
        .map(String::from)
        .collect();

    PlannedChange {
        planned_state,
        requires_replace,
    }
}

/// Get all available resources
pub fn get_all_resources() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(ProfileResource::new()),
        Box::new(AssociationResource::new()),
    ]
}
