//! Terraform Provider Implementation
//!
//! Implements the Terraform plugin protocol for network security perimeters.

use crate::client::{ArmClient, Clients};
use crate::config::{Credentials, ProviderConfig};
use crate::error::{ResourceError, ResourceResult};
use crate::resources::{get_all_resources, Resource, ResourceState};
use crate::schema::{
    Diagnostic, ProviderSchema, RpcRequest, RpcResponse, SchemaAttribute, SchemaBlock,
    JSONRPC_VERSION,
};
use crate::validation;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::runtime::Runtime;

/// Network Security Perimeter Terraform Provider
pub struct NspProvider {
    clients: Arc<RwLock<Option<Clients>>>,
    resources: HashMap<String, Box<dyn Resource>>,
    runtime: Runtime,
}

impl NspProvider {
    /// Create a new provider
    pub fn new() -> std::io::Result<Self> {
        Self::with_resources(get_all_resources())
    }

    /// Create a provider serving the given resources
    pub fn with_resources(resources: Vec<Box<dyn Resource>>) -> std::io::Result<Self> {
        let resources: HashMap<String, Box<dyn Resource>> = resources
            .into_iter()
            .map(|r| (r.type_name().to_string(), r))
            .collect();

        Ok(Self {
            clients: Arc::new(RwLock::new(None)),
            resources,
            runtime: Runtime::new()?,
        })
    }

    /// Use already-configured clients instead of `ConfigureProvider`
    pub fn with_clients(self, clients: Clients) -> Self {
        self.store_clients(clients);
        self
    }

    fn store_clients(&self, clients: Clients) {
        let mut guard = self.clients.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(clients);
    }

    /// Get provider schema
    fn get_schema(&self) -> ProviderSchema {
        let provider_block = SchemaBlock::new()
            .with_attribute(
                "subscription_id",
                SchemaAttribute::string()
                    .with_description("Subscription to manage resources in (ARM_SUBSCRIPTION_ID)")
                    .optional(),
            )
            .with_attribute(
                "tenant_id",
                SchemaAttribute::string()
                    .with_description("Microsoft Entra tenant ID (ARM_TENANT_ID)")
                    .optional(),
            )
            .with_attribute(
                "client_id",
                SchemaAttribute::string()
                    .with_description("Service principal client ID (ARM_CLIENT_ID)")
                    .optional(),
            )
            .with_attribute(
                "client_secret",
                SchemaAttribute::string()
                    .with_description("Service principal client secret (ARM_CLIENT_SECRET)")
                    .optional()
                    .sensitive(),
            )
            .with_attribute(
                "access_token",
                SchemaAttribute::string()
                    .with_description("Pre-issued management API bearer token (ARM_ACCESS_TOKEN)")
                    .optional()
                    .sensitive(),
            )
            .with_attribute(
                "endpoint",
                SchemaAttribute::string()
                    .with_description("Resource Manager endpoint (ARM_ENDPOINT)")
                    .optional(),
            )
            .with_attribute(
                "authority",
                SchemaAttribute::string()
                    .with_description("Token authority host (ARM_AUTHORITY)")
                    .optional(),
            )
            .with_description("Azure Network Security Perimeter provider");

        let mut schema = ProviderSchema::new(provider_block);

        for (name, resource) in &self.resources {
            schema = schema.with_resource(name, resource.schema());
        }

        schema
    }

    /// Configure the provider
    fn configure(&self, config: ProviderConfig) -> Vec<Diagnostic> {
        let resolved = match config.with_env_fallback().resolve() {
            Ok(resolved) => resolved,
            Err(errors) => {
                return errors
                    .iter()
                    .map(|e| Diagnostic::error(&e.to_string()))
                    .collect();
            }
        };

        let client = match ArmClient::new(&resolved.endpoint) {
            Ok(client) => client,
            Err(e) => {
                return vec![Diagnostic::error(&format!(
                    "Failed to create HTTP client: {}",
                    e
                ))]
            }
        };

        let client = match &resolved.credentials {
            Credentials::AccessToken(token) => client.with_token(token),
            Credentials::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let mut client = client;
                let authenticated = self.runtime.block_on(client.authenticate(
                    &resolved.authority,
                    tenant_id,
                    client_id,
                    client_secret,
                ));
                if let Err(e) = authenticated {
                    return vec![Diagnostic::error(&format!("Authentication failed: {}", e))];
                }
                client
            }
        };

        tracing::info!(subscription_id = %resolved.subscription_id, endpoint = %resolved.endpoint, "provider configured");
        self.store_clients(Clients::from_arm(&resolved.subscription_id, client));

        Vec::new()
    }

    /// Get the configured clients
    fn get_clients(&self) -> Result<Clients, Diagnostic> {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| Diagnostic::error("Provider not configured"))
    }

    /// Run a handler future on the runtime under the operation's time limit
    fn run<T>(
        &self,
        operation: &'static str,
        limit: Duration,
        future: impl Future<Output = ResourceResult<T>>,
    ) -> ResourceResult<T> {
        self.runtime.block_on(async {
            match tokio::time::timeout(limit, future).await {
                Ok(result) => result,
                Err(_) => Err(ResourceError::Timeout {
                    operation,
                    after: limit,
                }),
            }
        })
    }

    /// Handle an RPC request
    pub fn handle_request(&self, input: &str) -> String {
        let request: RpcRequest = match serde_json::from_str(input) {
            Ok(r) => r,
            Err(e) => {
                return serde_json::to_string(&RpcResponse::error(
                    0,
                    -32700,
                    &format!("Parse error: {}", e),
                ))
                .unwrap_or_default();
            }
        };

        tracing::debug!(method = %request.method, id = request.id, "handling request");

        if request.jsonrpc != JSONRPC_VERSION {
            return serde_json::to_string(&RpcResponse::error(
                request.id,
                -32600,
                &format!("Invalid request: unsupported jsonrpc version {:?}", request.jsonrpc),
            ))
            .unwrap_or_default();
        }

        let response = match request.method.as_str() {
            "GetProviderSchema" => self.handle_get_schema(request.id),
            "ConfigureProvider" => self.handle_configure(request.id, &request.params),
            "ValidateResourceConfig" => self.handle_validate_resource(request.id, &request.params),
            "PlanResourceChange" => self.handle_plan_resource(request.id, &request.params),
            "ApplyResourceChange" => self.handle_apply_resource(request.id, &request.params),
            "ReadResource" => self.handle_read_resource(request.id, &request.params),
            "ImportResourceState" => self.handle_import_resource(request.id, &request.params),
            "StopProvider" => RpcResponse::success(request.id, serde_json::json!({})),
            _ => RpcResponse::error(
                request.id,
                -32601,
                &format!("Method not found: {}", request.method),
            ),
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&RpcResponse::error(
                request.id,
                -32603,
                &format!("Serialization error: {}", e),
            ))
            .unwrap_or_default()
        })
    }

    fn resource_for(&self, params: &Value) -> Result<&dyn Resource, Diagnostic> {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| Diagnostic::error(&format!("Unknown resource type: {}", type_name)))
    }

    /// Handle GetProviderSchema
    fn handle_get_schema(&self, id: i64) -> RpcResponse {
        let schema = self.get_schema();
        RpcResponse::success(id, serde_json::to_value(schema).unwrap_or_default())
    }

    /// Handle ConfigureProvider
    fn handle_configure(&self, id: i64, params: &Value) -> RpcResponse {
        let config: ProviderConfig = match params.get("config").filter(|c| !c.is_null()) {
            Some(c) => match serde_json::from_value(c.clone()) {
                Ok(config) => config,
                Err(e) => {
                    return diagnostics_response(
                        id,
                        vec![Diagnostic::error(&format!("Invalid provider configuration: {}", e))],
                    )
                }
            },
            None => ProviderConfig::default(),
        };

        diagnostics_response(id, self.configure(config))
    }

    /// Handle ValidateResourceConfig
    fn handle_validate_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource_for(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let config = state_param(params, "config").unwrap_or_default();
        diagnostics_response(id, validation::validate(resource.validators(), &config.values))
    }

    /// Handle PlanResourceChange
    fn handle_plan_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource_for(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let Some(proposed_state) = state_param(params, "proposed_new_state") else {
            // Destroy plan
            return RpcResponse::success(
                id,
                serde_json::json!({
                    "planned_state": null,
                    "diagnostics": []
                }),
            );
        };

        let diagnostics = validation::validate(resource.validators(), &proposed_state.values);
        if !diagnostics.is_empty() {
            return diagnostics_response(id, diagnostics);
        }

        let prior_state = state_param(params, "prior_state");
        let change = resource.plan_change(prior_state.as_ref(), &proposed_state);

        RpcResponse::success(
            id,
            serde_json::json!({
                "planned_state": change.planned_state.values,
                "requires_replace": change.requires_replace,
                "diagnostics": []
            }),
        )
    }

    /// Handle ApplyResourceChange
    fn handle_apply_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource_for(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let clients = match self.get_clients() {
            Ok(c) => c,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let planned_state = state_param(params, "planned_state");
        let prior_state = state_param(params, "prior_state");
        let timeouts = resource.timeouts();

        if let Some(planned) = &planned_state {
            let diagnostics = validation::validate(resource.validators(), &planned.values);
            if !diagnostics.is_empty() {
                return diagnostics_response(id, diagnostics);
            }
        }

        let result = match (prior_state, planned_state) {
            (Some(prior), None) => self
                .run(
                    "deleting",
                    timeouts.delete,
                    resource.delete(&clients, &prior),
                )
                .map(|_| None),
            (None, None) => Ok(None),
            (None, Some(planned)) => self
                .run(
                    "creating",
                    timeouts.create,
                    resource.create(&clients, &planned),
                )
                .map(Some),
            (Some(prior), Some(planned)) => self
                .run(
                    "updating",
                    timeouts.update,
                    resource.update(&clients, &prior, &planned),
                )
                .map(Some),
        };

        match result {
            Ok(new_state) => RpcResponse::success(
                id,
                serde_json::json!({
                    "new_state": new_state.map(|s| s.values),
                    "diagnostics": []
                }),
            ),
            Err(e) => {
                tracing::error!(error = %e, "apply failed");
                diagnostics_response(id, vec![e.into()])
            }
        }
    }

    /// Handle ReadResource
    fn handle_read_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource_for(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let clients = match self.get_clients() {
            Ok(c) => c,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let current_state = state_param(params, "current_state").unwrap_or_default();

        let result = self.run(
            "retrieving",
            resource.timeouts().read,
            resource.read(&clients, &current_state),
        );

        match result {
            Ok(new_state) => RpcResponse::success(
                id,
                serde_json::json!({
                    "new_state": new_state.map(|s| s.values),
                    "diagnostics": []
                }),
            ),
            Err(e) => diagnostics_response(id, vec![e.into()]),
        }
    }

    /// Handle ImportResourceState
    fn handle_import_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource_for(params) {
            Ok(r) => r,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let resource_id = params.get("id").and_then(|v| v.as_str()).unwrap_or("");
        if let Err(e) = resource.validate_id(resource_id) {
            return diagnostics_response(id, vec![Diagnostic::error(&e.to_string())]);
        }

        let clients = match self.get_clients() {
            Ok(c) => c,
            Err(diag) => return diagnostics_response(id, vec![diag]),
        };

        let mut import_state = ResourceState::new();
        import_state.set_id(resource_id);

        let result = self.run(
            "importing",
            resource.timeouts().read,
            resource.read(&clients, &import_state),
        );

        match result {
            Ok(Some(state)) => RpcResponse::success(
                id,
                serde_json::json!({
                    "imported_resources": [{
                        "type_name": resource.type_name(),
                        "state": state.values
                    }],
                    "diagnostics": []
                }),
            ),
            Ok(None) => diagnostics_response(
                id,
                vec![Diagnostic::error(&format!(
                    "Cannot import non-existent remote object {}",
                    resource_id
                ))],
            ),
            Err(e) => diagnostics_response(id, vec![e.into()]),
        }
    }
}

/// Read an object-valued parameter as resource state; null or absent gives `None`
fn state_param(params: &Value, key: &str) -> Option<ResourceState> {
    params.get(key).and_then(|v| {
        v.as_object().map(|obj| {
            let values: HashMap<String, Value> =
                obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            ResourceState { values }
        })
    })
}

fn diagnostics_response(id: i64, diagnostics: Vec<Diagnostic>) -> RpcResponse {
    RpcResponse::success(
        id,
        serde_json::json!({
            "diagnostics": diagnostics
        }),
    )
}
