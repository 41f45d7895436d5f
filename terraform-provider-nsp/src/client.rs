//! Azure Resource Manager client for network security perimeter resources

use crate::ids::{ProfileId, ResourceAssociationId};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, LOCATION, RETRY_AFTER};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// API version of the `Microsoft.Network` network security perimeter resources
pub const API_VERSION: &str = "2024-07-01";

pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Long-running operation ended with status {status}: {message}")]
    OperationFailed { status: String, message: String },
    #[error("Long-running operation still in progress after {0} polls")]
    PollingExhausted(u32),
}

impl ClientError {
    /// Whether the remote side reported the resource as absent
    pub fn was_not_found(&self) -> bool {
        match self {
            ClientError::NotFound(_) => true,
            ClientError::Api { status, .. } => *status == 404,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A successful response: HTTP status plus the decoded body, if any
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub status: u16,
    pub model: Option<T>,
}

impl<T> Response<T> {
    pub fn new(status: u16, model: Option<T>) -> Self {
        Self { status, model }
    }
}

/// Polling behaviour of `delete_then_poll`
#[derive(Debug, Clone, Copy)]
pub struct DeleteOptions {
    /// Wait between polls when the service sends no `Retry-After`
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_polls: 180,
        }
    }
}

// ============================================================================
// API Data Types
// ============================================================================

/// Network security perimeter profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NspProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<NspProfileProperties>,
}

/// Read-only profile properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NspProfileProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_rules_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_settings_version: Option<String>,
}

/// Network security perimeter resource association
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NspAssociation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<NspAssociationProperties>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NspAssociationProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_link_resource: Option<SubResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<SubResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_provisioning_issues: Option<String>,
}

/// Reference to another ARM resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl SubResource {
    pub fn new(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
        }
    }
}

/// ARM error envelope
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Body of an `Azure-AsyncOperation` status monitor
#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

// ============================================================================
// Client traits
// ============================================================================

/// Profile operations used by the profile resource
#[async_trait]
pub trait ProfilesApi: Send + Sync {
    async fn get_profile(&self, id: &ProfileId) -> Result<Response<NspProfile>>;

    async fn create_or_update_profile(
        &self,
        id: &ProfileId,
        profile: &NspProfile,
    ) -> Result<Response<NspProfile>>;

    async fn delete_profile_then_poll(&self, id: &ProfileId, options: DeleteOptions) -> Result<()>;
}

/// Resource association operations used by the association resource
#[async_trait]
pub trait AssociationsApi: Send + Sync {
    async fn get_association(&self, id: &ResourceAssociationId) -> Result<Response<NspAssociation>>;

    async fn create_or_update_association(
        &self,
        id: &ResourceAssociationId,
        association: &NspAssociation,
    ) -> Result<Response<NspAssociation>>;

    async fn delete_association(&self, id: &ResourceAssociationId) -> Result<Response<()>>;
}

/// Everything a resource handler needs from the configured provider
#[derive(Clone)]
pub struct Clients {
    pub subscription_id: String,
    pub profiles: Arc<dyn ProfilesApi>,
    pub associations: Arc<dyn AssociationsApi>,
}

impl Clients {
    /// Use one ARM client for every API
    pub fn from_arm(subscription_id: &str, client: ArmClient) -> Self {
        let client = Arc::new(client);
        Self {
            subscription_id: subscription_id.to_string(),
            profiles: client.clone(),
            associations: client,
        }
    }
}

// ============================================================================
// ARM client
// ============================================================================

/// Azure Resource Manager REST client
#[derive(Clone)]
pub struct ArmClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl ArmClient {
    /// Create a new client
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Set a pre-issued bearer token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Acquire a token with the OAuth2 client credentials grant
    pub async fn authenticate(
        &mut self,
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority.trim_end_matches('/'),
            tenant_id
        );
        let scope = format!("{}/.default", self.endpoint);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", scope.as_str()),
        ];

        tracing::debug!(tenant_id, client_id, "requesting management token");
        let response = self.client.post(&url).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::AuthFailed(format!(
                "{} - {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        self.token = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    /// Build headers for requests
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}?api-version={}", self.endpoint, path, API_VERSION)
    }

    /// GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Response<T>> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .headers(self.headers())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// PUT request
    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response<T>> {
        let url = self.url(path);
        tracing::debug!(%url, "PUT");
        let response = self
            .client
            .put(&url)
            .headers(self.headers())
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// DELETE request, returning the raw response so callers can follow 202s
    async fn send_delete(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.url(path);
        tracing::debug!(%url, "DELETE");
        let response = self
            .client
            .delete(&url)
            .headers(self.headers())
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 202 | 204 => Ok(response),
            status => Err(error_from_response(status, response).await),
        }
    }

    /// DELETE request
    pub async fn delete(&self, path: &str) -> Result<Response<()>> {
        let response = self.send_delete(path).await?;
        Ok(Response::new(response.status().as_u16(), None))
    }

    /// DELETE request followed by polling until the service reports completion
    pub async fn delete_then_poll(&self, path: &str, options: DeleteOptions) -> Result<()> {
        let response = self.send_delete(path).await?;
        if response.status().as_u16() != 202 {
            return Ok(());
        }

        let headers = response.headers();
        let mut wait = retry_after(headers).unwrap_or(options.poll_interval);
        let monitor = match (
            header_str(headers, AZURE_ASYNC_OPERATION),
            header_str(headers, LOCATION.as_str()),
        ) {
            (Some(url), _) => Monitor::AsyncOperation(url),
            (None, Some(url)) => Monitor::Location(url),
            (None, None) => Monitor::Resource(self.url(path)),
        };

        for attempt in 1..=options.max_polls {
            tokio::time::sleep(wait).await;
            tracing::debug!(attempt, ?monitor, "polling delete");

            let response = self
                .client
                .get(monitor.url())
                .headers(self.headers())
                .send()
                .await?;
            let status = response.status().as_u16();
            wait = retry_after(response.headers()).unwrap_or(options.poll_interval);

            match &monitor {
                Monitor::AsyncOperation(_) => {
                    if !(200..300).contains(&status) {
                        return Err(error_from_response(status, response).await);
                    }
                    let body: OperationStatus = serde_json::from_str(&response.text().await?)?;
                    match body.status.as_str() {
                        "Succeeded" => return Ok(()),
                        "Failed" | "Canceled" | "Cancelled" => {
                            return Err(ClientError::OperationFailed {
                                status: body.status,
                                message: body
                                    .error
                                    .map(|e| format!("{}: {}", e.code, e.message))
                                    .unwrap_or_default(),
                            });
                        }
                        _ => {}
                    }
                }
                Monitor::Location(_) | Monitor::Resource(_) => match status {
                    202 => {}
                    200 | 204 if matches!(monitor, Monitor::Location(_)) => return Ok(()),
                    200 => {}
                    404 => return Ok(()),
                    _ => return Err(error_from_response(status, response).await),
                },
            }
        }

        Err(ClientError::PollingExhausted(options.max_polls))
    }

    /// Handle API response
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<Response<T>> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            let model = if body.trim().is_empty() {
                None
            } else {
                Some(serde_json::from_str(&body)?)
            };
            Ok(Response::new(status.as_u16(), model))
        } else {
            Err(error_from_response(status.as_u16(), response).await)
        }
    }
}

#[derive(Debug)]
enum Monitor {
    AsyncOperation(String),
    Location(String),
    Resource(String),
}

impl Monitor {
    fn url(&self) -> &str {
        match self {
            Monitor::AsyncOperation(url) | Monitor::Location(url) | Monitor::Resource(url) => url,
        }
    }
}

async fn error_from_response(status: u16, response: reqwest::Response) -> ClientError {
    let body = response.text().await.unwrap_or_default();
    let message = api_error_message(&body);
    match status {
        401 | 403 => ClientError::AuthFailed(message),
        404 => ClientError::NotFound(message),
        _ => ClientError::Api { status, message },
    }
}

/// Flatten an ARM error envelope to `code: message`, or return the body as-is
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.code.is_empty() => {
            format!("{}: {}", envelope.error.code, envelope.error.message)
        }
        Ok(envelope) => envelope.error.message,
        Err(_) => body.to_string(),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// `Retry-After` in delta-seconds form
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

// ============================================================================
// API Methods
// ============================================================================

#[async_trait]
impl ProfilesApi for ArmClient {
    async fn get_profile(&self, id: &ProfileId) -> Result<Response<NspProfile>> {
        self.get(&id.to_string()).await
    }

    async fn create_or_update_profile(
        &self,
        id: &ProfileId,
        profile: &NspProfile,
    ) -> Result<Response<NspProfile>> {
        self.put(&id.to_string(), profile).await
    }

    async fn delete_profile_then_poll(&self, id: &ProfileId, options: DeleteOptions) -> Result<()> {
        self.delete_then_poll(&id.to_string(), options).await
    }
}

#[async_trait]
impl AssociationsApi for ArmClient {
    async fn get_association(&self, id: &ResourceAssociationId) -> Result<Response<NspAssociation>> {
        self.get(&id.to_string()).await
    }

    async fn create_or_update_association(
        &self,
        id: &ResourceAssociationId,
        association: &NspAssociation,
    ) -> Result<Response<NspAssociation>> {
        self.put(&id.to_string(), association).await
    }

    async fn delete_association(&self, id: &ResourceAssociationId) -> Result<Response<()>> {
        self.delete(&id.to_string()).await
    }
}
