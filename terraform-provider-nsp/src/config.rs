//! Provider configuration
//!
//! Values come from the provider block first and fall back to the `ARM_*`
//! environment variables used by the other Azure tooling.

use crate::client::{DEFAULT_AUTHORITY, DEFAULT_ENDPOINT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{attribute} is required (or set the {env} environment variable)")]
    Missing {
        attribute: &'static str,
        env: &'static str,
    },
    #[error("either access_token or tenant_id, client_id and client_secret must be provided")]
    NoCredentials,
}

/// Provider configuration as written in the provider block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub endpoint: Option<String>,
    pub authority: Option<String>,
}

/// How the provider authenticates against the management API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    AccessToken(String),
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

/// Configuration with every required value present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub subscription_id: String,
    pub endpoint: String,
    pub authority: String,
    pub credentials: Credentials,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ProviderConfig {
    /// Fill unset values from the process environment
    pub fn with_env_fallback(self) -> Self {
        self.with_fallback(|name| std::env::var(name).ok())
    }

    /// Fill unset values from `lookup`, keyed by environment variable name
    pub fn with_fallback(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |value: Option<String>, env: &str| non_empty(value).or_else(|| non_empty(lookup(env)));

        Self {
            subscription_id: pick(self.subscription_id, "ARM_SUBSCRIPTION_ID"),
            tenant_id: pick(self.tenant_id, "ARM_TENANT_ID"),
            client_id: pick(self.client_id, "ARM_CLIENT_ID"),
            client_secret: pick(self.client_secret, "ARM_CLIENT_SECRET"),
            access_token: pick(self.access_token, "ARM_ACCESS_TOKEN"),
            endpoint: pick(self.endpoint, "ARM_ENDPOINT"),
            authority: pick(self.authority, "ARM_AUTHORITY"),
        }
    }

    /// Check required values and pick the credential source
    pub fn resolve(self) -> Result<ResolvedConfig, Vec<ConfigError>> {
        let mut errors = Vec::new();

        let subscription_id = non_empty(self.subscription_id);
        if subscription_id.is_none() {
            errors.push(ConfigError::Missing {
                attribute: "subscription_id",
                env: "ARM_SUBSCRIPTION_ID",
            });
        }

        let credentials = match (
            non_empty(self.access_token),
            non_empty(self.tenant_id),
            non_empty(self.client_id),
            non_empty(self.client_secret),
        ) {
            (Some(token), _, _, _) => Some(Credentials::AccessToken(token)),
            (None, Some(tenant_id), Some(client_id), Some(client_secret)) => {
                Some(Credentials::ClientSecret {
                    tenant_id,
                    client_id,
                    client_secret,
                })
            }
            _ => {
                errors.push(ConfigError::NoCredentials);
                None
            }
        };

        match (subscription_id, credentials) {
            (Some(subscription_id), Some(credentials)) if errors.is_empty() => Ok(ResolvedConfig {
                subscription_id,
                endpoint: non_empty(self.endpoint).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                authority: non_empty(self.authority)
                    .unwrap_or_else(|| DEFAULT_AUTHORITY.to_string()),
                credentials,
            }),
            _ => Err(errors),
        }
    }
}
