//! Resource operation errors

use crate::client::ClientError;
use crate::ids::IdParseError;
use crate::schema::Diagnostic;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by resource handlers
///
/// A resource that disappeared between refreshes is not an error: `read`
/// reports it as `Ok(None)` and the provider drops it from state.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("decoding: {0}")]
    Decode(String),

    #[error(transparent)]
    IdentityParse(#[from] IdParseError),

    #[error("A resource with the ID {id:?} already exists - to be managed via Terraform this resource needs to be imported into the State. Please see the resource documentation for {resource_type:?} for more information")]
    AlreadyExists {
        resource_type: &'static str,
        id: String,
    },

    #[error("{0}")]
    InvalidState(String),

    #[error("{operation} {id}: {source}")]
    Upstream {
        operation: &'static str,
        id: String,
        #[source]
        source: ClientError,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl ResourceError {
    /// Wrap a failed client call with the operation and the id it targeted
    pub fn upstream(operation: &'static str, id: impl ToString, source: ClientError) -> Self {
        ResourceError::Upstream {
            operation,
            id: id.to_string(),
            source,
        }
    }
}

impl From<serde_json::Error> for ResourceError {
    fn from(e: serde_json::Error) -> Self {
        ResourceError::Decode(e.to_string())
    }
}

impl From<ResourceError> for Diagnostic {
    fn from(e: ResourceError) -> Self {
        Diagnostic::error(&e.to_string())
    }
}

pub type ResourceResult<T> = Result<T, ResourceError>;
