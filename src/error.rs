//! Error types for kube-serving

use thiserror::Error;

use crate::handle::DeployedHandle;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Cluster operation failed: {0}")]
    Cluster(String),

    #[error("Endpoint for service {service} could not be resolved: {reason}")]
    EndpointUnresolved { service: String, reason: String },

    #[error("Deployment {} created but its endpoint could not be resolved: {source}", .handle.deployment_id)]
    EndpointResolution {
        handle: Box<DeployedHandle>,
        #[source]
        source: Box<Error>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error carries a handle to resources that still exist
    pub fn leaked_handle(&self) -> Option<&DeployedHandle> {
        match self {
            Error::EndpointResolution { handle, .. } => Some(handle),
            _ => None,
        }
    }

    /// Check if the Kubernetes API answered 404 for the target resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(resp)) if resp.code == 404)
    }
}
