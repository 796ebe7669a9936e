//! Caller-held references to a deployed prediction service

use std::fmt;
use std::path::Path;

use kube::Resource;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Name and namespace of one cluster object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,
    pub namespace: String,
}

impl ResourceRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Reference to an object returned by the API server.
    ///
    /// Created objects always carry a name; the namespace falls back to the
    /// one the object was submitted to.
    pub fn from_created<K>(object: &K, namespace: &str) -> Result<Self>
    where
        K: Resource,
        K::DynamicType: Default,
    {
        let meta = object.meta();
        let name = meta.name.clone().ok_or_else(|| {
            Error::Cluster(format!("created {} has no name", K::kind(&Default::default())))
        })?;
        let namespace = meta.namespace.clone().unwrap_or_else(|| namespace.to_string());
        Ok(Self { name, namespace })
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of a successful deploy; required to delete the service later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedHandle {
    pub deployment_id: String,
    pub compute: ResourceRef,
    pub network: ResourceRef,
}

impl DeployedHandle {
    /// Persist the handle as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a handle written by [`DeployedHandle::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use tempfile::TempDir;

    fn handle() -> DeployedHandle {
        DeployedHandle {
            deployment_id: "abc".into(),
            compute: ResourceRef::new("fairing-deployer-x1", "models"),
            network: ResourceRef::new("fairing-service-y2", "models"),
        }
    }

    #[test]
    fn test_resource_ref_display() {
        assert_eq!(ResourceRef::new("svc", "ns").to_string(), "ns/svc");
    }

    #[test]
    fn test_resource_ref_from_created() {
        let service = Service {
            metadata: ObjectMeta {
                name: Some("fairing-service-abcde".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let r = ResourceRef::from_created(&service, "models").unwrap();
        assert_eq!(r, ResourceRef::new("fairing-service-abcde", "models"));

        let unnamed = Service::default();
        assert!(ResourceRef::from_created(&unnamed, "models").is_err());
    }

    #[test]
    fn test_handle_save_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("handle.json");

        handle().save(&path).unwrap();
        let loaded = DeployedHandle::load(&path).unwrap();
        assert_eq!(loaded, handle());
    }

    #[test]
    fn test_handle_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = DeployedHandle::load(&temp.path().join("missing.json"));
        assert!(matches!(result.unwrap_err(), Error::Io(_)));
    }
}
