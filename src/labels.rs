//! Correlation labels shared by the Deployment and its Service

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label carrying the per-deploy unique identifier
pub const DEPLOYMENT_ID_KEY: &str = "deployment-id";

/// Label naming the kind of deployer that created the resources
pub const DEPLOYER_TYPE_KEY: &str = "deployer-type";

/// Keys callers may not set themselves
pub const RESERVED_KEYS: &[&str] = &[DEPLOYMENT_ID_KEY, DEPLOYER_TYPE_KEY];

/// Immutable label set built once per deploy call.
///
/// The same set is stamped on the Deployment, its pod template and the
/// Service, and doubles as the Service selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationLabels {
    deployment_id: String,
    labels: BTreeMap<String, String>,
}

impl CorrelationLabels {
    /// Merge layers in order, then pin the deployment id on top
    pub fn new<'a, I>(deployment_id: impl Into<String>, layers: I) -> Self
    where
        I: IntoIterator<Item = &'a BTreeMap<String, String>>,
    {
        let deployment_id = deployment_id.into();
        let mut labels = BTreeMap::new();
        for layer in layers {
            labels.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        labels.insert(DEPLOYMENT_ID_KEY.to_string(), deployment_id.clone());
        Self { deployment_id, labels }
    }

    /// Fresh label set with a random v4 deployment id
    pub fn generate<'a, I>(layers: I) -> Self
    where
        I: IntoIterator<Item = &'a BTreeMap<String, String>>,
    {
        Self::new(uuid::Uuid::new_v4().to_string(), layers)
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Owned copy for embedding in a Kubernetes object
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.labels.clone()
    }
}
