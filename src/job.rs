//! Generic job capability injected into the serving lifecycle
//!
//! A [`JobLifecycle`] knows the target namespace, the labels every resource
//! of its deployer type carries, and how to stamp correlation labels onto a
//! pod template. [`PodTemplateFactory`] is the seam for whatever produces the
//! pod template in the first place (an image builder, a fixture, ...).

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::labels::{CorrelationLabels, DEPLOYER_TYPE_KEY};

/// Deployer type recorded on serving resources
pub const SERVING_DEPLOYER_TYPE: &str = "serving";

/// Produces the pod template that runs the model image
pub trait PodTemplateFactory {
    fn pod_template(&self) -> PodTemplateSpec;
}

/// Single-container template from an image reference and a command
#[derive(Debug, Clone)]
pub struct ContainerTemplate {
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ContainerTemplate {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

impl PodTemplateFactory for ContainerTemplate {
    fn pod_template(&self) -> PodTemplateSpec {
        let env = self
            .env
            .iter()
            .map(|(name, value)| k8s_openapi::api::core::v1::EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect::<Vec<_>>();

        PodTemplateSpec {
            metadata: None,
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "model".to_string(),
                    image: Some(self.image.clone()),
                    command: (!self.command.is_empty()).then(|| self.command.clone()),
                    env: (!env.is_empty()).then_some(env),
                    ..Default::default()
                }],
                ..Default::default()
            }),
        }
    }
}

/// Namespace, base labels and pod-template annotation for one deployer type
#[derive(Debug, Clone)]
pub struct JobLifecycle {
    namespace: String,
    base_labels: BTreeMap<String, String>,
}

impl JobLifecycle {
    pub fn new(namespace: impl Into<String>, deployer_type: &str) -> Self {
        let mut base_labels = BTreeMap::new();
        base_labels.insert(DEPLOYER_TYPE_KEY.to_string(), deployer_type.to_string());
        Self {
            namespace: namespace.into(),
            base_labels,
        }
    }

    /// Lifecycle for model-serving deployments
    pub fn serving(namespace: impl Into<String>) -> Self {
        Self::new(namespace, SERVING_DEPLOYER_TYPE)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Build the label set for one deploy call from caller labels
    pub fn correlation_labels(
        &self,
        configured: &BTreeMap<String, String>,
        extra: &BTreeMap<String, String>,
    ) -> CorrelationLabels {
        CorrelationLabels::generate([configured, extra, &self.base_labels])
    }

    /// Stamp the correlation labels onto the pod template metadata
    pub fn annotate_pod_template(
        &self,
        mut template: PodTemplateSpec,
        labels: &CorrelationLabels,
    ) -> PodTemplateSpec {
        let metadata = template.metadata.get_or_insert_with(ObjectMeta::default);
        metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.to_map());
        template
    }
}
