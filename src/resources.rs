//! Deployment and Service descriptors for a served model

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::config::{ExposureMode, ServingConfig};
use crate::labels::CorrelationLabels;

/// Port the serving container listens on
pub const SERVING_PORT: i32 = 5000;

/// Name of the single Service port
pub const SERVING_PORT_NAME: &str = "serving";

/// Builds the two resources that make up a prediction service
#[derive(Debug, Clone)]
pub struct ResourceSpecBuilder {
    serve_entrypoint: String,
    deployment_prefix: String,
    service_prefix: String,
}

impl ResourceSpecBuilder {
    pub fn new(
        serve_entrypoint: impl Into<String>,
        deployment_prefix: impl Into<String>,
        service_prefix: impl Into<String>,
    ) -> Self {
        Self {
            serve_entrypoint: serve_entrypoint.into(),
            deployment_prefix: deployment_prefix.into(),
            service_prefix: service_prefix.into(),
        }
    }

    pub fn from_config(config: &ServingConfig) -> Self {
        Self::new(
            &config.serve_entrypoint,
            &config.deployment_prefix,
            &config.service_prefix,
        )
    }

    /// Container command that launches `serving_class` over REST
    pub fn serving_command(&self, serving_class: &str) -> Vec<String> {
        vec![
            self.serve_entrypoint.clone(),
            serving_class.to_string(),
            "REST".to_string(),
            "--service-type=MODEL".to_string(),
            "--persistence=0".to_string(),
        ]
    }

    /// Deployment running `pod_template` with its first container's command
    /// replaced by the serving invocation.
    pub fn build_compute_spec(
        &self,
        mut pod_template: PodTemplateSpec,
        labels: &CorrelationLabels,
        serving_class: &str,
    ) -> Deployment {
        let command = self.serving_command(serving_class);
        let pod_spec = pod_template.spec.get_or_insert_with(PodSpec::default);
        match pod_spec.containers.first_mut() {
            Some(container) => container.command = Some(command),
            None => pod_spec.containers.push(Container {
                name: "model".to_string(),
                command: Some(command),
                ..Default::default()
            }),
        }

        Deployment {
            metadata: ObjectMeta {
                generate_name: Some(self.deployment_prefix.clone()),
                labels: Some(labels.to_map()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(labels.to_map()),
                    ..Default::default()
                },
                template: pod_template,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Service selecting the pods labelled with `labels`
    pub fn build_network_spec(&self, labels: &CorrelationLabels, mode: ExposureMode) -> Service {
        Service {
            metadata: ObjectMeta {
                generate_name: Some(self.service_prefix.clone()),
                labels: Some(labels.to_map()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(labels.to_map()),
                ports: Some(vec![ServicePort {
                    name: Some(SERVING_PORT_NAME.to_string()),
                    port: SERVING_PORT,
                    ..Default::default()
                }]),
                type_: Some(mode.as_service_type().to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl Default for ResourceSpecBuilder {
    fn default() -> Self {
        Self::from_config(&ServingConfig::default())
    }
}
