//! Orchestrator for deploying and deleting prediction services

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use parking_lot::RwLock;

use crate::cluster::ClusterApi;
use crate::config::{ExposureMode, ServingConfig};
use crate::endpoint::EndpointResolver;
use crate::handle::{DeployedHandle, ResourceRef};
use crate::job::JobLifecycle;
use crate::resources::ResourceSpecBuilder;
use crate::{Error, Result};

/// Lifecycle state of one deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    NotDeployed,
    Deploying,
    Deployed,
    DeployFailed,
    Deleting,
    Deleted,
}

impl DeploymentState {
    /// No further transition happens without a new deploy call
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentState::Deleted | DeploymentState::DeployFailed)
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentState::NotDeployed => write!(f, "NotDeployed"),
            DeploymentState::Deploying => write!(f, "Deploying"),
            DeploymentState::Deployed => write!(f, "Deployed"),
            DeploymentState::DeployFailed => write!(f, "DeployFailed"),
            DeploymentState::Deleting => write!(f, "Deleting"),
            DeploymentState::Deleted => write!(f, "Deleted"),
        }
    }
}

/// Outcome of deleting one resource
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted,
    Failed(Error),
    /// Not attempted because the handle was already deleted
    Skipped,
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted)
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            DeleteOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Aggregate status of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Success,
    Partial,
    Failure,
}

/// Per-resource result of [`ServingOrchestrator::delete`]
#[derive(Debug)]
pub struct DeleteReport {
    pub network: DeleteOutcome,
    pub compute: DeleteOutcome,
}

impl DeleteReport {
    pub fn status(&self) -> DeleteStatus {
        let failed = [&self.network, &self.compute]
            .iter()
            .filter(|o| matches!(o, DeleteOutcome::Failed(_)))
            .count();
        match failed {
            0 => DeleteStatus::Success,
            1 => DeleteStatus::Partial,
            _ => DeleteStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == DeleteStatus::Success
    }
}

/// Deployment states plus the ids of finished deployments, oldest first
#[derive(Default)]
struct StateTable {
    states: HashMap<String, DeploymentState>,
    finished: VecDeque<String>,
}

impl StateTable {
    fn set(&mut self, deployment_id: &str, state: DeploymentState, retain: usize) {
        self.states.insert(deployment_id.to_string(), state);
        self.finished.retain(|id| id != deployment_id);
        if !state.is_terminal() {
            return;
        }

        self.finished.push_back(deployment_id.to_string());
        while self.finished.len() > retain {
            let Some(oldest) = self.finished.pop_front() else {
                break;
            };
            self.states.remove(&oldest);
        }
    }
}

/// Deploys models as a Deployment plus Service pair and tears them down
pub struct ServingOrchestrator<C: ClusterApi> {
    cluster: C,
    job: JobLifecycle,
    config: ServingConfig,
    builder: ResourceSpecBuilder,
    resolver: EndpointResolver,
    states: Arc<RwLock<StateTable>>,
}

impl<C: ClusterApi> ServingOrchestrator<C> {
    /// Create an orchestrator for the configured namespace
    pub fn new(cluster: C, config: ServingConfig) -> Result<Self> {
        let job = JobLifecycle::serving(&config.namespace);
        Self::with_job(cluster, job, config)
    }

    /// Create an orchestrator around an existing job lifecycle
    pub fn with_job(cluster: C, job: JobLifecycle, config: ServingConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            cluster,
            builder: ResourceSpecBuilder::from_config(&config),
            resolver: EndpointResolver::new(config.load_balancer_timeout, config.poll_interval),
            job,
            config,
            states: Arc::new(RwLock::new(StateTable::default())),
        })
    }

    pub fn config(&self) -> &ServingConfig {
        &self.config
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Get the state of a deployment
    pub fn state(&self, deployment_id: &str) -> DeploymentState {
        self.states
            .read()
            .states
            .get(deployment_id)
            .copied()
            .unwrap_or(DeploymentState::NotDeployed)
    }

    /// Deploy with the configured exposure mode and no extra labels
    pub fn deploy_default(
        &self,
        pod_template: PodTemplateSpec,
        serving_class: &str,
    ) -> Result<(DeployedHandle, String)> {
        self.deploy(
            pod_template,
            serving_class,
            self.config.exposure_mode,
            &BTreeMap::new(),
        )
    }

    /// Create the Deployment and Service for `serving_class` and resolve
    /// the URL they are reachable at.
    pub fn deploy(
        &self,
        pod_template: PodTemplateSpec,
        serving_class: &str,
        exposure_mode: ExposureMode,
        extra_labels: &BTreeMap<String, String>,
    ) -> Result<(DeployedHandle, String)> {
        let labels = self.job.correlation_labels(&self.config.labels, extra_labels);
        let deployment_id = labels.deployment_id().to_string();
        let namespace = self.job.namespace();

        let pod_template = self.job.annotate_pod_template(pod_template, &labels);
        let deployment_spec = self.builder.build_compute_spec(pod_template, &labels, serving_class);
        let service_spec = self.builder.build_network_spec(&labels, exposure_mode);

        if self.config.log_manifests {
            let deployment_json = serde_json::to_string(&deployment_spec)?;
            let service_json = serde_json::to_string(&service_spec)?;
            tracing::info!(deployment_id = %deployment_id, manifest = %deployment_json, "Deployment manifest");
            tracing::info!(deployment_id = %deployment_id, manifest = %service_json, "Service manifest");
        }

        self.set_state(&deployment_id, DeploymentState::Deploying);

        tracing::info!(
            deployment_id = %deployment_id,
            namespace = %namespace,
            serving_class = %serving_class,
            exposure = %exposure_mode,
            "Deploying prediction service"
        );

        let deployment = match self.cluster.create_deployment(namespace, &deployment_spec) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(deployment_id = %deployment_id, error = %e, "Failed to create deployment");
                self.set_state(&deployment_id, DeploymentState::DeployFailed);
                return Err(e);
            }
        };
        let compute = match ResourceRef::from_created(&deployment, namespace) {
            Ok(r) => r,
            Err(e) => {
                self.set_state(&deployment_id, DeploymentState::DeployFailed);
                return Err(e);
            }
        };
        tracing::info!(deployment_id = %deployment_id, deployment = %compute, "Deployment created");

        let service = match self.cluster.create_service(namespace, &service_spec) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(deployment_id = %deployment_id, error = %e, "Failed to create service");
                self.rollback(&deployment_id, &compute);
                self.set_state(&deployment_id, DeploymentState::DeployFailed);
                return Err(e);
            }
        };
        let network = match ResourceRef::from_created(&service, namespace) {
            Ok(r) => r,
            Err(e) => {
                self.rollback(&deployment_id, &compute);
                self.set_state(&deployment_id, DeploymentState::DeployFailed);
                return Err(e);
            }
        };
        tracing::info!(deployment_id = %deployment_id, service = %network, "Service created");

        let handle = DeployedHandle {
            deployment_id: deployment_id.clone(),
            compute,
            network,
        };

        let url = match self
            .resolver
            .resolve(&self.cluster, &service, &handle.network, exposure_mode)
        {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(deployment_id = %deployment_id, error = %e, "Failed to resolve endpoint");
                self.set_state(&deployment_id, DeploymentState::DeployFailed);
                return Err(Error::EndpointResolution {
                    handle: Box::new(handle),
                    source: Box::new(e),
                });
            }
        };

        self.set_state(&deployment_id, DeploymentState::Deployed);
        tracing::info!(deployment_id = %deployment_id, url = %url, "Prediction endpoint ready");

        Ok((handle, url))
    }

    /// Delete the Service and the Deployment behind `handle`.
    ///
    /// Each deletion is attempted regardless of the other's outcome. A
    /// resource the API server reports as not found counts as deleted, so
    /// retrying after a partial delete converges.
    pub fn delete(&self, handle: &DeployedHandle) -> DeleteReport {
        let id = &handle.deployment_id;

        if self.state(id) == DeploymentState::Deleted {
            tracing::warn!(deployment_id = %id, "Deployment already deleted, skipping");
            return DeleteReport {
                network: DeleteOutcome::Skipped,
                compute: DeleteOutcome::Skipped,
            };
        }

        self.set_state(id, DeploymentState::Deleting);

        let network = deletion_outcome(
            id,
            "service",
            &handle.network,
            self.cluster
                .delete_service(&handle.network.namespace, &handle.network.name),
        );
        let compute = deletion_outcome(
            id,
            "deployment",
            &handle.compute,
            self.cluster
                .delete_deployment(&handle.compute.namespace, &handle.compute.name),
        );

        let report = DeleteReport { network, compute };
        // A partial delete stays in Deleting so the caller can retry
        if report.is_success() {
            self.set_state(id, DeploymentState::Deleted);
        }
        report
    }

    /// IDs of deployments whose resources may still exist
    pub fn tracked(&self) -> Vec<String> {
        self.states
            .read()
            .states
            .iter()
            .filter(|(_, s)| matches!(s, DeploymentState::Deployed | DeploymentState::Deleting))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Best-effort removal of a Deployment whose Service never came up
    fn rollback(&self, deployment_id: &str, compute: &ResourceRef) {
        if !self.config.rollback_on_failure {
            tracing::warn!(deployment_id = %deployment_id, deployment = %compute, "Leaving orphaned deployment");
            return;
        }

        match self.cluster.delete_deployment(&compute.namespace, &compute.name) {
            Ok(()) => {
                tracing::info!(deployment_id = %deployment_id, deployment = %compute, "Rolled back deployment")
            }
            Err(e) => {
                tracing::error!(deployment_id = %deployment_id, deployment = %compute, error = %e, "Failed to roll back deployment")
            }
        }
    }

    fn set_state(&self, deployment_id: &str, state: DeploymentState) {
        self.states
            .write()
            .set(deployment_id, state, self.config.retained_finished);
    }
}

fn deletion_outcome(id: &str, kind: &str, target: &ResourceRef, result: Result<()>) -> DeleteOutcome {
    match result {
        Ok(()) => {
            tracing::info!(deployment_id = %id, resource = %target, "Deleted {}", kind);
            DeleteOutcome::Deleted
        }
        Err(e) if e.is_not_found() => {
            tracing::info!(deployment_id = %id, resource = %target, "{} already gone", kind);
            DeleteOutcome::Deleted
        }
        Err(e) => {
            tracing::error!(deployment_id = %id, resource = %target, error = %e, "Not able to delete {}", kind);
            DeleteOutcome::Failed(e)
        }
    }
}
