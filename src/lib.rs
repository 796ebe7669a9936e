//! Kubernetes model serving
//!
//! Deploys a trained model as a prediction service: a Deployment running the
//! serving container plus a Service in front of it, tied together by a
//! per-deploy correlation label set. Deletion removes both resources
//! independently and reports each outcome.
//!
//! # Example
//!
//! ```no_run
//! use kube_serving::{ContainerTemplate, KubeClusterApi, PodTemplateFactory, ServingConfig, ServingOrchestrator};
//!
//! let cluster = KubeClusterApi::try_default()?;
//! let config = ServingConfig::builder().namespace("models").build_validated()?;
//! let orchestrator = ServingOrchestrator::new(cluster, config)?;
//!
//! let template = ContainerTemplate::new("registry.local/housing:1").pod_template();
//! let (handle, url) = orchestrator.deploy_default(template, "HousingServe")?;
//! println!("serving at {}", url);
//!
//! let report = orchestrator.delete(&handle);
//! assert!(report.is_success());
//! # Ok::<(), kube_serving::Error>(())
//! ```

pub mod cluster;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod handle;
pub mod job;
pub mod labels;
pub mod orchestrator;
pub mod predict;
pub mod resources;

pub use cluster::{ClusterApi, KubeClusterApi};
pub use config::{ExposureMode, ServingConfig};
pub use endpoint::EndpointResolver;
pub use error::{Error, Result};
pub use handle::{DeployedHandle, ResourceRef};
pub use job::{ContainerTemplate, JobLifecycle, PodTemplateFactory};
pub use labels::CorrelationLabels;
pub use orchestrator::{DeleteOutcome, DeleteReport, DeleteStatus, DeploymentState, ServingOrchestrator};
pub use predict::{PredictionClient, PredictionRequest, Tensor};
pub use resources::ResourceSpecBuilder;
