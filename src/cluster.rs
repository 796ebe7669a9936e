//! Cluster API boundary
//!
//! The orchestrator talks to Kubernetes only through [`ClusterApi`], a small
//! synchronous trait covering the calls the serving lifecycle needs. The
//! default implementation, [`KubeClusterApi`], is backed by the [`kube`]
//! crate and uses the ambient configuration (in-cluster or `~/.kube/config`).

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use tokio::runtime::Runtime;

use crate::Result;

/// Kubernetes operations used to deploy and tear down a prediction service.
///
/// Each call is one blocking round trip to the API server.
#[cfg_attr(test, mockall::automock)]
pub trait ClusterApi: Send + Sync {
    /// Creates a Deployment and returns the object as stored by the server.
    fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment>;

    /// Deletes a Deployment with foreground propagation.
    fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()>;

    /// Creates a Service and returns the object as stored by the server.
    fn create_service(&self, namespace: &str, service: &Service) -> Result<Service>;

    /// Deletes a Service.
    fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    /// Reads the current state of a Service, including its load balancer status.
    fn get_service(&self, namespace: &str, name: &str) -> Result<Service>;
}

/// [`ClusterApi`] backed by a [`kube::Client`] driven on a private runtime
pub struct KubeClusterApi {
    client: Client,
    runtime: Runtime,
}

impl KubeClusterApi {
    /// Connect using the inferred kubeconfig or in-cluster service account
    pub fn try_default() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let client = runtime.block_on(Client::try_default())?;
        Ok(Self { client, runtime })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { client, runtime })
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl ClusterApi for KubeClusterApi {
    fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment> {
        let api = self.deployments(namespace);
        let created = self
            .runtime
            .block_on(api.create(&PostParams::default(), deployment))?;
        Ok(created)
    }

    fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()> {
        let api = self.deployments(namespace);
        self.runtime
            .block_on(api.delete(name, &DeleteParams::foreground()))?;
        Ok(())
    }

    fn create_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        let api = self.services(namespace);
        let created = self
            .runtime
            .block_on(api.create(&PostParams::default(), service))?;
        Ok(created)
    }

    fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        let api = self.services(namespace);
        self.runtime
            .block_on(api.delete(name, &DeleteParams::default()))?;
        Ok(())
    }

    fn get_service(&self, namespace: &str, name: &str) -> Result<Service> {
        let api = self.services(namespace);
        Ok(self.runtime.block_on(api.get(name))?)
    }
}
