//! In-memory cluster used by the integration tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Service, ServiceStatus};
use kube::core::ErrorResponse;
use kube_serving::{ClusterApi, Error, Result};
use parking_lot::Mutex;

#[derive(Default)]
pub struct FakeCluster {
    pub deployments: Mutex<HashMap<(String, String), Deployment>>,
    pub services: Mutex<HashMap<(String, String), Service>>,
    /// Calls in the order they were made, e.g. `create_deployment models/x`
    pub calls: Mutex<Vec<String>>,
    pub fail_create_service: bool,
    pub fail_delete_service: bool,
    pub fail_delete_deployment: bool,
    /// Refuse the next Service delete only
    pub fail_delete_service_once: AtomicBool,
    /// Ingress hostname reported after this many `get_service` reads
    pub ingress_after_reads: Option<usize>,
    pub reads: AtomicUsize,
    pub counter: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_suffix(&self) -> String {
        format!("{:05}", self.counter.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

/// 404 as the API server reports it for a missing object
fn not_found(kind: &str, name: &str) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} \"{}\" not found", kind, name),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

impl ClusterApi for FakeCluster {
    fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment> {
        let mut created = deployment.clone();
        let prefix = created.metadata.generate_name.clone().unwrap_or_default();
        let name = format!("{}{}", prefix, self.next_suffix());
        created.metadata.name = Some(name.clone());
        created.metadata.namespace = Some(namespace.to_string());

        self.record(format!("create_deployment {}/{}", namespace, name));
        self.deployments
            .lock()
            .insert((namespace.to_string(), name), created.clone());
        Ok(created)
    }

    fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(format!("delete_deployment {}/{}", namespace, name));
        if self.fail_delete_deployment {
            return Err(Error::Cluster("deployment delete refused".into()));
        }
        self.deployments
            .lock()
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("deployments.apps", name))
    }

    fn create_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        if self.fail_create_service {
            self.record(format!("create_service {} failed", namespace));
            return Err(Error::Cluster("service quota exceeded".into()));
        }

        let mut created = service.clone();
        let prefix = created.metadata.generate_name.clone().unwrap_or_default();
        let name = format!("{}{}", prefix, self.next_suffix());
        created.metadata.name = Some(name.clone());
        created.metadata.namespace = Some(namespace.to_string());
        if let Some(spec) = created.spec.as_mut() {
            spec.cluster_ip = Some("10.0.0.5".to_string());
        }

        self.record(format!("create_service {}/{}", namespace, name));
        self.services
            .lock()
            .insert((namespace.to_string(), name), created.clone());
        Ok(created)
    }

    fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(format!("delete_service {}/{}", namespace, name));
        if self.fail_delete_service || self.fail_delete_service_once.swap(false, Ordering::SeqCst) {
            return Err(Error::Cluster("service delete refused".into()));
        }
        self.services
            .lock()
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("services", name))
    }

    fn get_service(&self, namespace: &str, name: &str) -> Result<Service> {
        let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        let mut service = self
            .services
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("services", name))?;

        if matches!(self.ingress_after_reads, Some(n) if reads >= n) {
            service.status = Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![LoadBalancerIngress {
                        ip: Some("34.120.0.7".to_string()),
                        ..Default::default()
                    }]),
                }),
                ..Default::default()
            });
        }
        Ok(service)
    }
}
