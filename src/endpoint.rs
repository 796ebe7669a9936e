//! Endpoint resolution for a created Service
//!
//! ClusterIP and NodePort both resolve to the cluster-internal address: from
//! inside the cluster either is reachable there. NodePort reachability from
//! outside the cluster (node address plus node port) is not computed.

use std::thread;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::Service;

use crate::cluster::ClusterApi;
use crate::config::ExposureMode;
use crate::handle::ResourceRef;
use crate::{Error, Result};

/// Resolves the URL callers use to reach a prediction service
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    timeout: Duration,
    poll_interval: Duration,
}

impl EndpointResolver {
    /// `timeout` bounds the wait for a load balancer address
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn resolve(
        &self,
        cluster: &dyn ClusterApi,
        service: &Service,
        target: &ResourceRef,
        mode: ExposureMode,
    ) -> Result<String> {
        match mode {
            ExposureMode::LoadBalancer => self.wait_for_external(cluster, service, target),
            ExposureMode::ClusterIP | ExposureMode::NodePort => internal_url(service, target),
        }
    }

    /// Poll the Service until the platform assigns an ingress address
    fn wait_for_external(
        &self,
        cluster: &dyn ClusterApi,
        created: &Service,
        target: &ResourceRef,
    ) -> Result<String> {
        let deadline = Instant::now() + self.timeout;

        if let Some(url) = external_url(created) {
            return Ok(url);
        }

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::EndpointUnresolved {
                    service: target.to_string(),
                    reason: format!(
                        "no load balancer address assigned within {:?}",
                        self.timeout
                    ),
                });
            }
            thread::sleep(self.poll_interval.min(deadline - now));

            match cluster.get_service(&target.namespace, &target.name) {
                Ok(service) => {
                    if let Some(url) = external_url(&service) {
                        tracing::info!(service = %target, url = %url, "Load balancer address assigned");
                        return Ok(url);
                    }
                    tracing::debug!(service = %target, "Waiting for load balancer address");
                }
                Err(e) => {
                    tracing::warn!(service = %target, error = %e, "Failed to read service status");
                }
            }
        }
    }
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(5))
    }
}

fn first_port(service: &Service) -> Option<i32> {
    service
        .spec
        .as_ref()?
        .ports
        .as_ref()?
        .first()
        .map(|p| p.port)
}

/// `http://{clusterIP}:{first port}`
pub fn internal_url(service: &Service, target: &ResourceRef) -> Result<String> {
    let unresolved = |reason: &str| Error::EndpointUnresolved {
        service: target.to_string(),
        reason: reason.to_string(),
    };

    let cluster_ip = service
        .spec
        .as_ref()
        .and_then(|s| s.cluster_ip.as_deref())
        .filter(|ip| !ip.is_empty() && *ip != "None")
        .ok_or_else(|| unresolved("service has no cluster IP"))?;
    let port = first_port(service).ok_or_else(|| unresolved("service exposes no ports"))?;

    Ok(format!("http://{}:{}", cluster_ip, port))
}

/// `http://{ingress}:{first port}` once a load balancer address exists
pub fn external_url(service: &Service) -> Option<String> {
    let ingress = service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?;
    let host = ingress
        .ip
        .as_deref()
        .or(ingress.hostname.as_deref())
        .filter(|h| !h.is_empty())?;
    let port = first_port(service)?;
    Some(format!("http://{}:{}", host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterApi;
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress, LoadBalancerStatus, ServicePort, ServiceSpec, ServiceStatus,
    };

    fn service(cluster_ip: Option<&str>, ingress: Option<LoadBalancerIngress>) -> Service {
        Service {
            spec: Some(ServiceSpec {
                cluster_ip: cluster_ip.map(str::to_string),
                ports: Some(vec![ServicePort {
                    name: Some("serving".into()),
                    port: 5000,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: ingress.map(|i| ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![i]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn target() -> ResourceRef {
        ResourceRef::new("fairing-service-abc", "models")
    }

    fn fast_resolver() -> EndpointResolver {
        EndpointResolver::new(Duration::from_millis(50), Duration::from_millis(5))
    }

    #[test]
    fn test_internal_modes_use_cluster_ip() {
        let cluster = MockClusterApi::new();
        let svc = service(Some("10.0.0.5"), None);

        for mode in [ExposureMode::ClusterIP, ExposureMode::NodePort] {
            let url = fast_resolver().resolve(&cluster, &svc, &target(), mode).unwrap();
            assert_eq!(url, "http://10.0.0.5:5000");
        }
    }

    #[test]
    fn test_missing_cluster_ip() {
        let cluster = MockClusterApi::new();
        for ip in [None, Some("None"), Some("")] {
            let result =
                fast_resolver().resolve(&cluster, &service(ip, None), &target(), ExposureMode::ClusterIP);
            assert!(matches!(result.unwrap_err(), Error::EndpointUnresolved { .. }));
        }
    }

    #[test]
    fn test_load_balancer_already_assigned() {
        let mut cluster = MockClusterApi::new();
        cluster.expect_get_service().never();

        let ingress = LoadBalancerIngress {
            ip: Some("34.1.2.3".into()),
            ..Default::default()
        };
        let svc = service(Some("10.0.0.5"), Some(ingress));
        let url = fast_resolver()
            .resolve(&cluster, &svc, &target(), ExposureMode::LoadBalancer)
            .unwrap();
        assert_eq!(url, "http://34.1.2.3:5000");
    }

    #[test]
    fn test_load_balancer_polls_until_assigned() {
        let mut cluster = MockClusterApi::new();
        let mut calls = 0;
        cluster.expect_get_service().returning(move |_, _| {
            calls += 1;
            let ingress = (calls >= 3).then(|| LoadBalancerIngress {
                hostname: Some("lb.example.com".into()),
                ..Default::default()
            });
            Ok(service(Some("10.0.0.5"), ingress))
        });

        let resolver = EndpointResolver::new(Duration::from_secs(5), Duration::from_millis(1));
        let url = resolver
            .resolve(&cluster, &service(Some("10.0.0.5"), None), &target(), ExposureMode::LoadBalancer)
            .unwrap();
        assert_eq!(url, "http://lb.example.com:5000");
    }

    #[test]
    fn test_load_balancer_times_out() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_service()
            .returning(|_, _| Ok(service(Some("10.0.0.5"), None)));

        let start = Instant::now();
        let result = fast_resolver().resolve(
            &cluster,
            &service(Some("10.0.0.5"), None),
            &target(),
            ExposureMode::LoadBalancer,
        );

        assert!(matches!(result.unwrap_err(), Error::EndpointUnresolved { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_load_balancer_tolerates_read_errors() {
        let mut cluster = MockClusterApi::new();
        cluster
            .expect_get_service()
            .returning(|_, _| Err(Error::Cluster("connection reset".into())));

        let result = fast_resolver().resolve(
            &cluster,
            &service(Some("10.0.0.5"), None),
            &target(),
            ExposureMode::LoadBalancer,
        );
        assert!(matches!(result.unwrap_err(), Error::EndpointUnresolved { .. }));
    }
}
