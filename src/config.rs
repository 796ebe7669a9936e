//! Serving configuration with builder pattern

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::labels::RESERVED_KEYS;

/// Default container entrypoint that hosts the model class
pub const DEFAULT_SERVE_ENTRYPOINT: &str = "seldon-core-microservice";

/// Default `generateName` prefix for the Deployment
pub const DEFAULT_DEPLOYMENT_PREFIX: &str = "fairing-deployer-";

/// Default `generateName` prefix for the Service
pub const DEFAULT_SERVICE_PREFIX: &str = "fairing-service-";

/// How the Service fronting the model pods is exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExposureMode {
    ClusterIP,
    #[default]
    NodePort,
    LoadBalancer,
}

impl ExposureMode {
    /// The Kubernetes `spec.type` value for this mode
    pub fn as_service_type(&self) -> &'static str {
        match self {
            ExposureMode::ClusterIP => "ClusterIP",
            ExposureMode::NodePort => "NodePort",
            ExposureMode::LoadBalancer => "LoadBalancer",
        }
    }
}

impl fmt::Display for ExposureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_service_type())
    }
}

impl FromStr for ExposureMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "clusterip" => Ok(ExposureMode::ClusterIP),
            "nodeport" => Ok(ExposureMode::NodePort),
            "loadbalancer" => Ok(ExposureMode::LoadBalancer),
            other => Err(crate::Error::Config(format!("unknown exposure mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServingConfig {
    pub namespace: String,
    pub exposure_mode: ExposureMode,
    pub labels: BTreeMap<String, String>,
    pub serve_entrypoint: String,
    pub deployment_prefix: String,
    pub service_prefix: String,
    #[serde(with = "duration_secs")]
    pub load_balancer_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    pub rollback_on_failure: bool,
    pub log_manifests: bool,
    /// Deleted or failed deployments whose state is still reported
    pub retained_finished: usize,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            exposure_mode: ExposureMode::default(),
            labels: BTreeMap::new(),
            serve_entrypoint: DEFAULT_SERVE_ENTRYPOINT.to_string(),
            deployment_prefix: DEFAULT_DEPLOYMENT_PREFIX.to_string(),
            service_prefix: DEFAULT_SERVICE_PREFIX.to_string(),
            load_balancer_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
            rollback_on_failure: true,
            log_manifests: false,
            retained_finished: 256,
        }
    }
}

impl ServingConfig {
    pub fn builder() -> ServingConfigBuilder {
        ServingConfigBuilder::default()
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.namespace.is_empty() {
            return Err(crate::Error::Config("namespace cannot be empty".into()));
        }
        if self.serve_entrypoint.is_empty() {
            return Err(crate::Error::Config("serve_entrypoint cannot be empty".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(crate::Error::Config("poll_interval must be non-zero".into()));
        }
        if let Some(key) = self.labels.keys().find(|k| RESERVED_KEYS.contains(&k.as_str())) {
            return Err(crate::Error::Config(format!("label key '{}' is reserved", key)));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ServingConfigBuilder {
    config: ServingConfig,
}

impl ServingConfigBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn exposure_mode(mut self, mode: ExposureMode) -> Self {
        self.config.exposure_mode = mode;
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.labels.insert(key.into(), value.into());
        self
    }

    pub fn serve_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.config.serve_entrypoint = entrypoint.into();
        self
    }

    pub fn deployment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.deployment_prefix = prefix.into();
        self
    }

    pub fn service_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.service_prefix = prefix.into();
        self
    }

    pub fn load_balancer_timeout(mut self, timeout: Duration) -> Self {
        self.config.load_balancer_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn rollback_on_failure(mut self, enabled: bool) -> Self {
        self.config.rollback_on_failure = enabled;
        self
    }

    pub fn log_manifests(mut self, enabled: bool) -> Self {
        self.config.log_manifests = enabled;
        self
    }

    pub fn retained_finished(mut self, count: usize) -> Self {
        self.config.retained_finished = count;
        self
    }

    pub fn build(self) -> ServingConfig {
        self.config
    }

    pub fn build_validated(self) -> crate::Result<ServingConfig> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ServingConfig::builder()
            .namespace("models")
            .exposure_mode(ExposureMode::LoadBalancer)
            .label("team", "pricing")
            .load_balancer_timeout(Duration::from_secs(60))
            .build();

        assert_eq!(config.namespace, "models");
        assert_eq!(config.exposure_mode, ExposureMode::LoadBalancer);
        assert_eq!(config.labels.get("team").map(String::as_str), Some("pricing"));
        assert_eq!(config.load_balancer_timeout, Duration::from_secs(60));
        assert!(config.rollback_on_failure);
    }

    #[test]
    fn test_config_defaults() {
        let config = ServingConfig::default();
        assert_eq!(config.exposure_mode, ExposureMode::NodePort);
        assert_eq!(config.serve_entrypoint, DEFAULT_SERVE_ENTRYPOINT);
        assert_eq!(config.deployment_prefix, "fairing-deployer-");
        assert_eq!(config.service_prefix, "fairing-service-");
        assert_eq!(config.retained_finished, 256);
    }

    #[test]
    fn test_config_validation() {
        let config = ServingConfig::builder().namespace("").build();
        assert!(config.validate().is_err());

        let config = ServingConfig::builder().poll_interval(Duration::ZERO).build();
        assert!(config.validate().is_err());

        let config = ServingConfig::builder().label("deployment-id", "mine").build();
        assert!(config.validate().is_err());

        assert!(ServingConfig::builder().build_validated().is_ok());
    }

    #[test]
    fn test_exposure_mode_parse() {
        assert_eq!("ClusterIP".parse::<ExposureMode>().unwrap(), ExposureMode::ClusterIP);
        assert_eq!("nodeport".parse::<ExposureMode>().unwrap(), ExposureMode::NodePort);
        assert_eq!("LOADBALANCER".parse::<ExposureMode>().unwrap(), ExposureMode::LoadBalancer);
        assert!("ExternalName".parse::<ExposureMode>().is_err());
        assert_eq!(ExposureMode::NodePort.to_string(), "NodePort");
    }

    #[test]
    fn test_config_serialization() {
        let config = ServingConfig::builder()
            .namespace("models")
            .poll_interval(Duration::from_millis(500))
            .build();

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: ServingConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.namespace, "models");
        assert_eq!(deserialized.poll_interval, Duration::from_millis(500));
    }
}
