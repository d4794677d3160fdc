//! Runtime configuration, read from the environment at startup.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use upgrader_common::{Result, UpgraderError};
use upgrader_engine::PortPolicy;

/// Environment variable naming the engine endpoint. Absence is fatal.
pub const DOCKER_HOST_VAR: &str = "DOCKER_HOST";

/// Optional override for the managed service name.
pub const SERVICE_VAR: &str = "UPGRADER_SERVICE";

/// Logical service this controller manages when no override is given.
pub const DEFAULT_SERVICE_NAME: &str = "samplewebapp";

const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgraderConfig {
    /// Engine endpoint: unix socket path or tcp address.
    pub docker_host: String,
    /// Image filter and expected container name, both keyed off this.
    pub service_name: String,
    pub poll_interval: Duration,
    pub port_policy: PortPolicy,
}

impl UpgraderConfig {
    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let docker_host = env::var(DOCKER_HOST_VAR).map_err(|_| {
            UpgraderError::Config(format!("{DOCKER_HOST_VAR} must name the engine endpoint"))
        })?;
        let service_name =
            env::var(SERVICE_VAR).unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());
        Ok(Self {
            docker_host,
            service_name,
            poll_interval: POLL_INTERVAL,
            port_policy: PortPolicy::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_requires_docker_host() {
        std::env::remove_var(DOCKER_HOST_VAR);
        std::env::remove_var(SERVICE_VAR);
        let err = UpgraderConfig::from_env().unwrap_err();
        assert!(matches!(err, UpgraderError::Config(_)));
    }

    #[test]
    #[serial]
    fn from_env_defaults_service_name() {
        std::env::set_var(DOCKER_HOST_VAR, "unix:///var/run/docker.sock");
        std::env::remove_var(SERVICE_VAR);
        let config = UpgraderConfig::from_env().unwrap();
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.port_policy, PortPolicy::default());
        std::env::remove_var(DOCKER_HOST_VAR);
    }

    #[test]
    #[serial]
    fn from_env_honors_service_override() {
        std::env::set_var(DOCKER_HOST_VAR, "tcp://127.0.0.1:2375");
        std::env::set_var(SERVICE_VAR, "otherapp");
        let config = UpgraderConfig::from_env().unwrap();
        assert_eq!(config.service_name, "otherapp");
        std::env::remove_var(DOCKER_HOST_VAR);
        std::env::remove_var(SERVICE_VAR);
    }
}
