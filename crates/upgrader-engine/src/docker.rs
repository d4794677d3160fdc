//! Docker-backed [`ContainerEngine`] implementation over bollard.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::ListImagesOptions;
use bollard::models::{ContainerSummary, HostConfig, ImageSummary, PortBinding};
use bollard::Docker;
use tracing::{info, instrument};

use upgrader_common::Result as CommonResult;

use crate::{
    ContainerEngine, EngineContainerRecord, EngineError, EngineImageRecord, PortPolicy, Result,
};

const CONNECT_TIMEOUT_SECS: u64 = 120;

#[derive(Clone, Debug)]
pub struct DockerEngine {
    client: Docker,
}

impl DockerEngine {
    /// Connect to the engine named by `endpoint`.
    ///
    /// Accepts a unix socket (`unix:///var/run/docker.sock` or a bare
    /// absolute path) or a TCP address (`tcp://host:2375`, `http://...`).
    /// Connection setup is lazy; a bad endpoint surfaces on the first call.
    pub fn connect(endpoint: &str) -> Result<Self> {
        let client = if let Some(path) = endpoint.strip_prefix("unix://") {
            Docker::connect_with_socket(path, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
                .map_err(EngineError::Connect)?
        } else if endpoint.starts_with('/') {
            Docker::connect_with_socket(
                endpoint,
                CONNECT_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            )
            .map_err(EngineError::Connect)?
        } else if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") {
            Docker::connect_with_http(endpoint, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
                .map_err(EngineError::Connect)?
        } else {
            return Err(EngineError::UnsupportedEndpoint(endpoint.to_string()));
        };

        info!(%endpoint, "engine client configured");
        Ok(Self { client })
    }

    fn host_config(ports: &PortPolicy) -> HostConfig {
        let bound = format!("{}/tcp", ports.container_port);
        let bindings = HashMap::from([(
            bound,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(ports.host_port.to_string()),
            }]),
        )]);
        HostConfig {
            port_bindings: Some(bindings),
            publish_all_ports: Some(ports.publish_all),
            ..Default::default()
        }
    }
}

impl From<ImageSummary> for EngineImageRecord {
    fn from(summary: ImageSummary) -> Self {
        Self {
            id: summary.id,
            repo_tags: summary.repo_tags,
        }
    }
}

impl From<ContainerSummary> for EngineContainerRecord {
    fn from(summary: ContainerSummary) -> Self {
        Self {
            id: summary.id.unwrap_or_default(),
            names: summary.names.unwrap_or_default(),
            image: summary.image.unwrap_or_default(),
            is_running: summary.state.as_deref() == Some("running"),
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    #[instrument(skip(self))]
    async fn list_images(&self, filter: &str) -> CommonResult<Vec<EngineImageRecord>> {
        let options = ListImagesOptions::<String> {
            filters: HashMap::from([("reference".to_string(), vec![filter.to_string()])]),
            ..Default::default()
        };
        let images = self
            .client
            .list_images(Some(options))
            .await
            .map_err(EngineError::ListImages)?;
        Ok(images.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> CommonResult<Vec<EngineContainerRecord>> {
        let options = ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        };
        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(EngineError::ListContainers)?;
        Ok(containers.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, ports))]
    async fn create_container(
        &self,
        name: &str,
        image: &str,
        ports: &PortPolicy,
    ) -> CommonResult<String> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };
        let exposed = format!("{}/tcp", ports.container_port);
        let config = Config {
            image: Some(image.to_string()),
            exposed_ports: Some(HashMap::from([(exposed, HashMap::new())])),
            host_config: Some(Self::host_config(ports)),
            ..Default::default()
        };
        let response = self
            .client
            .create_container(Some(options), config)
            .await
            .map_err(EngineError::CreationFailed)?;
        Ok(response.id)
    }

    #[instrument(skip(self))]
    async fn start_container(&self, id: &str) -> CommonResult<()> {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(EngineError::StartFailed)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_container(&self, id: &str) -> CommonResult<()> {
        self.client
            .stop_container(id, None::<StopContainerOptions>)
            .await
            .map_err(EngineError::StopFailed)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, id: &str) -> CommonResult<()> {
        self.client
            .remove_container(id, None::<RemoveContainerOptions>)
            .await
            .map_err(EngineError::RemovalFailed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_rejects_unknown_scheme() {
        let err = DockerEngine::connect("ftp://example:21").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedEndpoint(_)));
    }

    #[test]
    fn connect_accepts_socket_and_tcp_forms() {
        assert!(DockerEngine::connect("unix:///var/run/docker.sock").is_ok());
        assert!(DockerEngine::connect("/var/run/docker.sock").is_ok());
        assert!(DockerEngine::connect("tcp://127.0.0.1:2375").is_ok());
    }

    #[test]
    fn image_record_projection() {
        let summary = ImageSummary {
            id: "sha256:abc".to_string(),
            repo_tags: vec!["svc:v1".to_string(), "svc:latest".to_string()],
            ..Default::default()
        };
        let record = EngineImageRecord::from(summary);
        assert_eq!(record.id, "sha256:abc");
        assert_eq!(record.repo_tags, vec!["svc:v1", "svc:latest"]);
    }

    #[test]
    fn container_record_projection() {
        let summary = ContainerSummary {
            id: Some("c1".to_string()),
            names: Some(vec!["/samplewebapp".to_string()]),
            image: Some("svc:v1".to_string()),
            state: Some("running".to_string()),
            ..Default::default()
        };
        let record = EngineContainerRecord::from(summary);
        assert_eq!(record.id, "c1");
        assert_eq!(record.names, vec!["/samplewebapp"]);
        assert_eq!(record.image, "svc:v1");
        assert!(record.is_running);

        let stopped = EngineContainerRecord::from(ContainerSummary {
            state: Some("exited".to_string()),
            ..Default::default()
        });
        assert!(!stopped.is_running);
    }

    #[test]
    fn host_config_binds_fixed_port_and_publishes_rest() {
        let config = DockerEngine::host_config(&PortPolicy::default());
        let bindings = config.port_bindings.unwrap();
        let bound = bindings.get("80/tcp").unwrap().as_ref().unwrap();
        assert_eq!(bound[0].host_port.as_deref(), Some("80"));
        assert_eq!(config.publish_all_ports, Some(true));
    }
}
