//! Narrow, typed adapter over the container engine.
//!
//! The reconciler never touches the engine library's own response shapes;
//! everything crosses this boundary as the small record types below, so the
//! control loop can be driven by a mock in tests and is insulated from
//! engine client API churn.

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use upgrader_common::{Result as CommonResult, UpgraderError};

mod docker;

pub use docker::DockerEngine;

// --- Custom Error Type ---
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unsupported engine endpoint {0:?}")]
    UnsupportedEndpoint(String),
    #[error("engine connection setup failed: {0}")]
    Connect(#[source] BollardError),
    #[error("image listing failed: {0}")]
    ListImages(#[source] BollardError),
    #[error("container listing failed: {0}")]
    ListContainers(#[source] BollardError),
    #[error("container creation failed: {0}")]
    CreationFailed(#[source] BollardError),
    #[error("container start failed: {0}")]
    StartFailed(#[source] BollardError),
    #[error("container stop failed: {0}")]
    StopFailed(#[source] BollardError),
    #[error("container removal failed: {0}")]
    RemovalFailed(#[source] BollardError),
}

impl EngineError {
    fn source_error(&self) -> Option<&BollardError> {
        match self {
            Self::UnsupportedEndpoint(_) => None,
            Self::Connect(e)
            | Self::ListImages(e)
            | Self::ListContainers(e)
            | Self::CreationFailed(e)
            | Self::StartFailed(e)
            | Self::StopFailed(e)
            | Self::RemovalFailed(e) => Some(e),
        }
    }

    /// True when the engine itself answered; false for transport-level
    /// failures (connection refused, timeout, broken socket).
    pub fn is_engine_response(&self) -> bool {
        matches!(
            self.source_error(),
            Some(BollardError::DockerResponseServerError { .. })
        )
    }
}

// Transport failures become EngineUnavailable so the reconciler can back off
// instead of treating them like engine rejections.
impl From<EngineError> for UpgraderError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::UnsupportedEndpoint(_) | EngineError::Connect(_) => {
                UpgraderError::Config(err.to_string())
            }
            _ if err.is_engine_response() => UpgraderError::Engine(err.to_string()),
            _ => UpgraderError::EngineUnavailable(err.to_string()),
        }
    }
}

// Define local Result using the crate's Error type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Read-only projection of one engine-reported image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineImageRecord {
    pub id: String,
    /// `label:tag` strings, in the engine's reported order.
    pub repo_tags: Vec<String>,
}

/// Read-only projection of one engine-reported container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineContainerRecord {
    pub id: String,
    /// Names as reported by the engine, usually with a leading `/`.
    pub names: Vec<String>,
    /// `label:tag` the container was created from.
    pub image: String,
    pub is_running: bool,
}

/// Host port exposure applied to every container this controller creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortPolicy {
    pub container_port: u16,
    pub host_port: u16,
    /// Auto-publish every other port the image declares.
    pub publish_all: bool,
}

impl Default for PortPolicy {
    fn default() -> Self {
        Self {
            container_port: 80,
            host_port: 80,
            publish_all: true,
        }
    }
}

/// The engine operations the reconciler needs, nothing more.
///
/// Implementations report failures through the common error taxonomy so the
/// reconciler can tell an unreachable engine from an engine that said no.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// List images whose reference matches `filter`.
    async fn list_images(&self, filter: &str) -> CommonResult<Vec<EngineImageRecord>>;

    /// List containers, including stopped ones when `include_stopped`.
    async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> CommonResult<Vec<EngineContainerRecord>>;

    /// Create a container from `image` named `name`; returns the engine id.
    async fn create_container(
        &self,
        name: &str,
        image: &str,
        ports: &PortPolicy,
    ) -> CommonResult<String>;

    async fn start_container(&self, id: &str) -> CommonResult<()>;

    /// Graceful stop with the engine's default grace period.
    async fn stop_container(&self, id: &str) -> CommonResult<()>;

    async fn remove_container(&self, id: &str) -> CommonResult<()>;
}
