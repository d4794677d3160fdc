// Re-export dependencies used in public interfaces of common types

use std::fmt::Display;
use std::str::FromStr;

pub use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpgraderError {
    #[error("malformed image reference {0:?}: expected label:tag")]
    MalformedReference(String),

    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("engine API error: {0}")]
    Engine(String),

    #[error("replace transition left partial state: {0}")]
    TransitionPartial(String),

    #[error("configuration error: {0}")]
    Config(String),
}

// Define the primary Result type for upgrader operations
pub type Result<T> = std::result::Result<T, UpgraderError>;

/// A parsed `label:tag` image identifier as reported by the engine.
///
/// Reconciliation equality is `(label, tag)` only; `id` is the engine's
/// content identifier and is carried for logging, never compared. Two images
/// with the same `label:tag` but different digests are considered equal here,
/// which means a re-pushed tag does not trigger a replace.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub label: String,
    pub tag: String,
    pub id: String,
}

impl ImageReference {
    /// Splits `raw` on the first `:`. Both sides must be non-empty.
    pub fn parse(raw: &str, id: impl Into<String>) -> Result<Self> {
        let (label, tag) = raw
            .split_once(':')
            .ok_or_else(|| UpgraderError::MalformedReference(raw.to_string()))?;
        if label.is_empty() || tag.is_empty() {
            return Err(UpgraderError::MalformedReference(raw.to_string()));
        }
        Ok(Self {
            label: label.to_string(),
            tag: tag.to_string(),
            id: id.into(),
        })
    }

    /// The `label:tag` form used for engine calls and tracker comparison.
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.label, self.tag)
    }
}

// Equality ignores `id` on purpose, see the type docs.
impl PartialEq for ImageReference {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && self.tag == other.tag
    }
}

impl Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.label, self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = UpgraderError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, String::new())
    }
}

/// The controller's belief about the single container instance it manages.
///
/// At most one is tracked at any time. It is only ever replaced whole; the
/// window between tearing down an old instance and creating its successor has
/// no tracked instance at all, and that is a valid state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedInstance {
    pub id: String,
    pub name: String,
    /// `label:tag` form of the image this instance was created from.
    pub image_reference: String,
    pub is_running: bool,
}

impl ManagedInstance {
    pub fn runs_image(&self, reference: &ImageReference) -> bool {
        self.image_reference == reference.qualified()
    }
}

impl Display for ManagedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ManagedInstance(id: {}, name: {}, image: {}, running: {})",
            self.id, self.name, self.image_reference, self.is_running
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_label_and_tag() {
        let reference = ImageReference::parse("svc:v2", "sha256:abc").unwrap();
        assert_eq!(reference.label, "svc");
        assert_eq!(reference.tag, "v2");
        assert_eq!(reference.id, "sha256:abc");
        assert_eq!(reference.qualified(), "svc:v2");
    }

    #[test]
    fn parse_rejects_missing_tag() {
        for raw in ["svc", ":v1", "svc:", ":"] {
            let err = ImageReference::parse(raw, "").unwrap_err();
            assert!(matches!(err, UpgraderError::MalformedReference(_)), "{raw}");
        }
    }

    #[test]
    fn parse_splits_on_first_colon() {
        // registry-style references keep everything after the first colon
        let reference = ImageReference::parse("svc:v1.2:beta", "").unwrap();
        assert_eq!(reference.label, "svc");
        assert_eq!(reference.tag, "v1.2:beta");
    }

    #[test]
    fn equality_ignores_id() {
        let a = ImageReference::parse("svc:v1", "sha256:aaa").unwrap();
        let b = ImageReference::parse("svc:v1", "sha256:bbb").unwrap();
        let c = ImageReference::parse("svc:v2", "sha256:aaa").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn instance_image_comparison() {
        let instance = ManagedInstance {
            id: "c1".to_string(),
            name: "svc".to_string(),
            image_reference: "svc:v1".to_string(),
            is_running: true,
        };
        let v1: ImageReference = "svc:v1".parse().unwrap();
        let v2: ImageReference = "svc:v2".parse().unwrap();
        assert!(instance.runs_image(&v1));
        assert!(!instance.runs_image(&v2));
    }

    #[test]
    fn reference_serializes() {
        let reference = ImageReference::parse("svc:v1", "sha256:abc").unwrap();
        let json = serde_json::to_string(&reference).unwrap();
        assert!(json.contains("svc"));
        let back: ImageReference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reference);
    }
}
