//! Reconciliation core: tracks the managed instance and drives the
//! image-upgrade replace transition against a [`ContainerEngine`].

pub mod backoff;
pub mod config;
pub mod reconciler;
pub mod tracker;

pub use config::UpgraderConfig;
pub use reconciler::{CycleOutcome, ReconcileState, Reconciler};
pub use tracker::InstanceTracker;

pub use upgrader_engine::ContainerEngine;
