//! The reconciliation state machine.
//!
//! One cooperative loop: discover any pre-existing instance once, then poll
//! the engine on a fixed cadence, replacing the managed container whenever
//! the first listed image for the service carries a different `label:tag`.
//! All engine access goes through the [`ContainerEngine`] trait so the whole
//! machine runs against a mock in tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use upgrader_common::{ImageReference, ManagedInstance, Result, UpgraderError};
use upgrader_engine::{ContainerEngine, EngineContainerRecord, EngineImageRecord};

use crate::backoff::FibonacciBackoff;
use crate::config::UpgraderConfig;
use crate::tracker::InstanceTracker;

const BACKOFF_MIN_SECS: u64 = 5;
const BACKOFF_MAX_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// Startup: adopt an already-running instance before the first poll.
    Discovering,
    /// Steady state, polling on the configured interval.
    Monitoring,
    /// Mid-replace. Never observable across an await on the loop boundary.
    Upgrading,
}

/// What a single monitoring cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Engine listed no image for the service; not an error.
    NoImageAvailable,
    /// Tracked instance already runs the desired image.
    UpToDate,
    /// No instance was tracked; one was created and started.
    Created,
    /// Old instance(s) torn down and a new one created and started.
    Replaced,
}

enum Action {
    Nothing,
    Create,
    Replace,
}

pub struct Reconciler<E> {
    engine: Arc<E>,
    config: UpgraderConfig,
    tracker: InstanceTracker,
    state: ReconcileState,
    backoff: FibonacciBackoff,
}

impl<E: ContainerEngine> Reconciler<E> {
    pub fn new(engine: Arc<E>, config: UpgraderConfig) -> Self {
        Self {
            engine,
            config,
            tracker: InstanceTracker::new(),
            state: ReconcileState::Discovering,
            backoff: FibonacciBackoff::new(BACKOFF_MIN_SECS, BACKOFF_MAX_SECS),
        }
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn tracked(&self) -> Option<&ManagedInstance> {
        self.tracker.current()
    }

    /// Run until `shutdown` flips to true. The signal is honored before each
    /// cycle and during the inter-cycle delay; a teardown/create sequence
    /// that has already begun always runs to completion first, so a shutdown
    /// can never strand the service with neither old nor new instance.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                info!("shutdown requested, stopping reconciler");
                return Ok(());
            }
            let delay = self.step().await;
            let deadline = Instant::now() + delay;
            loop {
                tokio::select! {
                    _ = sleep_until(deadline) => break,
                    changed = shutdown.changed() => {
                        // A dropped sender means the host is going away too.
                        if changed.is_err() || *shutdown.borrow() {
                            info!("shutdown requested, stopping reconciler");
                            return Ok(());
                        }
                        // Spurious wake; wait out the rest of the delay.
                    }
                }
            }
        }
    }

    /// One turn of the loop; returns the delay before the next turn.
    async fn step(&mut self) -> Duration {
        let result = match self.state {
            ReconcileState::Discovering => self.discover().await,
            _ => self.run_cycle().await.map(|outcome| {
                debug!(?outcome, "cycle complete");
            }),
        };
        match result {
            Ok(()) => {
                self.backoff.reset();
                self.config.poll_interval
            }
            Err(UpgraderError::EngineUnavailable(reason)) => {
                let delay = self.backoff.next_delay();
                warn!(%reason, delay_secs = delay.as_secs(), "engine unavailable, backing off");
                delay
            }
            Err(err) => {
                error!(%err, "reconcile cycle failed");
                self.config.poll_interval
            }
        }
    }

    /// Adopt a pre-existing instance, if any, then enter monitoring. Run
    /// once at startup and again whenever a failed transition leaves the
    /// real container state ambiguous.
    pub async fn discover(&mut self) -> Result<()> {
        let containers = self.engine.list_containers(true).await?;
        if self
            .tracker
            .adopt(&containers, &self.config.service_name)
            .is_none()
        {
            info!(service = %self.config.service_name, "no existing container to adopt");
        }
        self.state = ReconcileState::Monitoring;
        Ok(())
    }

    /// One monitoring cycle: list images, compare, act.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            "checking for new image"
        );
        let images = self.engine.list_images(&self.config.service_name).await?;
        let Some(desired) = self.select_desired_image(&images) else {
            return Ok(CycleOutcome::NoImageAvailable);
        };

        let action = match self.tracker.current() {
            None => Action::Create,
            Some(current) if !current.runs_image(&desired) => Action::Replace,
            Some(_) => Action::Nothing,
        };

        match action {
            Action::Nothing => Ok(CycleOutcome::UpToDate),
            Action::Create => match self.create_instance(&desired).await {
                Ok(()) => Ok(CycleOutcome::Created),
                Err(err) => {
                    self.state = ReconcileState::Discovering;
                    Err(err)
                }
            },
            Action::Replace => {
                info!(image = %desired, "new image found");
                // Listing happens before anything is mutated; an unreachable
                // engine here propagates as-is and the tracked instance,
                // which is still running untouched, stays tracked.
                let containers = self.engine.list_containers(true).await?;
                self.state = ReconcileState::Upgrading;
                match self.try_replace(&desired, &containers).await {
                    Ok(()) => {
                        self.state = ReconcileState::Monitoring;
                        Ok(CycleOutcome::Replaced)
                    }
                    Err(err) => {
                        // Real state is ambiguous now; rediscover it from
                        // the engine instead of trusting the tracker.
                        self.state = ReconcileState::Discovering;
                        Err(err)
                    }
                }
            }
        }
    }

    /// Only the first listing entry is considered; the engine's order is
    /// assumed to surface the canonical image first. Listing order is not a
    /// guarantee engines document, so this selection rule is a known
    /// fragility kept for parity with the existing deployment.
    fn select_desired_image(&self, images: &[EngineImageRecord]) -> Option<ImageReference> {
        let record = images.first()?;
        let Some(raw) = record.repo_tags.first() else {
            warn!(id = %record.id, "image reports no repo tags, skipping");
            return None;
        };
        match ImageReference::parse(raw, record.id.clone()) {
            Ok(reference) => Some(reference),
            Err(err) => {
                warn!(%err, "skipping image with malformed reference");
                None
            }
        }
    }

    async fn try_replace(
        &mut self,
        desired: &ImageReference,
        containers: &[EngineContainerRecord],
    ) -> Result<()> {
        let Some(old) = self.tracker.current().cloned() else {
            return self.create_instance(desired).await;
        };
        if let Err(err) = self.teardown(&old, containers).await {
            // A stop/remove was issued, so the old instance can no longer be
            // trusted to exist.
            self.tracker.clear();
            return Err(UpgraderError::TransitionPartial(format!(
                "teardown of {} did not complete: {err}",
                old.image_reference
            )));
        }
        // No tracked instance between here and a successful start.
        self.tracker.clear();
        self.create_instance(desired).await
    }

    /// Stop and remove every listed container running the old image.
    /// Deliberately a multi-match sweep rather than keyed off the tracked
    /// id, so stale leftovers from earlier incomplete replacements are
    /// cleaned up too.
    async fn teardown(
        &mut self,
        old: &ManagedInstance,
        containers: &[EngineContainerRecord],
    ) -> Result<()> {
        for record in containers.iter().filter(|c| c.image == old.image_reference) {
            info!(image = %record.image, id = %record.id, "old container is being stopped");
            self.engine.stop_container(&record.id).await?;
            info!(image = %record.image, id = %record.id, "old container is being removed");
            self.engine.remove_container(&record.id).await?;
        }
        Ok(())
    }

    /// Create and start a container for `desired`, named after its label,
    /// then update the tracker. Host port binding comes from the configured
    /// port policy.
    async fn create_instance(&mut self, desired: &ImageReference) -> Result<()> {
        let image = desired.qualified();
        info!(%image, "new container is being created");
        let id = self
            .engine
            .create_container(&desired.label, &image, &self.config.port_policy)
            .await?;

        info!(%image, %id, "new container is being started");
        if let Err(err) = self.engine.start_container(&id).await {
            // The tracker must never point at an instance that is not
            // running; the next discovery re-derives state from the engine.
            return Err(UpgraderError::TransitionPartial(format!(
                "container {id} created but not started: {err}"
            )));
        }

        self.tracker.replace(ManagedInstance {
            id,
            name: desired.label.clone(),
            image_reference: image,
            is_running: true,
        });

        // Observability only; no decision is made on this listing.
        match self.engine.list_containers(true).await {
            Ok(containers) => {
                for record in &containers {
                    debug!(image = %record.image, running = record.is_running,
                        "container present after create");
                }
            }
            Err(err) => warn!(%err, "post-create container listing failed"),
        }
        Ok(())
    }
}
