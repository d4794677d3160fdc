//! Tracks the single container instance this controller believes it owns.

use tracing::info;
use upgrader_common::ManagedInstance;
use upgrader_engine::EngineContainerRecord;

/// Owned by the reconciler; holds at most one instance. Absence is a valid
/// state, both before the first create and mid-replace.
#[derive(Debug, Default, Clone)]
pub struct InstanceTracker {
    current: Option<ManagedInstance>,
}

impl InstanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ManagedInstance> {
        self.current.as_ref()
    }

    /// Adopt a pre-existing instance from an engine container listing.
    ///
    /// The first record whose name (leading `/` stripped, as engines report
    /// names with a path separator) equals `service_name` wins. No match
    /// leaves the tracker empty; that is not an error.
    pub fn adopt(
        &mut self,
        records: &[EngineContainerRecord],
        service_name: &str,
    ) -> Option<&ManagedInstance> {
        let found = records.iter().find(|record| {
            record
                .names
                .first()
                .map(|name| name.trim_start_matches('/') == service_name)
                .unwrap_or(false)
        })?;

        let instance = ManagedInstance {
            id: found.id.clone(),
            name: service_name.to_string(),
            image_reference: found.image.clone(),
            is_running: found.is_running,
        };
        info!(image = %instance.image_reference, id = %instance.id,
            "already running container found");
        self.current = Some(instance);
        self.current()
    }

    /// Whole-value substitution after a completed create+start transition.
    pub fn replace(&mut self, new: ManagedInstance) {
        self.current = Some(new);
    }

    /// Forget the tracked instance. Used when a transition leaves the real
    /// state ambiguous; the next discovery re-derives it from the engine.
    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, image: &str, running: bool) -> EngineContainerRecord {
        EngineContainerRecord {
            id: id.to_string(),
            names: vec![name.to_string()],
            image: image.to_string(),
            is_running: running,
        }
    }

    #[test]
    fn adopt_matches_normalized_name() {
        let mut tracker = InstanceTracker::new();
        let records = vec![
            record("c0", "/unrelated", "other:v9", true),
            record("c1", "/samplewebapp", "svc:v1", true),
        ];
        let adopted = tracker.adopt(&records, "samplewebapp").unwrap();
        assert_eq!(adopted.id, "c1");
        assert_eq!(adopted.name, "samplewebapp");
        assert_eq!(adopted.image_reference, "svc:v1");
        assert!(adopted.is_running);
    }

    #[test]
    fn adopt_takes_first_match() {
        let mut tracker = InstanceTracker::new();
        let records = vec![
            record("c1", "/svc", "svc:v1", true),
            record("c2", "/svc", "svc:v2", false),
        ];
        assert_eq!(tracker.adopt(&records, "svc").unwrap().id, "c1");
    }

    #[test]
    fn adopt_without_match_leaves_tracker_empty() {
        let mut tracker = InstanceTracker::new();
        let records = vec![record("c0", "/unrelated", "other:v9", true)];
        assert!(tracker.adopt(&records, "samplewebapp").is_none());
        assert!(tracker.current().is_none());
    }

    #[test]
    fn adopt_infers_stopped_state() {
        let mut tracker = InstanceTracker::new();
        let records = vec![record("c1", "/svc", "svc:v1", false)];
        assert!(!tracker.adopt(&records, "svc").unwrap().is_running);
    }

    #[test]
    fn replace_and_clear() {
        let mut tracker = InstanceTracker::new();
        tracker.replace(ManagedInstance {
            id: "c9".to_string(),
            name: "svc".to_string(),
            image_reference: "svc:v2".to_string(),
            is_running: true,
        });
        assert_eq!(tracker.current().unwrap().id, "c9");
        tracker.clear();
        assert!(tracker.current().is_none());
    }
}
