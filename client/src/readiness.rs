use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessFailure {
    #[error("map did not load within {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("map reported an error: {0}")]
    Surface(String),
    #[error("map could not be created: {0}")]
    Construct(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Loading,
    Ready,
    Failed(ReadinessFailure),
}

/// Tri-state readiness of the map surface plus the load deadline.
///
/// Everything else in the editor checks `is_ready()` and does nothing otherwise; work is
/// never queued for later.
#[derive(Debug)]
pub struct LifecycleGuard {
    state: Readiness,
    timeout_ms: f64,
    load_deadline_ms: Option<f64>,
}

impl LifecycleGuard {
    pub fn new(timeout_ms: f64) -> Self {
        Self {
            state: Readiness::Loading,
            timeout_ms,
            load_deadline_ms: None,
        }
    }

    pub fn readiness(&self) -> &Readiness {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == Readiness::Ready
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, Readiness::Failed(_))
    }

    /// Start a fresh load attempt.
    pub fn begin(&mut self, now_ms: f64) {
        self.state = Readiness::Loading;
        self.load_deadline_ms = Some(now_ms + self.timeout_ms);
    }

    /// Back to the unmounted state: loading, with no load in flight.
    pub fn reset(&mut self) {
        self.state = Readiness::Loading;
        self.load_deadline_ms = None;
    }

    /// Returns `true` exactly once per load attempt, on the `Loading -> Ready` edge.
    pub fn loaded(&mut self) -> bool {
        if self.state != Readiness::Loading || self.load_deadline_ms.is_none() {
            return false;
        }
        self.state = Readiness::Ready;
        self.load_deadline_ms = None;
        true
    }

    /// Returns `true` when this call moved the guard into `Failed`.
    pub fn fail(&mut self, failure: ReadinessFailure) -> bool {
        if self.is_failed() {
            return false;
        }
        self.state = Readiness::Failed(failure);
        self.load_deadline_ms = None;
        true
    }

    /// Fires the load timeout once the deadline has passed.
    pub fn poll(&mut self, now_ms: f64) -> Option<ReadinessFailure> {
        let deadline = self.load_deadline_ms?;
        if self.state != Readiness::Loading || now_ms < deadline {
            return None;
        }
        let failure = ReadinessFailure::Timeout {
            after_ms: self.timeout_ms as u64,
        };
        self.fail(failure.clone());
        Some(failure)
    }

    pub fn deadline(&self) -> Option<f64> {
        self.load_deadline_ms
    }
}

#[cfg(test)]
mod tests {
    use super::{LifecycleGuard, Readiness, ReadinessFailure};

    #[test]
    fn loads_once_per_attempt() {
        let mut guard = LifecycleGuard::new(10_000.0);
        guard.begin(0.0);
        assert!(guard.loaded());
        assert!(!guard.loaded());
        assert_eq!(guard.readiness(), &Readiness::Ready);
    }

    #[test]
    fn load_before_begin_is_ignored() {
        let mut guard = LifecycleGuard::new(10_000.0);
        assert!(!guard.loaded());
        assert_eq!(guard.readiness(), &Readiness::Loading);
    }

    #[test]
    fn times_out_after_deadline() {
        let mut guard = LifecycleGuard::new(10_000.0);
        guard.begin(1_000.0);
        assert_eq!(guard.poll(10_999.0), None);
        assert_eq!(
            guard.poll(11_000.0),
            Some(ReadinessFailure::Timeout { after_ms: 10_000 })
        );
        assert!(guard.is_failed());
        assert_eq!(guard.poll(20_000.0), None);
    }

    #[test]
    fn late_load_after_timeout_does_not_resurrect() {
        let mut guard = LifecycleGuard::new(10.0);
        guard.begin(0.0);
        guard.poll(10.0);
        assert!(!guard.loaded());
        assert!(guard.is_failed());
    }

    #[test]
    fn ready_surface_can_still_fail() {
        let mut guard = LifecycleGuard::new(10.0);
        guard.begin(0.0);
        guard.loaded();
        assert!(guard.fail(ReadinessFailure::Surface("webgl context lost".into())));
        assert!(!guard.fail(ReadinessFailure::Surface("again".into())));
        assert_eq!(
            guard.readiness(),
            &Readiness::Failed(ReadinessFailure::Surface("webgl context lost".into()))
        );
    }

    #[test]
    fn begin_after_failure_starts_over() {
        let mut guard = LifecycleGuard::new(10.0);
        guard.begin(0.0);
        guard.fail(ReadinessFailure::Construct("no container".into()));
        guard.begin(100.0);
        assert_eq!(guard.readiness(), &Readiness::Loading);
        assert_eq!(guard.deadline(), Some(110.0));
        assert!(guard.loaded());
    }
}
