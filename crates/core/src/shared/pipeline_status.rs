use std::sync::{Arc, Mutex};

/// Lifecycle state reported by a sample source or sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStatus {
    Idle,
    Reading,
    Writing,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Terminal states accept nothing, `Idle` may only move forward, and an
    /// active state may only end.
    pub fn can_transition_to(&self, next: PipelineStatus) -> bool {
        match self {
            s if s.is_terminal() => false,
            PipelineStatus::Idle => next != PipelineStatus::Idle,
            _ => next.is_terminal(),
        }
    }
}

/// Status owned by one component but readable from other threads.
///
/// The sink's encoder worker and the pump both observe the sink status, so
/// it lives behind a mutex; transitions out of a terminal state are refused.
#[derive(Clone, Debug)]
pub struct StatusCell {
    inner: Arc<Mutex<PipelineStatus>>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PipelineStatus::Idle)),
        }
    }

    pub fn get(&self) -> PipelineStatus {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves to `next` if allowed. Returns whether the transition happened.
    pub fn transition(&self, next: PipelineStatus) -> bool {
        let mut status = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if status.can_transition_to(next) {
            log::debug!("status {:?} -> {:?}", *status, next);
            *status = next;
            true
        } else {
            false
        }
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
