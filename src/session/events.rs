use super::SessionState;
use crate::device::GlassesEventType;
use crate::error::KernalError;
use crate::native::GlassesDisconnectReason;
use crate::tracking::TrackingType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingModeChangedResult {
    pub success: bool,
    pub tracking_type: TrackingType,
}

/// Published to subscribers on the main thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RecoverableError(KernalError),
    GlassesStateChanged(GlassesEventType),
    GlassesDisconnected(GlassesDisconnectReason),
    HmdLostTracking,
    HmdPoseReady,
    TrackingModeChanging {
        from: TrackingType,
        to: TrackingType,
    },
    TrackingModeChanged(TrackingModeChangedResult),
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

pub type SessionListener = Box<dyn FnMut(&SessionEvent) + Send>;

pub(crate) struct ListenerSet {
    next_id: u64,
    listeners: Vec<(ListenerId, SessionListener)>,
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self {
            next_id: 1,
            listeners: Vec::new(),
        }
    }
}

impl ListenerSet {
    pub(crate) fn add(&mut self, listener: SessionListener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub(crate) fn publish(&mut self, event: &SessionEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }
}
