use dialer_core::domain::{AgentId, CallAttemptId, CallStatus, LeadId};
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    CallInitiated,
    CallAnswered,
    CallStatusUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub lead_id: LeadId,
    pub agent_id: Option<AgentId>,
    pub call_attempt_id: CallAttemptId,
    pub status: CallStatus,
    pub timestamp: i64,
}

/// Fire-and-forget fan-out to dashboards. Slow subscribers lag and lose
/// events; nothing is replayed.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: LifecycleEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
