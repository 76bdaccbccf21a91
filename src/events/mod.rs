//! Completion broadcast -- best-effort fan-out of execution outcomes.
//!
//! Every finished attempt is published once; listeners subscribe for a
//! receiver and drop it to unsubscribe. Nothing is persisted or replayed, and
//! a subscriber that falls behind loses the oldest events.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::scheduler::TaskExecution;

/// Buffered events per subscriber before lag kicks in.
const EVENT_CAPACITY: usize = 64;

/// One completed execution attempt, successful or not.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    pub task_id: Uuid,
    pub execution: TaskExecution,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Publish to whoever is listening. No listeners is fine.
    pub fn publish(&self, event: TaskEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}
