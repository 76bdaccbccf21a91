//! In-memory run queue -- priority ordered, deduplicated by task id.
//!
//! Queue membership is transient: entries leave at dispatch, not at
//! completion, so the dedup guard only covers the window between a task
//! becoming due and the drain picking it up.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::task::ScheduledTask;

/// One scheduling entry. Never persisted.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task_id: Uuid,
    /// Denormalized for logging.
    pub retailer: String,
    /// When the task was found due.
    pub scheduled_time: DateTime<Utc>,
    /// Copied from the task at enqueue time.
    pub priority: u8,
}

impl QueuedTask {
    pub fn from_task(task: &ScheduledTask, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id,
            retailer: task.retailer.clone(),
            scheduled_time: now,
            priority: task.priority,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunQueue {
    entries: Vec<QueuedTask>,
}

impl RunQueue {
    /// Append an entry unless its task is already queued. Returns whether the
    /// entry was accepted.
    pub fn enqueue(&mut self, entry: QueuedTask) -> bool {
        if self.entries.iter().any(|e| e.task_id == entry.task_id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Re-sort after a batch of enqueues: priority descending, earlier
    /// scheduled time first on ties.
    pub fn resort(&mut self) {
        self.entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.scheduled_time.cmp(&b.scheduled_time))
        });
    }

    /// Remove and return up to `n` entries from the front.
    pub fn take_batch(&mut self, n: usize) -> Vec<QueuedTask> {
        let n = n.min(self.entries.len());
        self.entries.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(priority: u8, offset_secs: i64) -> QueuedTask {
        QueuedTask {
            task_id: Uuid::new_v4(),
            retailer: format!("retailer-{priority}-{offset_secs}"),
            scheduled_time: Utc::now() + Duration::seconds(offset_secs),
            priority,
        }
    }

    #[test]
    fn enqueue_rejects_duplicate_task_id() {
        let mut queue = RunQueue::default();
        let first = entry(5, 0);
        let mut dup = entry(9, 10);
        dup.task_id = first.task_id;

        assert!(queue.enqueue(first));
        assert!(!queue.enqueue(dup));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn resort_orders_by_priority_then_scheduled_time() {
        let mut queue = RunQueue::default();
        let low = entry(3, 0);
        let high_late = entry(8, 5);
        let high_early = entry(8, 1);

        queue.enqueue(low.clone());
        queue.enqueue(high_late.clone());
        queue.enqueue(high_early.clone());
        queue.resort();

        let batch = queue.take_batch(3);
        assert_eq!(batch[0].task_id, high_early.task_id);
        assert_eq!(batch[1].task_id, high_late.task_id);
        assert_eq!(batch[2].task_id, low.task_id);
    }

    #[test]
    fn take_batch_removes_entries() {
        let mut queue = RunQueue::default();
        for i in 0..5 {
            queue.enqueue(entry(5, i));
        }

        let batch = queue.take_batch(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(queue.len(), 3);

        // Once removed, the same task id may be enqueued again.
        assert!(queue.enqueue(batch[0].clone()));
    }

    #[test]
    fn take_batch_handles_short_queue() {
        let mut queue = RunQueue::default();
        queue.enqueue(entry(5, 0));

        let batch = queue.take_batch(10);
        assert_eq!(batch.len(), 1);
        assert!(queue.is_empty());
        assert!(queue.take_batch(2).is_empty());
    }
}
