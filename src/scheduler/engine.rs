//! Scheduler engine -- due-task checks, the run queue, and the bounded drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::events::EventBus;
use crate::fetcher::Fetcher;
use crate::storage::TaskStore;

use super::executor;
use super::history::TaskExecution;
use super::queue::{QueuedTask, RunQueue};
use super::task::ScheduledTask;
use super::MAX_CONCURRENT_TASKS;

/// Snapshot of scheduler internals for the status surface.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub queue_depth: usize,
    pub draining: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub task_count: usize,
    pub active_task_count: usize,
}

/// One scheduler per process. Owns the transient run queue and the drain
/// flag; everything durable lives in the task store, which is re-read at
/// every decision point. Cheap to clone into wake producers and API state.
#[derive(Clone)]
pub struct Scheduler {
    store: TaskStore,
    fetcher: Arc<dyn Fetcher>,
    events: EventBus,
    queue: Arc<Mutex<RunQueue>>,
    draining: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(store: TaskStore, fetcher: Arc<dyn Fetcher>, events: EventBus) -> Self {
        Self {
            store,
            fetcher,
            events,
            queue: Arc::new(Mutex::new(RunQueue::default())),
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The single entry point every wake-up source funnels into.
    ///
    /// Loads fresh task state, queues whatever is due (deduplicated), stamps
    /// the last-check timestamp, and drains unless a drain is already
    /// running. Safe to call re-entrantly; overlapping calls only enqueue.
    /// Returns how many tasks were newly queued.
    pub async fn check_due(&self) -> Result<usize> {
        let now = Utc::now();
        let tasks = self.store.load().await?;

        let mut enqueued = 0;
        {
            let mut queue = self.queue.lock().await;
            for task in tasks.iter().filter(|t| t.is_due(now)) {
                if queue.enqueue(QueuedTask::from_task(task, now)) {
                    debug!(
                        task = %task.id,
                        retailer = %task.retailer,
                        priority = task.priority,
                        "task due, queued"
                    );
                    enqueued += 1;
                }
            }
            queue.resort();
        }

        self.store.set_last_check(now).await?;
        self.drain().await;
        Ok(enqueued)
    }

    /// Queue a task for the next drain regardless of due time. Returns false
    /// when the id is unknown. The caller is expected to wake the scheduler
    /// loop, which performs the drain.
    pub async fn enqueue_now(&self, id: Uuid) -> Result<bool> {
        let tasks = self.store.load().await?;
        let Some(task) = tasks.iter().find(|t| t.id == id) else {
            return Ok(false);
        };

        let mut queue = self.queue.lock().await;
        let fresh = queue.enqueue(QueuedTask::from_task(task, Utc::now()));
        queue.resort();
        drop(queue);

        if fresh {
            info!(task = %id, retailer = %task.retailer, "task queued for immediate run");
        }
        Ok(true)
    }

    /// Execute one task right away, bypassing the queue. This is the one-shot
    /// CLI path where no scheduler loop is running; the cap does not apply
    /// because nothing else is in flight in that process.
    pub async fn execute_now(&self, id: Uuid) -> Result<Option<TaskExecution>> {
        let tasks = self.store.load().await?;
        let Some(task) = tasks.iter().find(|t| t.id == id) else {
            return Ok(None);
        };
        let execution =
            executor::execute_and_record(&self.store, self.fetcher.as_ref(), &self.events, task)
                .await?;
        Ok(Some(execution))
    }

    /// Stamp the last-check entry, used at shutdown so restart recovery
    /// measures from the moment the loop stopped.
    pub async fn touch_last_check(&self) -> Result<()> {
        self.store.set_last_check(Utc::now()).await
    }

    pub async fn insert_task(&self, task: ScheduledTask) -> Result<()> {
        let id = task.id;
        let retailer = task.retailer.clone();
        let frequency = task.update_frequency;
        self.store.update(move |tasks| tasks.push(task)).await?;
        info!(task = %id, retailer = %retailer, frequency_minutes = frequency, "task added");
        Ok(())
    }

    pub async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        self.store.load().await
    }

    pub async fn remove_task(&self, id: Uuid) -> Result<bool> {
        let removed = self
            .store
            .update(|tasks| {
                let before = tasks.len();
                tasks.retain(|t| t.id != id);
                before != tasks.len()
            })
            .await?;
        if removed {
            info!(task = %id, "task removed");
        }
        Ok(removed)
    }

    /// Pause or resume. Pausing only stops future scheduling; an in-flight
    /// execution settles on its own.
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<Option<ScheduledTask>> {
        let updated = self
            .store
            .update(|tasks| {
                tasks.iter_mut().find(|t| t.id == id).map(|t| {
                    t.is_active = active;
                    t.clone()
                })
            })
            .await?;
        if updated.is_some() {
            info!(task = %id, active, "task activity changed");
        }
        Ok(updated)
    }

    pub async fn task_history(&self, id: Uuid) -> Result<Option<Vec<TaskExecution>>> {
        let tasks = self.store.load().await?;
        Ok(tasks
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.executions.clone()))
    }

    pub async fn status(&self) -> Result<SchedulerStatus> {
        let tasks = self.store.load().await?;
        let queue_depth = self.queue.lock().await.len();
        Ok(SchedulerStatus {
            queue_depth,
            draining: self.draining.load(Ordering::SeqCst),
            last_check: self.store.last_check().await?,
            task_count: tasks.len(),
            active_task_count: tasks.iter().filter(|t| t.is_active).count(),
        })
    }

    /// Dequeue and execute batches until the queue is empty. The drain flag
    /// is the sole mutual exclusion: whoever claims it runs batches, everyone
    /// else just leaves entries behind.
    async fn drain(&self) {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // A drain is already running; it will see anything we queued.
            return;
        }

        loop {
            let batch = self.queue.lock().await.take_batch(MAX_CONCURRENT_TASKS);
            if !batch.is_empty() {
                self.run_batch(batch).await;
                continue;
            }

            self.draining.store(false, Ordering::SeqCst);
            // An enqueue may have slipped in between the empty take and the
            // flag clear. If nobody else claimed the drain, pick it back up.
            if self.queue.lock().await.is_empty() {
                break;
            }
            if self
                .draining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                break;
            }
        }
    }

    /// Resolve one batch against fresh store state and run it as a unit.
    /// Entries whose task vanished since enqueue are dropped silently; the
    /// whole batch settles before the next one starts.
    async fn run_batch(&self, batch: Vec<QueuedTask>) {
        let current = match self.store.load().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("failed to load tasks for dispatch: {e:#}");
                Vec::new()
            }
        };

        let mut runnable = Vec::new();
        for entry in batch {
            match current.iter().find(|t| t.id == entry.task_id) {
                Some(task) => runnable.push(task.clone()),
                None => debug!(
                    task = %entry.task_id,
                    retailer = %entry.retailer,
                    "queued task no longer exists, skipping"
                ),
            }
        }

        let runs = runnable.iter().map(|task| {
            executor::execute_and_record(&self.store, self.fetcher.as_ref(), &self.events, task)
        });
        for outcome in join_all(runs).await {
            if let Err(e) = outcome {
                error!("failed to record execution outcome: {e:#}");
            }
        }
    }
}
