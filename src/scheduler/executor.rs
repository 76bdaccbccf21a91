//! Task executor -- one scrape round trip, captured as an execution record.

use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::events::{EventBus, TaskEvent};
use crate::fetcher::{Fetcher, ScrapeJob};
use crate::storage::TaskStore;

use super::history::{self, TaskExecution};
use super::task::ScheduledTask;

/// Run one attempt and describe the outcome. Ordinary failures land in the
/// record with `success = false`; this function never returns an error.
pub(super) async fn execute(fetcher: &dyn Fetcher, task: &ScheduledTask) -> TaskExecution {
    let job = ScrapeJob {
        retailer: task.retailer.clone(),
        source_url: task.source_url.clone(),
        div_selector: task.div_selector.clone(),
    };

    let started = Instant::now();
    let outcome = fetcher.fetch(&job).await;
    let duration_ms = started.elapsed().as_millis() as u64;
    let timestamp = Utc::now();

    match outcome {
        Ok(harvest) => {
            info!(
                task = %task.id,
                retailer = %task.retailer,
                products = harvest.products.len(),
                duration_ms,
                "scrape succeeded"
            );
            TaskExecution {
                timestamp,
                success: true,
                products_found: harvest.products.len(),
                error_message: None,
                duration_ms,
            }
        }
        Err(e) => {
            warn!(
                task = %task.id,
                retailer = %task.retailer,
                duration_ms,
                error = %e,
                "scrape failed"
            );
            TaskExecution {
                timestamp,
                success: false,
                products_found: 0,
                error_message: Some(e.to_string()),
                duration_ms,
            }
        }
    }
}

/// Execute, fold the outcome into the task's history, persist, broadcast.
/// Exactly one history entry and one store write per invocation, even on
/// failure.
pub(super) async fn execute_and_record(
    store: &TaskStore,
    fetcher: &dyn Fetcher,
    events: &EventBus,
    task: &ScheduledTask,
) -> Result<TaskExecution> {
    let execution = execute(fetcher, task).await;

    let recorded = store
        .update(|tasks| match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(current) => {
                history::record(current, execution.clone());
                true
            }
            None => false,
        })
        .await?;

    if !recorded {
        // Deleted while the scrape was in flight. The outcome still goes out
        // to listeners; there is just no task left to pin it to.
        debug!(task = %task.id, "task deleted mid-execution, outcome not persisted");
    }

    events.publish(TaskEvent {
        task_id: task.id,
        execution: execution.clone(),
    });

    Ok(execution)
}
