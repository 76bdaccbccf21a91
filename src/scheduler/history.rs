//! Execution history -- one bounded outcome log per task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::ScheduledTask;
use super::HISTORY_MAX;

/// The outcome of one execution attempt. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecution {
    /// Instant the attempt finished.
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// 0 when the attempt failed or found nothing.
    pub products_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Wall-clock round trip in milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

/// Fold an execution into its task: prepend to the history, trim the tail
/// beyond `HISTORY_MAX`, and stamp `last_run` with the attempt time. The
/// caller persists the mutated task.
pub fn record(task: &mut ScheduledTask, execution: TaskExecution) {
    task.last_run = Some(execution.timestamp);
    task.executions.insert(0, execution);
    task.executions.truncate(HISTORY_MAX);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::TaskSpec;
    use chrono::Duration;

    fn task() -> ScheduledTask {
        ScheduledTask::create(TaskSpec {
            retailer: "example".to_string(),
            source_url: "https://shop.example".to_string(),
            div_selector: ".grid".to_string(),
            update_frequency: 5,
            priority: None,
        })
        .unwrap()
    }

    fn execution_at(at: DateTime<Utc>, success: bool) -> TaskExecution {
        TaskExecution {
            timestamp: at,
            success,
            products_found: if success { 3 } else { 0 },
            error_message: (!success).then(|| "selector not found".to_string()),
            duration_ms: 120,
        }
    }

    #[test]
    fn record_prepends_and_stamps_last_run() {
        let mut task = task();
        let first = Utc::now() - Duration::minutes(10);
        let second = Utc::now();

        record(&mut task, execution_at(first, true));
        record(&mut task, execution_at(second, false));

        assert_eq!(task.executions.len(), 2);
        assert_eq!(task.executions[0].timestamp, second);
        assert_eq!(task.executions[1].timestamp, first);
        assert_eq!(task.last_run, Some(second));
    }

    #[test]
    fn record_stamps_last_run_on_failure_too() {
        let mut task = task();
        let at = Utc::now();
        record(&mut task, execution_at(at, false));

        assert_eq!(task.last_run, Some(at));
        assert_eq!(task.executions[0].products_found, 0);
        assert_eq!(
            task.executions[0].error_message.as_deref(),
            Some("selector not found")
        );
    }

    #[test]
    fn history_is_capped_newest_first() {
        let mut task = task();
        let base = Utc::now() - Duration::hours(1);
        for i in 0..15 {
            record(&mut task, execution_at(base + Duration::minutes(i), true));
        }

        assert_eq!(task.executions.len(), HISTORY_MAX);
        // Newest attempt leads; the five oldest fell off the tail.
        assert_eq!(task.executions[0].timestamp, base + Duration::minutes(14));
        assert_eq!(
            task.executions[HISTORY_MAX - 1].timestamp,
            base + Duration::minutes(5)
        );
    }

    #[test]
    fn wire_format_matches_original_store() {
        let execution = execution_at(Utc::now(), false);
        let json = serde_json::to_value(&execution).unwrap();
        assert!(json.get("productsFound").is_some());
        assert!(json.get("errorMessage").is_some());
        assert!(json.get("duration").is_some());

        let success = execution_at(Utc::now(), true);
        let json = serde_json::to_value(&success).unwrap();
        // errorMessage is present iff the attempt failed.
        assert!(json.get("errorMessage").is_none());
    }
}
