//! Scheduled task model and due-time computation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::history::TaskExecution;
use super::{DEFAULT_PRIORITY, MIN_UPDATE_FREQUENCY_MINUTES};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
    #[error("update frequency must be at least {minimum} minutes, got {got}")]
    FrequencyTooLow { minimum: u32, got: u32 },
    #[error("priority must be between 1 and 10, got {got}")]
    PriorityOutOfRange { got: u8 },
}

/// User-supplied fields for a new task, as they arrive over the API or CLI.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub retailer: String,
    pub source_url: String,
    pub div_selector: String,
    /// Minutes between runs.
    pub update_frequency: u32,
    #[serde(default)]
    pub priority: Option<u8>,
}

impl TaskSpec {
    pub fn validate(&self) -> Result<(), TaskError> {
        let required = [
            ("retailer", &self.retailer),
            ("sourceUrl", &self.source_url),
            ("divSelector", &self.div_selector),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(TaskError::MissingField { field });
            }
        }
        if self.update_frequency < MIN_UPDATE_FREQUENCY_MINUTES {
            return Err(TaskError::FrequencyTooLow {
                minimum: MIN_UPDATE_FREQUENCY_MINUTES,
                got: self.update_frequency,
            });
        }
        if let Some(priority) = self.priority {
            if !(1..=10).contains(&priority) {
                return Err(TaskError::PriorityOutOfRange { got: priority });
            }
        }
        Ok(())
    }
}

/// A recurring scrape job. Wire names stay camelCase so stores written by
/// earlier deployments keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: Uuid,
    pub retailer: String,
    pub source_url: String,
    pub div_selector: String,
    /// Minutes between runs.
    pub update_frequency: u32,
    /// 1-10, higher drains first. Entries persisted without one default here.
    #[serde(default = "default_priority")]
    pub priority: u8,
    pub is_active: bool,
    /// Timestamp of the most recent attempt, success or failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// Outcome records, newest first, capped at `HISTORY_MAX`.
    #[serde(default)]
    pub executions: Vec<TaskExecution>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl ScheduledTask {
    /// Validate a spec and mint a new active task with a fresh id.
    pub fn create(spec: TaskSpec) -> Result<Self, TaskError> {
        spec.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            retailer: spec.retailer,
            source_url: spec.source_url,
            div_selector: spec.div_selector,
            update_frequency: spec.update_frequency,
            priority: spec.priority.unwrap_or(DEFAULT_PRIORITY),
            is_active: true,
            last_run: None,
            executions: Vec::new(),
        })
    }

    /// Whether the task should run at `now`.
    ///
    /// Inactive tasks are never due. A task that has never run is due on the
    /// first check; otherwise it is due once `update_frequency` minutes have
    /// elapsed since the last attempt.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_run {
            None => true,
            Some(last) => {
                now.signed_duration_since(last)
                    >= Duration::minutes(i64::from(self.update_frequency))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TaskSpec {
        TaskSpec {
            retailer: "example".to_string(),
            source_url: "https://shop.example/gpus".to_string(),
            div_selector: ".product-card".to_string(),
            update_frequency: 15,
            priority: None,
        }
    }

    #[test]
    fn create_defaults_priority_and_activates() {
        let task = ScheduledTask::create(spec()).unwrap();
        assert_eq!(task.priority, DEFAULT_PRIORITY);
        assert!(task.is_active);
        assert!(task.last_run.is_none());
        assert!(task.executions.is_empty());
    }

    #[test]
    fn create_rejects_blank_selector() {
        let mut s = spec();
        s.div_selector = "   ".to_string();
        let err = ScheduledTask::create(s).unwrap_err();
        assert!(matches!(err, TaskError::MissingField { field: "divSelector" }));
    }

    #[test]
    fn create_rejects_frequency_below_floor() {
        let mut s = spec();
        s.update_frequency = 1;
        let err = ScheduledTask::create(s).unwrap_err();
        assert!(matches!(err, TaskError::FrequencyTooLow { minimum: 2, got: 1 }));
    }

    #[test]
    fn create_rejects_priority_out_of_range() {
        let mut s = spec();
        s.priority = Some(11);
        assert!(matches!(
            ScheduledTask::create(s).unwrap_err(),
            TaskError::PriorityOutOfRange { got: 11 }
        ));

        let mut s = spec();
        s.priority = Some(0);
        assert!(ScheduledTask::create(s).is_err());
    }

    #[test]
    fn never_run_task_is_due() {
        let task = ScheduledTask::create(spec()).unwrap();
        assert!(task.is_due(Utc::now()));
    }

    #[test]
    fn inactive_task_is_never_due() {
        let mut task = ScheduledTask::create(spec()).unwrap();
        task.is_active = false;
        assert!(!task.is_due(Utc::now()));

        task.last_run = Some(Utc::now() - Duration::days(365));
        assert!(!task.is_due(Utc::now()));
    }

    #[test]
    fn due_exactly_at_frequency_boundary() {
        let now = Utc::now();
        let mut task = ScheduledTask::create(spec()).unwrap();

        task.last_run = Some(now - Duration::minutes(15));
        assert!(task.is_due(now));

        task.last_run = Some(now - Duration::minutes(15) + Duration::seconds(1));
        assert!(!task.is_due(now));
    }

    #[test]
    fn wire_format_is_camel_case() {
        let task = ScheduledTask::create(spec()).unwrap();
        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("sourceUrl").is_some());
        assert!(json.get("divSelector").is_some());
        assert!(json.get("updateFrequency").is_some());
        assert!(json.get("isActive").is_some());
        // Never-run tasks omit lastRun entirely, matching the original store.
        assert!(json.get("lastRun").is_none());
    }

    #[test]
    fn missing_priority_deserializes_to_default() {
        let json = r#"{
            "id": "7e2f1c9a-9a24-4bcd-8e54-6f2f3a4b5c6d",
            "retailer": "example",
            "sourceUrl": "https://shop.example",
            "divSelector": ".grid",
            "updateFrequency": 10,
            "isActive": true
        }"#;
        let task: ScheduledTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.priority, DEFAULT_PRIORITY);
        assert!(task.executions.is_empty());
    }
}
