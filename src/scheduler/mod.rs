//! Scrape task scheduling -- due-task checks, priority queue, bounded drain.

mod engine;
mod executor;
pub mod history;
pub mod queue;
pub mod task;
pub mod wake;

use std::time::Duration;

// Re-export common types
pub use self::engine::{Scheduler, SchedulerStatus};
pub use self::history::TaskExecution;
pub use self::task::{ScheduledTask, TaskError, TaskSpec};
pub use self::wake::{run_scheduler_loop, spawn_wake_sources, wake_channel, WakeReason};

/// How often the primary wake-up timer fires; doubles as the staleness
/// threshold for restart recovery.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Coarse fallback ticker backing up the primary timer.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);

/// Peak executions in flight at any instant.
pub const MAX_CONCURRENT_TASKS: usize = 2;

/// Execution records kept per task.
pub const HISTORY_MAX: usize = 10;

/// Queue priority for tasks that never had one set.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Floor on a task's update frequency, in minutes.
pub const MIN_UPDATE_FREQUENCY_MINUTES: u32 = 2;
