use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use pricesentry::config::Config;
use pricesentry::events::EventBus;
use pricesentry::fetcher::HttpFetcher;
use pricesentry::scheduler::{ScheduledTask, Scheduler, TaskSpec};
use pricesentry::storage::{open_pool, TaskStore};

#[derive(Parser)]
#[command(
    name = "pricesentry",
    about = "Self-hosted scrape scheduler for retail price and stock watching",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite task store (overrides config)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Extraction endpoint URL (overrides config)
    #[arg(long, global = true)]
    extractor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + scheduler loop + wake sources)
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Manage scrape tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Run one due-task check and drain, then exit (for cron or debugging)
    Check,
}

#[derive(Subcommand)]
enum TaskAction {
    /// Add a new scrape task
    Add {
        /// Retailer label
        #[arg(long)]
        retailer: String,

        /// Page URL to scrape
        #[arg(long)]
        url: String,

        /// CSS selector for the product container
        #[arg(long)]
        selector: String,

        /// Minutes between runs (minimum 2)
        #[arg(long, default_value = "30")]
        frequency: u32,

        /// Queue priority, 1-10 (higher runs first)
        #[arg(long)]
        priority: Option<u8>,
    },

    /// List all tasks
    List,

    /// Remove a task
    Remove {
        #[arg(long)]
        id: Uuid,
    },

    /// Pause a task (stops future scheduling)
    Pause {
        #[arg(long)]
        id: Uuid,
    },

    /// Resume a paused task
    Resume {
        #[arg(long)]
        id: Uuid,
    },

    /// Execute a task right now and print the outcome
    Run {
        #[arg(long)]
        id: Uuid,
    },

    /// Show a task's execution history, newest first
    History {
        #[arg(long)]
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(extractor) = cli.extractor {
        config.extractor_url = extractor;
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            tracing::info!(bind = %config.bind, "starting pricesentry daemon");
            pricesentry::serve(&config).await?;
        }
        Commands::Task { action } => {
            let scheduler = open_scheduler(&config)?;
            run_task_action(&scheduler, action).await?;
        }
        Commands::Check => {
            let scheduler = open_scheduler(&config)?;
            let queued = scheduler.check_due().await?;
            println!("{} task(s) were due and have been run.", queued);
        }
    }

    Ok(())
}

/// Immediate-mode commands open their own store and scheduler; no loop or
/// wake sources are running in this process.
fn open_scheduler(config: &Config) -> Result<Scheduler> {
    let pool = open_pool(&config.db_path)?;
    let fetcher = HttpFetcher::new(
        config.extractor_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )?;
    Ok(Scheduler::new(
        TaskStore::new(pool),
        Arc::new(fetcher),
        EventBus::default(),
    ))
}

async fn run_task_action(scheduler: &Scheduler, action: TaskAction) -> Result<()> {
    match action {
        TaskAction::Add {
            retailer,
            url,
            selector,
            frequency,
            priority,
        } => {
            let task = ScheduledTask::create(TaskSpec {
                retailer,
                source_url: url,
                div_selector: selector,
                update_frequency: frequency,
                priority,
            })?;
            let id = task.id;
            scheduler.insert_task(task).await?;
            println!("Task {} added.", id);
        }
        TaskAction::List => {
            let tasks = scheduler.list_tasks().await?;
            if tasks.is_empty() {
                println!("No tasks found.");
            } else {
                println!(
                    "{:<36} | {:<16} | {:>5} | {:>4} | {:<6} | Last run",
                    "Id", "Retailer", "Every", "Prio", "Active"
                );
                println!(
                    "{:-<36}-|-{:-<16}-|-{:-<5}-|-{:-<4}-|-{:-<6}-|-{:-<20}",
                    "", "", "", "", "", ""
                );
                for task in tasks {
                    let last_run = task
                        .last_run
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<36} | {:<16} | {:>4}m | {:>4} | {:<6} | {}",
                        task.id,
                        task.retailer,
                        task.update_frequency,
                        task.priority,
                        task.is_active,
                        last_run
                    );
                }
            }
        }
        TaskAction::Remove { id } => {
            if scheduler.remove_task(id).await? {
                println!("Task {} removed.", id);
            } else {
                anyhow::bail!("no task with id {id}");
            }
        }
        TaskAction::Pause { id } => match scheduler.set_active(id, false).await? {
            Some(_) => println!("Task {} paused.", id),
            None => anyhow::bail!("no task with id {id}"),
        },
        TaskAction::Resume { id } => match scheduler.set_active(id, true).await? {
            Some(_) => println!("Task {} resumed.", id),
            None => anyhow::bail!("no task with id {id}"),
        },
        TaskAction::Run { id } => match scheduler.execute_now(id).await? {
            Some(execution) => {
                if execution.success {
                    println!(
                        "Scrape succeeded: {} product(s) in {} ms.",
                        execution.products_found, execution.duration_ms
                    );
                } else {
                    println!(
                        "Scrape failed after {} ms: {}",
                        execution.duration_ms,
                        execution.error_message.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            None => anyhow::bail!("no task with id {id}"),
        },
        TaskAction::History { id } => {
            let Some(executions) = scheduler.task_history(id).await? else {
                anyhow::bail!("no task with id {id}");
            };
            if executions.is_empty() {
                println!("No executions recorded yet.");
            } else {
                println!(
                    "{:<25} | {:<7} | {:>8} | {:>8} | Error",
                    "Finished", "Status", "Products", "Duration"
                );
                println!(
                    "{:-<25}-|-{:-<7}-|-{:-<8}-|-{:-<8}-|-{:-<30}",
                    "", "", "", "", ""
                );
                for execution in executions {
                    println!(
                        "{:<25} | {:<7} | {:>8} | {:>6}ms | {}",
                        execution.timestamp.to_rfc3339(),
                        if execution.success { "ok" } else { "failed" },
                        execution.products_found,
                        execution.duration_ms,
                        execution.error_message.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }

    Ok(())
}
