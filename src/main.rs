//! taskforge CLI entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use taskforge::adapters::executors::{AgentExecutor, ShellExecutor};
use taskforge::adapters::sqlite;
use taskforge::cli::commands::{hook, runs, serve, task};
use taskforge::cli::{Cli, Commands, TaskCommands};
use taskforge::domain::models::{Config, StorageConfig};
use taskforge::domain::ports::Storage;
use taskforge::infrastructure::{config::ConfigLoader, logging};
use taskforge::services::{ExecutorRegistry, Runtime};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        // One line on stderr; the debug flag adds the error chain.
        if logging::debug_enabled() {
            eprintln!("error: {e:?}");
        } else {
            eprintln!("error: {e:#}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    logging::init(&config.logging);

    let storage = open_storage(&config).await?;

    match cli.command {
        Commands::Task(task_cmd) => match task_cmd {
            TaskCommands::Add {
                name,
                command,
                prompt,
                model,
                cron,
                on_event,
                patterns,
                timeout_ms,
                max_concurrent,
                queue,
                priority,
                handlers,
                disabled,
            } => {
                task::handle_add(
                    &storage,
                    name,
                    command,
                    prompt,
                    model,
                    cron,
                    on_event,
                    patterns,
                    timeout_ms,
                    max_concurrent,
                    queue,
                    priority,
                    handlers,
                    disabled,
                    cli.json,
                )
                .await?;
            }
            TaskCommands::List { enabled } => {
                task::handle_list(&storage, enabled, cli.json).await?;
            }
            TaskCommands::Show { task_id } => {
                task::handle_show(&storage, task_id, cli.json).await?;
            }
            TaskCommands::Enable { task_id } => {
                task::handle_set_enabled(&storage, task_id, true, cli.json).await?;
            }
            TaskCommands::Disable { task_id } => {
                task::handle_set_enabled(&storage, task_id, false, cli.json).await?;
            }
            TaskCommands::Remove { task_id } => {
                task::handle_remove(&storage, task_id, cli.json).await?;
            }
            TaskCommands::Run { task_id } => {
                let runtime = build_runtime(config, storage);
                task::handle_run(&runtime, task_id, cli.json).await?;
            }
        },
        Commands::Runs {
            task,
            status,
            limit,
            offset,
        } => {
            runs::handle_runs(&storage, task, status, limit, offset, cli.json).await?;
        }
        Commands::Stats { task_id } => {
            runs::handle_stats(&storage, task_id, cli.json).await?;
        }
        Commands::Serve => {
            let runtime = build_runtime(config, storage);
            serve::handle_serve(runtime).await?;
        }
        Commands::HookEvent {
            event_type,
            context,
        } => {
            let runtime = build_runtime(config, storage);
            hook::handle_hook_event(&runtime, event_type, context).await?;
        }
    }
    Ok(())
}

async fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    match &config.storage {
        StorageConfig::Sqlite { path } => sqlite::open(path)
            .await
            .context("Failed to open storage"),
        // Rejected by config validation; unreachable in practice.
        StorageConfig::Postgres { .. } => anyhow::bail!("postgres storage is not available"),
    }
}

fn build_runtime(config: Config, storage: Arc<dyn Storage>) -> Runtime {
    let registry = ExecutorRegistry::new()
        .register(Arc::new(ShellExecutor::new(storage.clone())))
        .register(Arc::new(AgentExecutor::new(
            storage.clone(),
            config.agent.clone(),
        )));
    Runtime::new(config, storage, registry)
}
