//! Operator console for the job engine.
//!
//! Reads commands from stdin and streams every job notification to stdout
//! as a server-sent-events `data:` line.

mod commands;

use std::sync::Arc;
use std::time::Duration;

use actors::{BackendRegistry, EngineError, InProcessBus, JobEngine, LocalBackend, NotificationBus};
use db::{DbConfig, JobFilter, repositories::SurrealJobStore};
use jobs_core::{ConfigError, EngineConfig, Job};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{Command, HELP};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::from_env()?;

    let endpoint = std::env::var("JOBS_DB_ENDPOINT").unwrap_or_else(|_| "mem://".into());
    tracing::info!("Connecting job store at {}", endpoint);
    let db = db::init(DbConfig::endpoint(endpoint)).await?;
    let store = Arc::new(SurrealJobStore::new(db));

    let latency = local_latency(std::env::var("JOBS_LOCAL_LATENCY_MS").ok())?;
    let mut backends = BackendRegistry::new();
    backends.register_all(LocalBackend::new().with_latency(latency));

    let bus = Arc::new(InProcessBus::new());
    let _printer = bus.subscribe().spawn_handler(|notification| {
        tracing::debug!("{}", notification.description());
        match serde_json::to_string(&notification) {
            Ok(json) => println!("data: {}\n", json),
            Err(e) => tracing::warn!("Failed to encode notification: {}", e),
        }
    });

    let (engine, handle) = JobEngine::builder(store, Arc::new(backends))
        .with_config(config)
        .with_bus(bus as Arc<dyn NotificationBus>)
        .start()
        .await?;

    tracing::info!("jobsd ready; type `help` for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            None => continue,
            Some(Ok(command)) => command,
            Some(Err(e)) => {
                eprintln!("{}", e);
                continue;
            }
        };

        if command == Command::Quit {
            break;
        }

        if let Err(e) = run(&engine, command).await {
            eprintln!("error: {}", e);
        }
    }

    engine.shutdown();
    handle.await?;
    tracing::info!("jobsd stopped");
    Ok(())
}

/// Simulated backend latency, 500ms unless `JOBS_LOCAL_LATENCY_MS` is set.
fn local_latency(value: Option<String>) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(Duration::from_millis(500)),
        Some(v) => v
            .trim()
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue {
                key: "JOBS_LOCAL_LATENCY_MS",
                value: v,
            }),
    }
}

async fn run(engine: &JobEngine, command: Command) -> Result<(), EngineError> {
    match command {
        Command::Enqueue {
            job_type,
            subject_id,
            attachment_id,
        } => print_job(&engine.enqueue(&job_type, subject_id, attachment_id).await?),
        Command::Status(id) => print_job(&engine.status(&id).await?),
        Command::Cancel(id) => print_job(&engine.cancel(&id).await?),
        Command::Retry(id) => print_job(&engine.retry(&id).await?),
        Command::List(status) => {
            let filter = match status {
                Some(status) => JobFilter::new().with_status(status),
                None => JobFilter::new(),
            };
            for job in engine.list(&filter).await? {
                println!(
                    "{}  {:<17} {:<10} {}/{}  {}",
                    job.id.as_str(),
                    job.job_type.as_str(),
                    job.status.as_str(),
                    job.attempts,
                    job.max_attempts,
                    job.subject_id
                );
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn print_job(job: &Job) {
    match serde_json::to_string_pretty(job) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("error: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_latency_defaults_and_parses() {
        assert_eq!(local_latency(None), Ok(Duration::from_millis(500)));
        assert_eq!(local_latency(Some(" 25 ".into())), Ok(Duration::from_millis(25)));
    }

    #[test]
    fn local_latency_rejects_garbage() {
        assert_eq!(
            local_latency(Some("fast".into())),
            Err(ConfigError::InvalidValue {
                key: "JOBS_LOCAL_LATENCY_MS",
                value: "fast".into(),
            })
        );
    }
}
