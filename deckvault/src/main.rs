use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};

use deckvault::config::AppConfig;
use deckvault::database::time::to_rfc3339;
use deckvault::database::{EntityKind, ListOutcome, QueryOptions};
use deckvault::logging::{self, LOG_RETENTION_DAYS, LogOptions};
use deckvault::services::ServiceContainer;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (reads .env first)
    let config = AppConfig::from_env()?;

    let _log_guard = logging::init_logging(&LogOptions {
        verbose: cli.verbose,
        json: cli.json_logs,
        log_dir: cli.log_dir.clone(),
    })?;

    if let Some(dir) = &cli.log_dir {
        match logging::cleanup_old_logs(dir, LOG_RETENTION_DAYS).await {
            Ok(0) => {}
            Ok(deleted) => info!(deleted, "Removed old log files"),
            Err(e) => warn!(error = %e, "Failed to clean up old log files"),
        }
    }

    let container = ServiceContainer::new(config).await?;
    run(&container, cli.server, cli.command).await
}

async fn run(container: &ServiceContainer, server: bool, command: Command) -> anyhow::Result<()> {
    let access = if server {
        container.server_access().await?
    } else {
        container.scoped_access()
    };

    match command {
        Command::Credentials => {
            let cached = container.credential().await?;
            print_json(&serde_json::json!({
                "accessKeyId": cached.credential.masked_access_key(),
                "hasSessionToken": cached.credential.session_token.is_some(),
                "expiresAt": to_rfc3339(cached.expires_at),
            }))?;
        }
        Command::Create { kind, json } => {
            let record = kind.schema().record_from(parse_json(&json)?)?;
            let stored = access.create(kind, record).await?;
            print_json(&stored)?;
        }
        Command::Get { kind, key } => {
            match access.get_by_id(kind, &cli::to_record(key)).await? {
                Some(record) => print_json(&record)?,
                None => anyhow::bail!("{kind}: record not found"),
            }
        }
        Command::Update { kind, key, json } => {
            let changes = kind.schema().record_from(parse_json(&json)?)?;
            let updated = access.update(kind, &cli::to_record(key), changes).await?;
            print_json(&updated)?;
        }
        Command::Delete { kind, key } => {
            access.delete(kind, &cli::to_record(key)).await?;
            info!(%kind, "Deleted");
        }
        Command::List { kind, user } => {
            print_list(kind, access.get_by_user_id(kind, &user).await?)?;
        }
        Command::Query {
            kind,
            key,
            value,
            filter,
            limit,
        } => {
            let options = QueryOptions {
                filter: cli::to_filter(filter),
                limit,
            };
            print_list(kind, access.query(kind, &key, value, options).await?)?;
        }
        Command::Scan { kind, filter } => {
            print_list(kind, access.scan(kind, cli::to_filter(filter)).await?)?;
        }
    }

    Ok(())
}

fn parse_json(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).context("argument is not valid JSON")
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Degraded results print the reason on stderr and an empty array on stdout.
fn print_list(kind: EntityKind, outcome: ListOutcome) -> anyhow::Result<()> {
    if let Some(reason) = outcome.reason() {
        eprintln!("warning: {kind} list unavailable: {reason}");
    }
    print_json(outcome.items())
}
