//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use deckvault::database::{EntityKind, Filter, Record};

#[derive(Parser, Debug)]
#[command(
    name = "deckvault",
    version,
    about = "Card collection, deck and favourites store with scoped cloud credentials"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long = "json-logs", global = true)]
    pub json_logs: bool,

    /// Also write daily-rolling log files into this directory
    #[arg(long = "log-dir", value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Use the server-side client (ambient credentials) instead of the
    /// signed-in user's scoped credentials
    #[arg(long, global = true)]
    pub server: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Acquire a scoped credential and print its masked key and expiry
    Credentials,

    /// Create a record from a JSON object
    Create {
        kind: EntityKind,
        /// Record body, e.g. '{"userId":"u1","cardId":"c1","quantity":4}'
        json: String,
    },

    /// Fetch one record by key
    Get {
        kind: EntityKind,
        /// Key field, repeatable (e.g. -k userId=u1 -k cardId=c1)
        #[arg(short = 'k', long = "key", value_name = "FIELD=VALUE", required = true, value_parser = parse_assignment)]
        key: Vec<(String, Value)>,
    },

    /// Apply a partial update to one record
    Update {
        kind: EntityKind,
        #[arg(short = 'k', long = "key", value_name = "FIELD=VALUE", required = true, value_parser = parse_assignment)]
        key: Vec<(String, Value)>,
        /// Changes as a JSON object
        json: String,
    },

    /// Delete one record by key
    Delete {
        kind: EntityKind,
        #[arg(short = 'k', long = "key", value_name = "FIELD=VALUE", required = true, value_parser = parse_assignment)]
        key: Vec<(String, Value)>,
    },

    /// List every record owned by a user
    List {
        kind: EntityKind,
        #[arg(long = "user", value_name = "USER_ID")]
        user: String,
    },

    /// Equality lookup on the partition key or a secondary lookup field
    Query {
        kind: EntityKind,
        #[arg(long = "key", value_name = "FIELD")]
        key: String,
        #[arg(long = "value", value_name = "VALUE", value_parser = parse_value)]
        value: Value,
        /// Extra equality condition, repeatable
        #[arg(long = "filter", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
        filter: Vec<(String, Value)>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Read a whole collection
    Scan {
        kind: EntityKind,
        #[arg(long = "filter", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
        filter: Vec<(String, Value)>,
    },
}

/// Numbers stay numbers; everything else is a string.
fn parse_value(raw: &str) -> Result<Value, String> {
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(Value::from(n));
    }
    if let Ok(f) = raw.parse::<f64>()
        && let Some(n) = serde_json::Number::from_f64(f)
    {
        return Ok(Value::Number(n));
    }
    Ok(Value::String(raw.to_string()))
}

fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{raw}'"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("empty field name in '{raw}'"));
    }
    Ok((field.to_string(), parse_value(value)?))
}

pub fn to_record(pairs: Vec<(String, Value)>) -> Record {
    pairs.into_iter().collect()
}

pub fn to_filter(pairs: Vec<(String, Value)>) -> Filter {
    pairs
        .into_iter()
        .fold(Filter::new(), |filter, (field, value)| filter.eq(field, value))
}
