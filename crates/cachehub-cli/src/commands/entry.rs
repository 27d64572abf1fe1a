//! Single-key CLI commands: get, set, has, remove.

use clap::Args;

use cachehub_cache::CacheHub;
use cachehub_core::error::CacheError;
use cachehub_core::types::{Ttl, Value};

use crate::output::{self, OutputFormat, Status};

/// Arguments naming one key
#[derive(Debug, Args)]
pub struct KeyArgs {
    /// Cache key
    pub key: String,
}

/// Arguments for `get`
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Cache key
    pub key: String,
    /// Print strings without JSON quoting
    #[arg(short, long)]
    pub raw: bool,
}

/// Arguments for `set`
#[derive(Debug, Args)]
pub struct SetArgs {
    /// Cache key
    pub key: String,
    /// Value; parsed as JSON, or stored as a string if it is not valid JSON
    pub value: String,
    /// Expiry, e.g. "90", "+2 hours", "1 day", or an RFC 3339 timestamp
    #[arg(short, long)]
    pub ttl: Option<String>,
}

/// Execute `get`
pub async fn get(hub: &CacheHub, args: &GetArgs, storage: Option<&str>, format: OutputFormat) -> Result<(), CacheError> {
    match hub.get(&args.key, storage).await? {
        Some(Value::String(s)) if args.raw => println!("{s}"),
        Some(value) => output::print_document(&value, format),
        None => {
            output::status(Status::Missing, &format!("Key '{}' not found", args.key));
            std::process::exit(2);
        }
    }
    Ok(())
}

/// Execute `set`
pub async fn set(hub: &CacheHub, args: &SetArgs, storage: Option<&str>) -> Result<(), CacheError> {
    let value = parse_value(&args.value);
    let ttl = args.ttl.as_deref().map(Ttl::phrase).unwrap_or_default();
    if hub.set(&args.key, &value, ttl, storage).await? {
        output::status(Status::Done, &format!("Stored '{}'", args.key));
        Ok(())
    } else {
        Err(CacheError::backend(format!("Failed to store '{}'", args.key)))
    }
}

/// Execute `has`
pub async fn has(hub: &CacheHub, args: &KeyArgs, storage: Option<&str>) -> Result<(), CacheError> {
    let found = hub.has(&args.key, storage).await?;
    println!("{found}");
    if !found {
        std::process::exit(2);
    }
    Ok(())
}

/// Execute `remove`
pub async fn remove(hub: &CacheHub, args: &KeyArgs, storage: Option<&str>) -> Result<(), CacheError> {
    if hub.remove(&args.key, storage).await? {
        output::status(Status::Done, &format!("Removed '{}'", args.key));
    } else {
        output::status(Status::Missing, &format!("Key '{}' not found", args.key));
    }
    Ok(())
}

/// Interpret command-line text as JSON, falling back to a plain string.
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_value("hello world"), json!("hello world"));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
    }
}
