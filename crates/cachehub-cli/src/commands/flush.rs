//! Flush CLI command.

use chrono::Utc;
use clap::Args;

use cachehub_cache::CacheHub;
use cachehub_cache::expiry;
use cachehub_core::error::CacheError;
use cachehub_core::types::Ttl;

use crate::output::{self, Status};

/// Arguments for `flush`
#[derive(Debug, Args)]
pub struct FlushArgs {
    /// Flush every storage instead of only the selected one
    #[arg(long)]
    pub all: bool,
    /// Only remove entries last written before this point, e.g. "-1 hour"
    /// or an RFC 3339 timestamp (engines without age support flush everything)
    #[arg(long)]
    pub older_than: Option<String>,
}

/// Execute `flush`
pub async fn execute(hub: &CacheHub, args: &FlushArgs, storage: Option<&str>) -> Result<(), CacheError> {
    let cutoff = match &args.older_than {
        Some(phrase) => expiry::resolve(&Ttl::phrase(phrase.as_str()), Utc::now())?,
        None => None,
    };
    let target = if args.all {
        None
    } else {
        Some(storage.unwrap_or(hub.default_storage()))
    };

    if hub.flush(target, cutoff).await? {
        match target {
            Some(name) => output::status(Status::Done, &format!("Flushed storage '{name}'")),
            None => output::status(Status::Done, "Flushed every storage"),
        }
        Ok(())
    } else {
        Err(CacheError::backend("Flush did not complete"))
    }
}
