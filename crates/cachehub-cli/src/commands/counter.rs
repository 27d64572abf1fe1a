//! Counter CLI commands.

use clap::Args;

use cachehub_cache::CacheHub;
use cachehub_core::error::CacheError;

/// Arguments for `incr` and `decr`
#[derive(Debug, Args)]
pub struct CounterArgs {
    /// Counter key
    pub key: String,
    /// Step
    #[arg(default_value_t = 1)]
    pub step: i64,
}

/// Execute `incr` (`direction` 1) or `decr` (`direction` -1)
pub async fn execute(hub: &CacheHub, args: &CounterArgs, direction: i8, storage: Option<&str>) -> Result<(), CacheError> {
    let result = if direction < 0 {
        hub.decrement(&args.key, args.step, storage).await?
    } else {
        hub.increment(&args.key, args.step, storage).await?
    };
    match result {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => Err(CacheError::backend(format!("Failed to update counter '{}'", args.key))),
    }
}
