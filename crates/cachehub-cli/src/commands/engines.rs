//! Engine listing CLI command.

use serde::Serialize;
use tabled::Tabled;

use cachehub_cache::CacheHub;
use cachehub_core::error::CacheError;

use crate::output::{self, OutputFormat};

/// Engine display row
#[derive(Debug, Serialize, Tabled)]
struct EngineRow {
    /// Storage name
    name: String,
    /// Engine kind
    kind: String,
    /// Serialization mode
    serialization: String,
    /// Native exists
    native_exists: String,
    /// Flush by age
    flush_age: String,
    /// Default
    default: String,
}

/// Execute `engines`
pub async fn execute(hub: &CacheHub, format: OutputFormat) -> Result<(), CacheError> {
    let rows: Vec<EngineRow> = hub
        .describe()
        .await
        .into_iter()
        .map(|info| EngineRow {
            name: info.name,
            kind: info.kind,
            serialization: info.capabilities.serialization.to_string(),
            native_exists: yes_no(info.capabilities.supports_native_exists),
            flush_age: yes_no(info.capabilities.supports_flush_age),
            default: if info.is_default { "✓" } else { "" }.to_string(),
        })
        .collect();

    output::print_rows(&rows, format, "No storages configured.");
    Ok(())
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}
