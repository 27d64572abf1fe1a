//! Rendering of command results.

use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Tables and indented JSON
    #[default]
    Table,
    /// Compact JSON only
    Json,
}

/// Outcome marker for a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Done,
    Missing,
    Failed,
}

/// Print rows as a table, or as a JSON array.
pub fn print_rows<T: Serialize + Tabled>(rows: &[T], format: OutputFormat, empty: &str) {
    match format {
        OutputFormat::Table if rows.is_empty() => println!("{empty}"),
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => println!("{}", render(rows, format)),
    }
}

/// Print a document as JSON, indented in table mode.
pub fn print_document<T: Serialize + ?Sized>(doc: &T, format: OutputFormat) {
    println!("{}", render(doc, format));
}

fn render<T: Serialize + ?Sized>(doc: &T, format: OutputFormat) -> String {
    let text = match format {
        OutputFormat::Table => serde_json::to_string_pretty(doc),
        OutputFormat::Json => serde_json::to_string(doc),
    };
    text.unwrap_or_else(|e| format!("\"<unprintable: {e}>\""))
}

/// Print a status line; failures go to stderr.
pub fn status(status: Status, msg: &str) {
    match status {
        Status::Done => println!("✓ {msg}"),
        Status::Missing => println!("⚠ {msg}"),
        Status::Failed => eprintln!("✗ {msg}"),
    }
}
