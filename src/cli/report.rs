//! Printing sync reports.

use colored::{ColoredString, Colorize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::sync::{ItemReport, ItemStatus, SyncError, SyncReport, SyncResult};

fn status_label(status: ItemStatus) -> ColoredString {
    let label = format!("{:<9}", status.to_string());
    match status {
        ItemStatus::Pulled | ItemStatus::Pushed | ItemStatus::Merged | ItemStatus::Rendered => {
            label.green()
        }
        ItemStatus::Unchanged => label.dimmed(),
        ItemStatus::Skipped => label.yellow(),
        ItemStatus::Failed => label.red().bold(),
    }
}

fn item_line(item: &ItemReport) -> String {
    let id = item
        .id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    let mut line = format!(
        "  {} {:>6}  {}",
        status_label(item.status),
        id,
        item.name.as_deref().unwrap_or("")
    );
    if let Some(file) = &item.file {
        line.push_str(&format!(" {}", format!("({file})").dimmed()));
    }
    if let Some(message) = &item.message {
        let message = if item.status.is_failure() {
            message.red()
        } else {
            message.dimmed()
        };
        line.push_str(&format!("\n           {message}"));
    }
    line
}

/// Print one item to stderr.
pub fn eprint_item(item: &ItemReport) {
    eprintln!("{}", item_line(item));
}

/// One-line summary, e.g. `push: 2 succeeded, 0 skipped, 1 failed`.
#[must_use]
pub fn summary(report: &SyncReport) -> String {
    format!(
        "{}: {} succeeded, {} skipped, {} failed",
        report.operation,
        report.succeeded(),
        report.skipped(),
        report.failed()
    )
}

/// JSON document for `--json` output.
#[must_use]
pub fn to_json(report: &SyncReport) -> serde_json::Value {
    json!({
        "success": report.is_success(),
        "operation": report.operation,
        "items": report.items,
        "summary": {
            "succeeded": report.succeeded(),
            "skipped": report.skipped(),
            "failed": report.failed(),
        },
    })
}

/// Print a report as colored lines or as JSON.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&to_json(report))?);
        return Ok(());
    }

    if report.is_empty() {
        println!("Nothing to {}.", report.operation);
        return Ok(());
    }
    for item in &report.items {
        println!("{}", item_line(item));
    }
    println!();
    let line = summary(report);
    if report.is_success() {
        println!("{}", line.bold());
    } else {
        println!("{}", line.red().bold());
    }
    Ok(())
}

/// Turn a report into the command outcome: failed items fail the command.
///
/// # Errors
///
/// Returns [`Error::ItemsFailed`] if any item failed.
pub fn finish(report: &SyncReport) -> Result<()> {
    if report.is_success() {
        Ok(())
    } else {
        Err(Error::ItemsFailed {
            operation: report.operation,
            failed: report.failed(),
        })
    }
}

/// Print the outcome of an engine run, including the partial report of an
/// aborted batch, and map it to the command result.
///
/// # Errors
///
/// Returns the engine error, or [`Error::ItemsFailed`] if items failed.
pub fn conclude(result: SyncResult<SyncReport>, json: bool) -> Result<()> {
    match result {
        Ok(report) => {
            print_report(&report, json)?;
            finish(&report)
        }
        Err(err) => {
            if let SyncError::Aborted { report, .. } = &err {
                print_report(report, json)?;
            }
            Err(err.into())
        }
    }
}
