//! CLI output: error mapping and result formatting.

use crate::error::SyncError;
use crate::reconcile::SyncReport;
use crate::roots::ContentRoot;
use crate::store::ChangesetRecord;
use crate::tree::entry::{Entry, EntryKind};
use crate::tree::hasher::short_hex;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &SyncError) -> String {
    match e {
        SyncError::ConfigError(message) => format!("Configuration error: {}", message),
        other => other.to_string(),
    }
}

pub fn format_sync_report(roots: usize, report: &SyncReport) -> String {
    if report.is_empty() {
        return format!("Tree up to date ({} content roots)", roots);
    }
    format!(
        "Synchronized {} content roots: {} created, {} updated, {} deleted",
        roots, report.created, report.updated, report.deleted
    )
}

pub fn format_entry(entry: &Entry) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.add_row(vec!["Path".to_string(), entry.path.to_string()]);
    match &entry.kind {
        EntryKind::File {
            content,
            content_hash,
        } => {
            table.add_row(vec!["Kind".to_string(), "file".to_string()]);
            table.add_row(vec!["Size".to_string(), format!("{} bytes", content.len())]);
            table.add_row(vec!["Hash".to_string(), short_hex(content_hash)]);
        }
        EntryKind::Directory { children } => {
            table.add_row(vec!["Kind".to_string(), "directory".to_string()]);
            table.add_row(vec!["Children".to_string(), children.len().to_string()]);
        }
    }
    table.add_row(vec![
        "Timestamp".to_string(),
        entry
            .timestamp
            .map(|ts| ts.to_string())
            .unwrap_or_else(|| "-".to_string()),
    ]);
    for (name, value) in &entry.properties {
        table.add_row(vec![format!("Property {}", name), value.clone()]);
    }
    table.to_string()
}

pub fn format_changesets_text(records: &[ChangesetRecord]) -> String {
    if records.is_empty() {
        return "No changesets".to_string();
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["ID", "Committed", "Label", "Changes"]);
    for record in records {
        let changes = record
            .changes
            .iter()
            .map(|change| match &change.from {
                Some(from) => format!("{} {} -> {}", change.kind.as_str(), from, change.path),
                None => format!("{} {}", change.kind.as_str(), change.path),
            })
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            record.id.to_string(),
            record.committed_at.to_rfc3339(),
            record.label.clone(),
            changes,
        ]);
    }
    table.to_string()
}

pub fn format_changesets_json(records: &[ChangesetRecord]) -> Result<String, SyncError> {
    let arr: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            json!({
                "id": record.id,
                "label": record.label,
                "committed_at": record.committed_at.to_rfc3339(),
                "changes": record.changes.iter().map(|change| json!({
                    "kind": change.kind.as_str(),
                    "path": change.path.as_str(),
                    "from": change.from.as_ref().map(|p| p.as_str()),
                    "content_hash": change.content_hash.as_ref().map(short_hex),
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&arr)
        .map_err(|e| SyncError::ConfigError(format!("Failed to serialize changesets: {}", e)))
}

pub fn format_roots(roots: &[ContentRoot]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Name", "Path"]);
    for root in roots {
        let path = if root.path.is_root() {
            ".".to_string()
        } else {
            root.path.to_string()
        };
        table.add_row(vec![root.name.clone(), path]);
    }
    table.to_string()
}
