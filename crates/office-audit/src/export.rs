//! CSV rendering of audit rows.

use crate::AuditError;
use chrono::SecondsFormat;
use office_types::AuditLog;
use serde::{Deserialize, Serialize};

/// One exported line. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Entity Type")]
    pub entity_type: String,
    #[serde(rename = "Entity ID")]
    pub entity_id: u64,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "IP Address")]
    pub ip_address: String,
    #[serde(rename = "Duration (ms)")]
    pub duration: u64,
}

impl ExportRow {
    pub fn from_log(log: &AuditLog, user: String) -> Self {
        Self {
            timestamp: log.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            user,
            action: log.action.to_string(),
            entity_type: log.entity_type.to_string(),
            entity_id: log.entity_id,
            description: log.description.clone(),
            success: log.success,
            ip_address: log.ip_address.clone(),
            duration: log.duration,
        }
    }
}

/// Header line plus one record per row. An empty slice still yields the header.
pub fn write_csv(rows: &[ExportRow]) -> Result<Vec<u8>, AuditError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if rows.is_empty() {
        writer.write_record([
            "Timestamp",
            "User",
            "Action",
            "Entity Type",
            "Entity ID",
            "Description",
            "Success",
            "IP Address",
            "Duration (ms)",
        ])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| AuditError::Export(csv::Error::from(e.into_error())))
}

pub fn parse_export(bytes: &[u8]) -> Result<Vec<ExportRow>, AuditError> {
    let mut reader = csv::Reader::from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}
