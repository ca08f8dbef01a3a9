//! Append-only audit trail of vault events.
//!
//! Records which operation happened to which secret, and when. Records never
//! carry key material, passphrases or plaintext. Supports pluggable sinks for
//! forwarding records to files or other stores.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A sink that receives audit records. Implement this to forward records
/// to a file, database, or remote collector.
pub trait AuditSink: Send {
    /// Append a record. Called for every audited event.
    fn append(&mut self, record: AuditRecord);
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultEvent {
    KeyCreated,
    VaultUnlocked,
    /// The passphrase did not unwrap the DEK.
    UnlockFailed,
    SecretCreated,
    SecretViewed,
    SecretUpdated,
    SecretDeleted,
    SessionCleared,
}

/// A permanent record of a vault event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event: VaultEvent,
    /// The secret involved, for per-secret events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn now(event: VaultEvent, secret_id: Option<&str>) -> Self {
        Self {
            event,
            secret_id: secret_id.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

/// An append-only log of vault events.
/// Can forward records to additional sinks via `add_forward_sink`.
#[derive(Default)]
pub struct AuditLog {
    records: Vec<AuditRecord>,
    forward_sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("records", &self.records)
            .field("forward_sinks", &self.forward_sinks.len())
            .finish()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink to receive a copy of every record.
    pub fn add_forward_sink(&mut self, sink: Box<dyn AuditSink>) {
        self.forward_sinks.push(sink);
    }

    /// Append a new record to the log and forward to any attached sinks.
    pub fn append(&mut self, record: AuditRecord) {
        for sink in self.forward_sinks.iter_mut() {
            sink.append(record.clone());
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AuditRecord> {
        self.records.iter()
    }

    /// Records for one event type, oldest first.
    pub fn events(&self, event: VaultEvent) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter().filter(move |r| r.event == event)
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit records as JSON lines (one per record) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    /// Open or create a file for append-only audit logging.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, record: AuditRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "audit record not serializable");
                return;
            }
        };
        if let Err(e) = writeln!(self.file, "{line}").and_then(|_| self.file.flush()) {
            warn!(error = %e, "failed to write audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_filter() {
        let mut log = AuditLog::new();
        log.append(AuditRecord::now(VaultEvent::KeyCreated, None));
        log.append(AuditRecord::now(VaultEvent::SecretCreated, Some("a")));
        log.append(AuditRecord::now(VaultEvent::SecretCreated, Some("b")));

        assert_eq!(log.len(), 3);
        let created: Vec<_> = log
            .events(VaultEvent::SecretCreated)
            .filter_map(|r| r.secret_id.as_deref())
            .collect();
        assert_eq!(created, ["a", "b"]);
    }

    #[test]
    fn test_file_sink_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let mut sink = FileAuditSink::new(&path).unwrap();
        sink.append(AuditRecord::now(VaultEvent::SecretViewed, Some("id-1")));
        sink.append(AuditRecord::now(VaultEvent::SessionCleared, None));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.event, VaultEvent::SecretViewed);
        assert_eq!(first.secret_id.as_deref(), Some("id-1"));
        assert!(lines[1].contains("\"session_cleared\""));
    }
}
