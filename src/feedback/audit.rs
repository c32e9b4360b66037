//! Audit trail of what the task pane executed.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::feedback::append_jsonl;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// What happened, e.g. `plan_executed` or `macro_executed`.
    pub event: String,
    #[serde(default, alias = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, alias = "hostApp", skip_serializing_if = "Option::is_none")]
    pub host_app: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

pub struct AuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Append a record. Never fails the caller.
    ///
    /// Returns `true` if the record was written.
    pub async fn record(&self, record: &AuditRecord) -> bool {
        let _guard = self.write_lock.lock().await;
        match append_jsonl(&self.path, record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(event = %record.event, error = %e, "Failed to write audit record");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback/audit.jsonl");
        let log = AuditLog::new(&path);
        let record: AuditRecord =
            serde_json::from_value(json!({"event": "plan_executed", "sessionId": "s1", "data": {"actions": 2}}))
                .unwrap();
        assert!(log.record(&record).await);
        assert!(log.record(&record).await);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"session_id\":\"s1\""));
    }

    #[tokio::test]
    async fn test_unwritable_path_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let log = AuditLog::new(blocker.join("audit.jsonl"));
        let record = AuditRecord {
            event: "x".into(),
            session_id: None,
            host_app: None,
            data: Value::Null,
            recorded_at: Utc::now(),
        };
        assert!(!log.record(&record).await);
    }
}
