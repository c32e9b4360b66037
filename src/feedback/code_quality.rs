//! Error reports from the task-pane executor, fed back into prompts as hints.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::feedback::append_jsonl;
use crate::utils::text::truncate_chars;
use crate::Ah32Error;

/// Reports kept in memory for hint generation.
pub const RECENT_REPORTS: usize = 200;

/// A failure reported by the frontend while executing a Plan or macro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    #[serde(alias = "errorType")]
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, alias = "hostApp", skip_serializing_if = "Option::is_none")]
    pub host_app: Option<String>,
    #[serde(default, alias = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Plan op that failed, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(default = "Utc::now")]
    pub reported_at: DateTime<Utc>,
}

pub struct CodeQualityStore {
    path: PathBuf,
    recent: RwLock<VecDeque<ErrorReport>>,
    write_lock: Mutex<()>,
}

impl CodeQualityStore {
    /// Open the store, seeding recent reports from the existing log.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut recent = VecDeque::new();
        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<ErrorReport>(line) {
                    Ok(report) => {
                        recent.push_back(report);
                        if recent.len() > RECENT_REPORTS {
                            recent.pop_front();
                        }
                    }
                    Err(e) => debug!(error = %e, "Skipping unreadable error report"),
                }
            }
        }
        Self {
            path,
            recent: RwLock::new(recent),
            write_lock: Mutex::new(()),
        }
    }

    /// Record a report.
    pub async fn record(&self, report: ErrorReport) -> Result<(), Ah32Error> {
        if report.error_type.trim().is_empty() {
            return Err(Ah32Error::Validation("error_type must not be empty".into()));
        }
        {
            let _guard = self.write_lock.lock().await;
            append_jsonl(&self.path, &report).await?;
        }
        let mut recent = self.recent.write().await;
        recent.push_back(report);
        if recent.len() > RECENT_REPORTS {
            recent.pop_front();
        }
        Ok(())
    }

    /// Record and swallow failures.
    pub async fn record_best_effort(&self, report: ErrorReport) {
        if let Err(e) = self.record(report).await {
            warn!(error = %e, "Failed to record error report");
        }
    }

    /// Prompt hints from the most frequent recent failures for `host_app`.
    ///
    /// Reports without a host apply to every host.
    pub async fn hints(&self, host_app: Option<&str>, limit: usize) -> Vec<String> {
        let recent = self.recent.read().await;
        let mut grouped: BTreeMap<&str, (usize, &ErrorReport)> = BTreeMap::new();
        for report in recent.iter().rev() {
            let matches_host = match (&report.host_app, host_app) {
                (Some(reported), Some(wanted)) => reported.eq_ignore_ascii_case(wanted),
                _ => true,
            };
            if !matches_host {
                continue;
            }
            grouped
                .entry(report.error_type.as_str())
                .and_modify(|(count, _)| *count += 1)
                .or_insert((1, report));
        }

        let mut ranked: Vec<(&str, usize, &ErrorReport)> = grouped
            .into_iter()
            .map(|(kind, (count, latest))| (kind, count, latest))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(kind, count, latest)| {
                let op = latest
                    .op
                    .as_deref()
                    .map(|op| format!(" in {}", op))
                    .unwrap_or_default();
                format!(
                    "Recent executor failure ({}x) {}{}: {}",
                    count,
                    kind,
                    op,
                    truncate_chars(&latest.message, 160)
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(kind: &str, host: Option<&str>, message: &str) -> ErrorReport {
        ErrorReport {
            error_type: kind.into(),
            message: message.into(),
            code: None,
            host_app: host.map(str::to_string),
            session_id: None,
            op: Some("insert_table".into()),
            reported_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_hints_rank_by_frequency_and_host() {
        let dir = tempfile::tempdir().unwrap();
        let store = CodeQualityStore::open(dir.path().join("feedback/code_quality.jsonl")).await;
        store.record(report("range_error", Some("et"), "bad range A0")).await.unwrap();
        store.record(report("bookmark_missing", Some("wps"), "no bookmark")).await.unwrap();
        store.record(report("bookmark_missing", Some("wps"), "no bookmark 2")).await.unwrap();

        let hints = store.hints(Some("wps"), 5).await;
        assert_eq!(hints.len(), 1);
        assert!(hints[0].starts_with("Recent executor failure (2x) bookmark_missing in insert_table"));
        assert!(hints[0].ends_with("no bookmark 2"));
        assert_eq!(store.hints(None, 5).await.len(), 2);
    }

    #[tokio::test]
    async fn test_reopen_seeds_from_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("code_quality.jsonl");
        {
            let store = CodeQualityStore::open(&path).await;
            store.record(report("x", None, "m")).await.unwrap();
        }
        let store = CodeQualityStore::open(&path).await;
        assert_eq!(store.hints(Some("et"), 3).await.len(), 1);
    }

    #[test]
    fn test_report_accepts_camel_case() {
        let r: ErrorReport =
            serde_json::from_str(r#"{"errorType": "js_error", "message": "boom", "hostApp": "wps"}"#)
                .unwrap();
        assert_eq!(r.error_type, "js_error");
        assert_eq!(r.host_app.as_deref(), Some("wps"));
    }

    #[tokio::test]
    async fn test_empty_error_type_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CodeQualityStore::open(dir.path().join("c.jsonl")).await;
        assert!(store.record(report(" ", None, "m")).await.is_err());
    }
}
