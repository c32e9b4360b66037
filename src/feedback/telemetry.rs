//! Best-effort telemetry events.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::feedback::append_jsonl;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TelemetryMode {
    Off,
    /// Emit events as `tracing` records.
    #[default]
    Log,
    /// Append events to `telemetry.jsonl`.
    File,
}

impl TelemetryMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "0" | "false" => Some(TelemetryMode::Off),
            "log" => Some(TelemetryMode::Log),
            "file" => Some(TelemetryMode::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent<'a> {
    pub name: &'a str,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    pub data: &'a Value,
}

pub struct Telemetry {
    mode: TelemetryMode,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Telemetry {
    pub fn new(mode: TelemetryMode, path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn mode(&self) -> TelemetryMode {
        self.mode
    }

    /// Emit an event. Failures are logged and dropped.
    pub async fn emit(&self, name: &str, session_id: Option<&str>, data: &Value) {
        match self.mode {
            TelemetryMode::Off => {}
            TelemetryMode::Log => {
                info!(target: "ah32::telemetry", event = name, session_id, data = %data, "telemetry");
            }
            TelemetryMode::File => {
                let event = TelemetryEvent {
                    name,
                    at: Utc::now(),
                    session_id,
                    data,
                };
                let _guard = self.write_lock.lock().await;
                if let Err(e) = append_jsonl(&self.path, &event).await {
                    warn!(event = name, error = %e, "Failed to write telemetry event");
                }
            }
        }
    }
}
