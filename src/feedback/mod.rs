//! Best-effort recorders: executor error reports, audit records and
//! telemetry events. All of them append JSON lines under the storage root.

pub mod audit;
pub mod code_quality;
pub mod telemetry;

use std::path::Path;

use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::Ah32Error;

pub use audit::{AuditLog, AuditRecord};
pub use code_quality::{CodeQualityStore, ErrorReport};
pub use telemetry::{Telemetry, TelemetryMode};

/// Append one JSON line to `path`, creating parent directories.
pub async fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<(), Ah32Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
