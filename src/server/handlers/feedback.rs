//! Best-effort recorders for executor errors and audit events.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::feedback::{AuditRecord, ErrorReport};
use crate::init::AppContext;
use crate::Ah32Error;

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /agentic/error/report
///
/// A storage failure is reported in the body, never as an HTTP error.
pub async fn report_error(
    State(ctx): State<Arc<AppContext>>,
    Json(report): Json<ErrorReport>,
) -> Json<RecordResponse> {
    let session_id = report.session_id.clone();
    let error_type = report.error_type.clone();
    let result = ctx.code_quality.record(report).await;
    if let Err(Ah32Error::Storage(e)) = &result {
        tracing::warn!(error = %e, "Error report not persisted");
    }
    ctx.telemetry
        .emit(
            "executor_error",
            session_id.as_deref(),
            &json!({ "error_type": error_type }),
        )
        .await;
    Json(RecordResponse {
        success: result.is_ok(),
        error: result.err().map(|e| e.to_string()),
    })
}

/// POST /agentic/audit/record
pub async fn record_audit(
    State(ctx): State<Arc<AppContext>>,
    Json(record): Json<AuditRecord>,
) -> Json<RecordResponse> {
    let written = ctx.audit.record(&record).await;
    Json(RecordResponse {
        success: written,
        error: (!written).then(|| "audit record not persisted".to_string()),
    })
}
