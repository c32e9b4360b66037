//! JS macro fast-path endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::init::AppContext;
use crate::macros::{obtain_macro, MacroError, MacroRequest};
use crate::plan::repair::RepairBudget;
use crate::plan::schema::HostApp;
use crate::server::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct MacroBody {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(alias = "userQuery", alias = "message")]
    pub user_query: String,
    #[serde(alias = "hostApp")]
    pub host_app: String,
    #[serde(default, alias = "documentContext")]
    pub context: String,
    #[serde(default, alias = "frontendCapabilities")]
    pub capabilities: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct MacroRepairBody {
    #[serde(flatten)]
    pub request: MacroBody,
    #[serde(default)]
    pub code: String,
    #[serde(alias = "errorMessage", alias = "error")]
    pub error_message: String,
}

/// `{success, code|null, error}`.
#[derive(Debug, Serialize)]
pub struct MacroResponse {
    pub success: bool,
    pub code: Option<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
    pub repaired: bool,
}

impl MacroResponse {
    fn from_result(result: Result<String, MacroError>, repaired: bool) -> Self {
        match result {
            Ok(code) => MacroResponse {
                success: true,
                code: Some(code),
                error: None,
                error_type: None,
                repaired,
            },
            Err(e) => MacroResponse {
                success: false,
                code: None,
                error: Some(e.to_string()),
                error_type: Some(e.error_type()),
                repaired,
            },
        }
    }
}

async fn macro_request(ctx: &AppContext, body: &MacroBody) -> Result<MacroRequest, ApiError> {
    let host =
        HostApp::from_name(&body.host_app).ok_or_else(|| ApiError::unsupported_host(&body.host_app))?;
    if body.user_query.trim().is_empty() {
        return Err(ApiError::invalid_params("user_query", "user_query must not be empty"));
    }
    let mut req = MacroRequest::new(
        body.session_id.clone().unwrap_or_default(),
        body.user_query.clone(),
        host,
    );
    req.context = body.context.clone();
    req.capabilities = body.capabilities.clone();
    req.quality_hints = ctx.code_quality.hints(Some(host.as_str()), 3).await;
    Ok(req)
}

/// POST /agentic/js-macro/generate
#[instrument(skip_all)]
pub async fn generate_macro(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<MacroBody>,
) -> Result<Json<MacroResponse>, ApiError> {
    let req = macro_request(&ctx, &body).await?;
    let mut budget = RepairBudget::new();
    let response = match obtain_macro(&ctx.macro_generator, &req, &mut budget).await {
        Ok(outcome) => MacroResponse::from_result(Ok(outcome.code), outcome.repaired),
        Err(failure) => MacroResponse::from_result(Err(failure.error), failure.repaired),
    };
    Ok(Json(response))
}

/// POST /agentic/js-macro/repair
#[instrument(skip_all)]
pub async fn repair_macro(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<MacroRepairBody>,
) -> Result<Json<MacroResponse>, ApiError> {
    let req = macro_request(&ctx, &body.request).await?;
    let attempt = ctx
        .macro_generator
        .repair(&req, &body.code, &body.error_message)
        .await;
    Ok(Json(MacroResponse::from_result(attempt.result, true)))
}
