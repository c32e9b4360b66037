//! Plan generation, repair and schema endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::init::AppContext;
use crate::plan::repair::{obtain_plan, RepairBudget};
use crate::plan::schema::{plan_json_schema, BlockAnchor, HostApp, Plan};
use crate::plan::{PlanError, PlanRequest};
use crate::routing::Delivery;
use crate::server::error::ApiError;

const QUALITY_HINTS: usize = 3;

#[derive(Debug, Deserialize)]
pub struct PlanGenerateBody {
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(alias = "userQuery", alias = "message")]
    pub user_query: String,
    #[serde(alias = "hostApp")]
    pub host_app: String,
    #[serde(default, alias = "frontendCapabilities")]
    pub capabilities: Option<Value>,
    #[serde(default, alias = "documentContext")]
    pub context: String,
    #[serde(default)]
    pub anchor: Option<BlockAnchor>,
    #[serde(default)]
    pub delivery: Option<Delivery>,
    #[serde(default, alias = "blockId")]
    pub block_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlanRepairBody {
    #[serde(flatten)]
    pub request: PlanGenerateBody,
    /// The failed plan, as JSON.
    #[serde(default)]
    pub plan: Option<Value>,
    /// The failed model output, when the plan never parsed.
    #[serde(default, alias = "rawOutput")]
    pub raw_output: Option<String>,
    #[serde(default, alias = "errorType")]
    pub error_type: Option<String>,
    #[serde(alias = "errorMessage", alias = "error")]
    pub error_message: String,
}

/// `{success, plan|null, error}` body shared by generate and repair.
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub success: bool,
    pub plan: Option<Value>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
    pub repaired: bool,
}

impl PlanResponse {
    fn from_result(result: Result<Plan, PlanError>, repaired: bool) -> Self {
        match result {
            Ok(plan) => PlanResponse {
                success: true,
                plan: Some(plan.to_value()),
                error: None,
                error_type: None,
                repaired,
            },
            Err(e) => PlanResponse {
                success: false,
                plan: None,
                error: Some(e.to_string()),
                error_type: Some(e.error_type()),
                repaired,
            },
        }
    }
}

async fn plan_request(ctx: &AppContext, body: &PlanGenerateBody) -> Result<PlanRequest, ApiError> {
    let host =
        HostApp::from_name(&body.host_app).ok_or_else(|| ApiError::unsupported_host(&body.host_app))?;
    if body.user_query.trim().is_empty() {
        return Err(ApiError::invalid_params("user_query", "user_query must not be empty"));
    }
    let mut req = PlanRequest::new(
        body.session_id.clone().unwrap_or_default(),
        body.user_query.clone(),
        host,
    );
    req.capabilities = body.capabilities.clone();
    req.context = body.context.clone();
    req.anchor = body.anchor.unwrap_or_default();
    req.delivery = body.delivery.unwrap_or_default();
    req.block_id = body.block_id.clone();
    req.quality_hints = ctx
        .code_quality
        .hints(Some(host.as_str()), QUALITY_HINTS)
        .await;
    Ok(req)
}

/// POST /agentic/plan/generate
///
/// Generates a plan and spends at most one repair call on failure.
#[instrument(skip_all)]
pub async fn generate_plan(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<PlanGenerateBody>,
) -> Result<Json<PlanResponse>, ApiError> {
    let req = plan_request(&ctx, &body).await?;
    let mut budget = RepairBudget::new();
    let response = match obtain_plan(&ctx.plan_generator, &req, None, &mut budget).await {
        Ok(outcome) => PlanResponse::from_result(Ok(outcome.plan), outcome.repaired),
        Err(failure) => {
            warn!(error_type = failure.error.error_type(), "Plan generation failed");
            PlanResponse::from_result(Err(failure.error), failure.repaired)
        }
    };
    info!(success = response.success, repaired = response.repaired, "Plan generate");
    Ok(Json(response))
}

/// POST /agentic/plan/repair
///
/// Exactly one repair call against the reported failure.
#[instrument(skip_all)]
pub async fn repair_plan(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<PlanRepairBody>,
) -> Result<Json<PlanResponse>, ApiError> {
    let req = plan_request(&ctx, &body.request).await?;
    let original = match (&body.raw_output, &body.plan) {
        (Some(raw), _) if !raw.trim().is_empty() => raw.clone(),
        (_, Some(plan)) => serde_json::to_string_pretty(plan).unwrap_or_default(),
        _ => String::new(),
    };
    let error_type = body.error_type.as_deref().unwrap_or("invalid_plan");
    let attempt = ctx
        .plan_generator
        .repair_attempt(&req, &original, error_type, &body.error_message)
        .await;
    Ok(Json(PlanResponse::from_result(attempt.result, true)))
}

/// GET /agentic/plan/schema
pub async fn plan_schema() -> Json<Value> {
    Json(plan_json_schema())
}
