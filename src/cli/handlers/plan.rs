//! `ah32 plan check`: normalize and validate a Plan file offline.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::cli::output::{
    output_json, print_error, print_header, print_kv, print_success, print_table, OutputMode,
};
use crate::plan::extract::extract_plan_json;
use crate::plan::normalize_plan_payload;
use crate::plan::schema::{validate_plan, HostApp, Plan, PlanValidationError};

/// Normalize then validate. Files may hold bare JSON or model output with
/// a fenced Plan.
pub fn check_plan_text(text: &str, host: Option<HostApp>) -> Result<(Value, Result<Plan, PlanValidationError>)> {
    let raw = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => extract_plan_json(text).context("No Plan JSON found in input")?,
    };
    let normalized = normalize_plan_payload(&raw, host);
    let result = validate_plan(&normalized);
    Ok((normalized, result))
}

pub async fn handle_plan_check(path: &Path, host: Option<&str>, mode: OutputMode) -> Result<()> {
    let host = match host {
        Some(name) => Some(
            HostApp::from_name(name).with_context(|| format!("Unknown host '{}'. Use wps, et or wpp", name))?,
        ),
        None => None,
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let (normalized, result) = check_plan_text(&text, host)?;

    if let (Some(expected), Some(found)) = (host, normalized.get("host_app").and_then(Value::as_str)) {
        if found != expected.as_str() {
            anyhow::bail!("Plan host_app '{}' does not match --host '{}'", found, expected);
        }
    }

    match (mode, result) {
        (OutputMode::Json, Ok(plan)) => output_json(&json!({ "valid": true, "plan": plan.to_value() })),
        (OutputMode::Json, Err(e)) => {
            output_json(&json!({ "valid": false, "errors": e.errors, "normalized": normalized }));
            anyhow::bail!("Plan is invalid");
        }
        (OutputMode::Human, Ok(plan)) => {
            print_header("Plan");
            print_kv("host_app", plan.host_app.as_str());
            print_kv("actions", &plan.walk().len().to_string());
            let rows = plan
                .walk()
                .into_iter()
                .map(|a| vec![a.id.clone(), a.op().to_string(), a.title.clone()])
                .collect();
            print_table(&["id", "op", "title"], rows);
            print_success("Plan is valid");
        }
        (OutputMode::Human, Err(e)) => {
            let rows = e
                .errors
                .iter()
                .map(|f| vec![f.path.clone(), f.message.clone()])
                .collect();
            print_table(&["path", "problem"], rows);
            print_error(&format!("Plan is invalid ({} problem(s))", e.errors.len()));
            anyhow::bail!("Plan is invalid");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_plan_text_accepts_fenced_output() {
        let text = "Here you go:\n```json\n{\"schema_version\":\"ah32.plan.v1\",\"host_app\":\"wps\",\"actions\":[{\"id\":\"a1\",\"op\":\"insert_text\",\"text\":\"hi\"}]}\n```";
        let (_, result) = check_plan_text(text, Some(HostApp::Wps)).unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_check_plan_text_reports_unknown_op() {
        let text = r#"{"schema_version":"ah32.plan.v1","host_app":"wps","actions":[{"id":"a1","op":"launch_rocket"}]}"#;
        let (_, result) = check_plan_text(text, None).unwrap();
        assert!(result.unwrap_err().has_unknown_op());
    }

    #[test]
    fn test_check_plan_text_without_json() {
        assert!(check_plan_text("just prose", None).is_err());
    }
}
