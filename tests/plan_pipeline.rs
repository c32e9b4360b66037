//! Routing decisions flowing into plan generation, normalization and repair.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use ah32::llm::ScriptedLlm;
use ah32::plan::{
    finalise_plan, obtain_plan, ActionKind, BlockAnchor, HostApp, PlanError, PlanGenerator,
    PlanRequest, RepairBudget,
};
use ah32::routing::{route, Delivery, RouteInput, RouteReason, SkillHint};
use common::builders::fenced;
use common::plan_json;

fn generator(replies: Vec<String>) -> (Arc<ScriptedLlm>, PlanGenerator) {
    let llm = Arc::new(ScriptedLlm::new(replies));
    let generator = PlanGenerator::new(llm.clone(), Duration::from_secs(5));
    (llm, generator)
}

/// Build the plan request the chat agent would build for this message.
fn request_for(session: &str, message: &str, host: HostApp, skills: &[SkillHint]) -> PlanRequest {
    let input = RouteInput {
        message,
        prior_context: "",
        host_app: Some(host),
        skills,
    };
    let decision = route(&input);
    assert!(decision.want_writeback, "{message} should write back");
    let mut req = PlanRequest::new(session, message, host);
    req.anchor = decision.anchor;
    req.delivery = decision.delivery;
    req
}

#[test]
fn test_routing_table() {
    let cases = [
        ("你好", HostApp::Wps, false),
        ("这是什么意思？", HostApp::Wps, false),
        ("不要写入文档，帮我解释一下", HostApp::Wps, false),
        ("把这段话写到文档末尾", HostApp::Wps, true),
        ("画个柱形图", HostApp::Et, true),
    ];
    for (message, host, expected) in cases {
        let decision = route(&RouteInput::new(message, Some(host)));
        assert_eq!(decision.want_writeback, expected, "{message}");
    }
}

#[test]
fn test_continuation_needs_prior_plan() {
    let mut input = RouteInput::new("继续", Some(HostApp::Wps));
    assert!(!route(&input).want_writeback);

    let prior = format!("assistant: {}", fenced("已写入。", &plan_json("wps", "x")));
    input.prior_context = &prior;
    let decision = route(&input);
    assert!(decision.want_writeback);
    assert_eq!(decision.reason, RouteReason::Continuation);
}

#[test]
fn test_messy_model_output_becomes_canonical_plan() {
    let req = request_for("s1", "把这段话写到文档末尾", HostApp::Wps, &[]);
    let raw = r#"好的：
```json
{"hostApp": "WPS", "actions": [
  {"type": "upsertBlock", "blockId": "whatever", "anchor": "cursor", "params": {"content": "第一段"}},
  {"op": "upsertBlock", "blockId": "second", "content": "第二段"}
]}
```"#;
    let plan = finalise_plan(raw, &req).unwrap();

    assert_eq!(plan.schema_version, "ah32.plan.v1");
    assert_eq!(plan.host_app, HostApp::Wps);
    let ids: Vec<String> = plan
        .actions
        .iter()
        .filter_map(|a| match &a.kind {
            ActionKind::UpsertBlock {
                block_id, anchor, ..
            } => {
                assert_eq!(*anchor, BlockAnchor::End);
                Some(block_id.clone())
            }
            _ => None,
        })
        .collect();
    let forced = req.effective_block_id();
    assert_eq!(ids, vec![forced.clone(), format!("{}_2", forced)]);
    assert!(plan.walk().iter().any(|a| a.op() == "insert_text"));
}

#[test]
fn test_compare_table_skill_records_delivery() {
    let skills = [SkillHint {
        name: "contract-review".into(),
        default_writeback: Some(Delivery::CompareTable),
        background: false,
    }];
    let req = request_for("s2", "帮我审阅这份合同", HostApp::Wps, &skills);
    assert_eq!(req.delivery, Delivery::CompareTable);

    let plan = finalise_plan(&fenced("", &plan_json("wps", "审阅表")), &req).unwrap();
    assert_eq!(plan.meta.get("delivery"), Some(&json!("compare_table")));
}

#[test]
fn test_host_mismatch_is_a_hard_failure() {
    let req = PlanRequest::new("s3", "把总结插入到文档", HostApp::Wps);
    let err = finalise_plan(&fenced("", &plan_json("et", "x")), &req).unwrap_err();
    assert!(matches!(err, PlanError::HostMismatch { .. }));
    assert_eq!(err.error_type(), "host_mismatch");
}

#[test]
fn test_host_specific_op_is_rejected_by_validation() {
    let req = PlanRequest::new("s4", "把总结插入到文档", HostApp::Wps);
    let raw = r#"{"host_app": "wps", "actions": [{"op": "sort_range", "range": "A1:B3", "key": "B"}]}"#;
    let err = finalise_plan(raw, &req).unwrap_err();
    assert_eq!(err.error_type(), "invalid_plan");
}

#[test]
fn test_unknown_op_survives_normalization_and_fails_validation() {
    let req = PlanRequest::new("s5", "把总结插入到文档", HostApp::Wps);
    let raw = r#"{"host_app": "wps", "actions": [{"op": "teleport_paragraph", "text": "x"}]}"#;
    match finalise_plan(raw, &req).unwrap_err() {
        PlanError::Invalid(e) => assert!(e.has_unknown_op()),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_host_mismatch_is_repaired_once() {
    let (llm, generator) = generator(vec![
        fenced("", &plan_json("et", "错的宿主")),
        fenced("", &plan_json("wps", "正确")),
    ]);
    let req = request_for("s6", "把这段话写到文档末尾", HostApp::Wps, &[]);
    let mut budget = RepairBudget::new();

    let outcome = obtain_plan(&generator, &req, None, &mut budget).await.unwrap();
    assert!(outcome.repaired);
    assert_eq!(outcome.plan.host_app, HostApp::Wps);
    assert_eq!(llm.calls(), 2);

    let repair_prompt: String = llm.requests()[1]
        .messages
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert!(repair_prompt.contains("host_mismatch"));
}

#[tokio::test]
async fn test_spent_budget_never_calls_the_model_again() {
    let (llm, generator) = generator(vec!["not a plan".to_string()]);
    let req = PlanRequest::new("s7", "把总结插入到文档", HostApp::Wps);
    let mut budget = RepairBudget::new();
    assert!(budget.try_acquire());

    let failure = obtain_plan(&generator, &req, Some("没有计划"), &mut budget)
        .await
        .unwrap_err();
    assert!(!failure.repaired);
    assert_eq!(failure.error.error_type(), "no_json");
    assert_eq!(llm.calls(), 0);
}
