//! The per-turn repair loop: at most one repair call, then an honest failure.

use tracing::{info, warn};

use crate::plan::generator::{finalise_plan, PlanError, PlanGenerator, PlanRequest};
use crate::plan::schema::Plan;

/// User-visible message when no executable plan could be produced.
pub const PLAN_FAILURE_MESSAGE: &str =
    "未能生成可执行的写回计划（Plan）。请重试，或更明确地说明要写入的位置和内容。\
     (No executable Plan could be produced. Please retry or be more explicit.)";

/// Tracks the single repair allowed per turn.
#[derive(Debug, Default)]
pub struct RepairBudget {
    used: bool,
}

impl RepairBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the repair slot. Returns `false` once it has been spent.
    pub fn try_acquire(&mut self) -> bool {
        if self.used {
            return false;
        }
        self.used = true;
        true
    }

    pub fn is_spent(&self) -> bool {
        self.used
    }
}

/// Final failure after generation and (possibly) repair.
#[derive(Debug)]
pub struct PlanFailure {
    pub error: PlanError,
    pub repaired: bool,
}

impl PlanFailure {
    /// Honest message for the chat stream, including the last error.
    pub fn user_message(&self) -> String {
        format!("{}\n[{}] {}", PLAN_FAILURE_MESSAGE, self.error.error_type(), self.error)
    }
}

/// Outcome of [`obtain_plan`].
#[derive(Debug)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub repaired: bool,
}

/// Obtain a plan for a writeback turn.
///
/// With `initial_output` (the chat model's own answer) that text is finalised
/// first; otherwise the dedicated generator is called. Any failure spends the
/// turn's repair budget on exactly one repair call.
pub async fn obtain_plan(
    generator: &PlanGenerator,
    req: &PlanRequest,
    initial_output: Option<&str>,
    budget: &mut RepairBudget,
) -> Result<PlanOutcome, PlanFailure> {
    let (raw, first) = match initial_output {
        Some(text) => (text.to_string(), finalise_plan(text, req)),
        None => {
            let attempt = generator.generate_attempt(req).await;
            (attempt.raw, attempt.result)
        }
    };

    let error = match first {
        Ok(plan) => {
            return Ok(PlanOutcome {
                plan,
                repaired: false,
            })
        }
        Err(e) => e,
    };

    if !budget.try_acquire() {
        warn!(error_type = error.error_type(), "Repair budget already spent");
        return Err(PlanFailure {
            error,
            repaired: false,
        });
    }

    let repaired = generator
        .repair_attempt(req, &raw, error.error_type(), &error.to_string())
        .await;
    match repaired.result {
        Ok(plan) => {
            info!("Plan repaired");
            Ok(PlanOutcome {
                plan,
                repaired: true,
            })
        }
        Err(e) => {
            warn!(error_type = e.error_type(), error = %e, "Plan repair failed");
            Err(PlanFailure {
                error: e,
                repaired: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::plan::schema::HostApp;
    use std::sync::Arc;
    use std::time::Duration;

    const GOOD: &str = r#"```json
{"schema_version": "ah32.plan.v1", "host_app": "wps", "actions": [{"id": "a", "op": "insert_text", "text": "ok"}]}
```"#;

    fn setup(replies: Vec<&str>) -> (Arc<ScriptedLlm>, PlanGenerator) {
        let llm = Arc::new(ScriptedLlm::new(replies));
        let generator = PlanGenerator::new(llm.clone(), Duration::from_secs(5));
        (llm, generator)
    }

    #[test]
    fn test_budget_allows_one_repair() {
        let mut budget = RepairBudget::new();
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
        assert!(budget.is_spent());
    }

    #[tokio::test]
    async fn test_first_attempt_success_skips_repair() {
        let (llm, generator) = setup(vec![GOOD]);
        let req = PlanRequest::new("s", "写入", HostApp::Wps);
        let mut budget = RepairBudget::new();
        let out = obtain_plan(&generator, &req, None, &mut budget).await.unwrap();
        assert!(!out.repaired);
        assert_eq!(llm.calls(), 1);
        assert!(!budget.is_spent());
    }

    #[tokio::test]
    async fn test_repair_after_missing_plan_in_chat_output() {
        let (llm, generator) = setup(vec![GOOD]);
        let req = PlanRequest::new("s", "写入", HostApp::Wps);
        let mut budget = RepairBudget::new();
        let out = obtain_plan(&generator, &req, Some("I wrote it for you!"), &mut budget)
            .await
            .unwrap();
        assert!(out.repaired);
        assert_eq!(llm.calls(), 1);
        let prompt = &llm.requests()[0].messages[0].content;
        assert!(prompt.contains("no_json"));
    }

    #[tokio::test]
    async fn test_repair_is_bounded_to_one_call() {
        let (llm, generator) = setup(vec!["not a plan", "still not a plan", GOOD]);
        let req = PlanRequest::new("s", "写入", HostApp::Wps);
        let mut budget = RepairBudget::new();
        let failure = obtain_plan(&generator, &req, None, &mut budget)
            .await
            .unwrap_err();
        assert!(failure.repaired);
        assert_eq!(failure.error.error_type(), "no_json");
        assert_eq!(llm.calls(), 2);
        assert!(failure.user_message().starts_with(PLAN_FAILURE_MESSAGE));

        // The spent budget blocks any further repair in the same turn.
        let failure = obtain_plan(&generator, &req, Some("nothing"), &mut budget)
            .await
            .unwrap_err();
        assert!(!failure.repaired);
        assert_eq!(llm.calls(), 2);
    }
}
