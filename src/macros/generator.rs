//! JS macro fast path: generate ES5 macro code, with the same single-repair
//! rule as plans.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::macros::syntax::{detect_unsupported_syntax, SyntaxIssue};
use crate::plan::extract::extract_code;
use crate::plan::repair::RepairBudget;
use crate::plan::schema::HostApp;
use crate::utils::text::truncate_chars;
use crate::Ah32Error;

/// User-visible message when no runnable macro could be produced.
pub const MACRO_FAILURE_MESSAGE: &str =
    "未能生成可运行的宏代码。请重试，或更明确地描述要执行的操作。\
     (No runnable macro could be produced. Please retry or be more explicit.)";

const MAX_ORIGINAL_CHARS: usize = 6000;

#[derive(Debug, Clone)]
pub struct MacroRequest {
    pub session_id: String,
    pub user_query: String,
    pub host_app: HostApp,
    pub context: String,
    pub capabilities: Option<Value>,
    pub quality_hints: Vec<String>,
}

impl MacroRequest {
    pub fn new(session_id: impl Into<String>, user_query: impl Into<String>, host_app: HostApp) -> Self {
        Self {
            session_id: session_id.into(),
            user_query: user_query.into(),
            host_app,
            context: String::new(),
            capabilities: None,
            quality_hints: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MacroError {
    #[error("LLM call failed: {0}")]
    Llm(String),

    #[error("Macro generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Model response contained no code")]
    NoCode,

    #[error("Unsupported syntax: {}", join_issues(.0))]
    Unsupported(Vec<SyntaxIssue>),
}

fn join_issues(issues: &[SyntaxIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl MacroError {
    pub fn error_type(&self) -> &'static str {
        match self {
            MacroError::Llm(_) => "llm_error",
            MacroError::Timeout(_) => "timeout",
            MacroError::NoCode => "no_code",
            MacroError::Unsupported(_) => "unsupported_syntax",
        }
    }
}

impl From<Ah32Error> for MacroError {
    fn from(err: Ah32Error) -> Self {
        MacroError::Llm(err.to_string())
    }
}

/// Extract and gate macro code from raw model text.
pub fn finalise_macro(raw: &str) -> Result<String, MacroError> {
    let code = extract_code(raw).ok_or(MacroError::NoCode)?;
    let issues = detect_unsupported_syntax(&code);
    if !issues.is_empty() {
        return Err(MacroError::Unsupported(issues));
    }
    Ok(code)
}

fn rules(host: HostApp) -> String {
    format!(
        "Write a single JavaScript macro for the {label} JSA engine.\n\
         Rules:\n\
         - ES5 only: no template literals, arrow functions, async/await or class.\n\
         - Use the global Application object (Application.ActiveDocument, Application.ActiveWorkbook, Application.ActivePresentation).\n\
         - Output exactly ONE fenced ```javascript block and nothing else.",
        label = host.label()
    )
}

fn context_sections(req: &MacroRequest) -> String {
    let mut sections = Vec::new();
    if let Some(caps) = &req.capabilities {
        sections.push(format!(
            "Frontend capabilities:\n{}",
            truncate_chars(&caps.to_string(), 1200)
        ));
    }
    if !req.context.trim().is_empty() {
        sections.push(format!("Document context:\n{}", req.context.trim()));
    }
    if !req.quality_hints.is_empty() {
        sections.push(format!(
            "Avoid these past execution failures:\n{}",
            req.quality_hints
                .iter()
                .map(|h| format!("- {}", h))
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }
    sections.join("\n\n")
}

/// Outcome of one model round trip.
#[derive(Debug)]
pub struct MacroAttempt {
    pub raw: String,
    pub result: Result<String, MacroError>,
}

pub struct MacroGenerator {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl MacroGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    #[instrument(skip(self, req), fields(host = %req.host_app))]
    pub async fn generate(&self, req: &MacroRequest) -> MacroAttempt {
        let system = format!("{}\n\n{}", rules(req.host_app), context_sections(req));
        self.attempt(vec![
            ChatMessage::system(system.trim_end().to_string()),
            ChatMessage::user(req.user_query.clone()),
        ])
        .await
    }

    #[instrument(skip(self, req, code, error_message), fields(host = %req.host_app))]
    pub async fn repair(&self, req: &MacroRequest, code: &str, error_message: &str) -> MacroAttempt {
        info!("Repairing macro");
        let system = format!(
            "You fix JavaScript macros. The previous macro failed.\nError: {}\n\n{}\n\n{}",
            error_message,
            rules(req.host_app),
            context_sections(req)
        );
        let code = if code.trim().is_empty() {
            "(no code was produced)".to_string()
        } else {
            truncate_chars(code.trim(), MAX_ORIGINAL_CHARS)
        };
        self.attempt(vec![
            ChatMessage::system(system.trim_end().to_string()),
            ChatMessage::user(format!(
                "User request:\n{}\n\nPrevious macro:\n{}\n\nReturn the corrected macro.",
                req.user_query, code
            )),
        ])
        .await
    }

    async fn attempt(&self, messages: Vec<ChatMessage>) -> MacroAttempt {
        let request = CompletionRequest::new(messages).fast().with_temperature(0.1);
        match tokio::time::timeout(self.timeout, self.llm.complete(request)).await {
            Ok(Ok(completion)) => {
                let result = finalise_macro(&completion.content);
                MacroAttempt {
                    raw: completion.content,
                    result,
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Macro LLM call failed");
                MacroAttempt {
                    raw: String::new(),
                    result: Err(e.into()),
                }
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Macro LLM call timed out");
                MacroAttempt {
                    raw: String::new(),
                    result: Err(MacroError::Timeout(self.timeout)),
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct MacroOutcome {
    pub code: String,
    pub repaired: bool,
}

#[derive(Debug)]
pub struct MacroFailure {
    pub error: MacroError,
    pub repaired: bool,
}

impl MacroFailure {
    pub fn user_message(&self) -> String {
        format!("{}\n[{}] {}", MACRO_FAILURE_MESSAGE, self.error.error_type(), self.error)
    }
}

/// Generate a macro, spending at most one repair call on failure.
pub async fn obtain_macro(
    generator: &MacroGenerator,
    req: &MacroRequest,
    budget: &mut RepairBudget,
) -> Result<MacroOutcome, MacroFailure> {
    let first = generator.generate(req).await;
    let error = match first.result {
        Ok(code) => {
            return Ok(MacroOutcome {
                code,
                repaired: false,
            })
        }
        Err(e) => e,
    };
    if !budget.try_acquire() {
        return Err(MacroFailure {
            error,
            repaired: false,
        });
    }
    let original = extract_code(&first.raw).unwrap_or_default();
    let repaired = generator.repair(req, &original, &error.to_string()).await;
    match repaired.result {
        Ok(code) => Ok(MacroOutcome {
            code,
            repaired: true,
        }),
        Err(e) => {
            warn!(error_type = e.error_type(), error = %e, "Macro repair failed");
            Err(MacroFailure {
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

    const GOOD: &str = "```javascript\nvar doc = Application.ActiveDocument;\ndoc.Range(0, 0).Text = \"hi\";\n```";
    const ARROW: &str = "```js\nvar f = () => 1;\n```";

    fn generator(replies: Vec<&str>) -> (Arc<ScriptedLlm>, MacroGenerator) {
        let llm = Arc::new(ScriptedLlm::new(replies));
        let gen = MacroGenerator::new(llm.clone(), Duration::from_secs(5));
        (llm, gen)
    }

    #[test]
    fn test_finalise_rejects_es6() {
        assert!(finalise_macro(GOOD).is_ok());
        let err = finalise_macro(ARROW).unwrap_err();
        assert_eq!(err.error_type(), "unsupported_syntax");
        assert!(err.to_string().contains("line 1: arrow function"));
        assert!(matches!(finalise_macro("   "), Err(MacroError::NoCode)));
    }

    #[tokio::test]
    async fn test_repair_once_then_success() {
        let (llm, gen) = generator(vec![ARROW, GOOD]);
        let req = MacroRequest::new("s", "插入问候语", HostApp::Wps);
        let mut budget = RepairBudget::new();
        let out = obtain_macro(&gen, &req, &mut budget).await.unwrap();
        assert!(out.repaired);
        assert_eq!(llm.calls(), 2);
        let repair_prompt = &llm.requests()[1].messages[0].content;
        assert!(repair_prompt.contains("arrow function"));
    }

    #[tokio::test]
    async fn test_at_most_one_repair() {
        let (llm, gen) = generator(vec![ARROW, ARROW, GOOD]);
        let req = MacroRequest::new("s", "x", HostApp::Et);
        let mut budget = RepairBudget::new();
        let failure = obtain_macro(&gen, &req, &mut budget).await.unwrap_err();
        assert!(failure.repaired);
        assert_eq!(llm.calls(), 2);
        assert!(failure.user_message().starts_with(MACRO_FAILURE_MESSAGE));
    }
}
