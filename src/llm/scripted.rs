//! Deterministic [`LlmClient`] that replays queued responses.
//!
//! Lets the chat agent and the plan pipeline run without a provider.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{Completion, CompletionRequest, LlmClient, ModelTier, Usage};
use crate::Ah32Error;

enum Scripted {
    Reply(String),
    Fail(String),
}

#[derive(Default)]
pub struct ScriptedLlm {
    queue: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
    fallback: Option<String>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(replies.into_iter().map(|r| Scripted::Reply(r.into())).collect()),
            ..Default::default()
        }
    }

    /// Reply used once the queue is drained.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Scripted::Reply(reply.into()));
        }
    }

    pub fn push_error(&self, message: impl Into<String>) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Scripted::Fail(message.into()));
        }
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, Ah32Error> {
        let prompt_tokens = request
            .messages
            .iter()
            .map(|m| m.content.chars().count() as u64)
            .sum();
        if let Ok(mut r) = self.requests.lock() {
            r.push(request);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        let content = match next {
            Some(Scripted::Reply(text)) => text,
            Some(Scripted::Fail(message)) => return Err(Ah32Error::Llm(message)),
            None => match &self.fallback {
                Some(text) => text.clone(),
                None => return Err(Ah32Error::Llm("scripted replies exhausted".to_string())),
            },
        };
        let completion_tokens = content.chars().count() as u64;
        Ok(Completion {
            content,
            reasoning: None,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }

    fn model_name(&self, tier: ModelTier) -> String {
        match tier {
            ModelTier::Default => "scripted".to_string(),
            ModelTier::Fast => "scripted-fast".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    #[tokio::test]
    async fn test_replays_in_order_then_fails() {
        let llm = ScriptedLlm::new(["one", "two"]);
        let req = || CompletionRequest::new(vec![ChatMessage::user("q")]);
        assert_eq!(llm.complete(req()).await.unwrap().content, "one");
        assert_eq!(llm.complete(req()).await.unwrap().content, "two");
        assert!(llm.complete(req()).await.is_err());
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn test_fallback_and_errors() {
        let llm = ScriptedLlm::new(Vec::<String>::new()).with_fallback("ok");
        llm.push_error("boom");
        let req = CompletionRequest::new(vec![ChatMessage::user("q")]);
        assert!(matches!(llm.complete(req.clone()).await, Err(Ah32Error::Llm(m)) if m == "boom"));
        assert_eq!(llm.complete(req).await.unwrap().content, "ok");
    }
}
