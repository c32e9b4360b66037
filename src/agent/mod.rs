//! Conversational agent: tools, the ReAct loop and the streamed chat turn.

pub mod chat;
pub mod react;
pub mod tools;

pub use chat::{
    ChatAgent, ChatDeps, ChatOptions, ChatRequest, FrameKind, StreamFrame, TurnSummary,
    UNSUPPORTED_HOST_MESSAGE,
};
pub use react::{run_react, ReactConfig, ReactOutcome};
pub use tools::{builtin_tools, Tool, ToolContext, ToolRegistry};
