//! Test harness for application lifecycle management.
//!
//! Provides an isolated storage root per test using tempfile, with the
//! chat model replaced by a scripted client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;

use ah32::agent::{StreamFrame, TurnSummary};
use ah32::config::Settings;
use ah32::embedding::{EmbeddingService, HashEmbeddingService};
use ah32::init::AppContext;
use ah32::llm::ScriptedLlm;
use ah32::Ah32Error;

/// Test harness that owns a temporary storage root.
///
/// Everything under the root is removed when the harness is dropped.
pub struct TestHarness {
    pub ctx: Arc<AppContext>,
    pub llm: Arc<ScriptedLlm>,
    /// Temporary directory (kept alive while harness exists)
    pub temp_dir: TempDir,
}

impl TestHarness {
    /// Harness whose model replays `replies` in order.
    pub async fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_llm(ScriptedLlm::new(replies), &[]).await
    }

    /// Harness with a prepared model and extra settings.
    pub async fn with_llm(llm: ScriptedLlm, overrides: &[(&str, &str)]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_string_lossy().into_owned();

        let mut vars: HashMap<String, String> = [
            ("LLM_API_KEY", "sk-test"),
            ("EMBEDDING_MODEL", "hash-64"),
            ("TELEMETRY_MODE", "file"),
            ("VECTOR_WRITE_MODE", "sync"),
            ("SSE_MAX_CHUNK_CHARS", "40"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        vars.insert("STORAGE_ROOT".into(), root);
        for (k, v) in overrides {
            vars.insert(k.to_string(), v.to_string());
        }
        let settings = Settings::from_vars(&vars).expect("Failed to build test settings");

        let llm = Arc::new(llm);
        let embedder: Arc<dyn EmbeddingService> = Arc::new(HashEmbeddingService::new(64));
        let ctx = AppContext::with_services(settings, llm.clone(), embedder)
            .await
            .expect("Failed to initialize app context");

        Self {
            ctx: Arc::new(ctx),
            llm,
            temp_dir,
        }
    }

    /// Get the path to the temporary storage root.
    pub fn temp_path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    /// Run a chat turn and collect every frame it sent.
    pub async fn run_turn(
        &self,
        req: ah32::agent::ChatRequest,
    ) -> (Result<TurnSummary, Ah32Error>, Vec<StreamFrame>) {
        let (tx, mut rx) = mpsc::channel(256);
        let result = self.ctx.chat.run_turn(req, tx).await;
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        (result, frames)
    }

    /// Serve the HTTP API on an ephemeral port.
    pub async fn spawn_server(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("listener has an address");
        let app = ah32::server::router(self.ctx.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }
}
