//! Shared initialization logic for the HTTP server and CLI commands.

use std::sync::Arc;

use anyhow::Result;

use crate::agent::{builtin_tools, ChatAgent, ChatDeps, ChatOptions, ReactConfig, ToolRegistry};
use crate::config::Settings;
use crate::embedding::{ApiEmbeddingService, EmbeddingService};
use crate::feedback::{AuditLog, CodeQualityStore, Telemetry};
use crate::llm::openai::OpenAiClient;
use crate::llm::LlmClient;
use crate::macros::MacroGenerator;
use crate::memory::{MemoryConfig, MemoryManager, VectorMemory};
use crate::plan::generator::PlanGenerator;
use crate::skills::SkillRegistry;

/// Application context holding all services.
///
/// Built once at startup and shared as `Arc` by the HTTP handlers.
pub struct AppContext {
    pub settings: Settings,
    pub llm: Arc<dyn LlmClient>,
    pub embedding_service: Arc<dyn EmbeddingService>,
    pub vectors: VectorMemory,
    pub memory: Arc<MemoryManager>,
    pub skills: Arc<SkillRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub plan_generator: Arc<PlanGenerator>,
    pub macro_generator: Arc<MacroGenerator>,
    pub code_quality: Arc<CodeQualityStore>,
    pub audit: Arc<AuditLog>,
    pub telemetry: Arc<Telemetry>,
    pub chat: Arc<ChatAgent>,
}

impl AppContext {
    /// Initialize application context with the configured providers.
    pub async fn new(settings: Settings) -> Result<Self> {
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(settings.llm.clone())?);
        let embedding_service: Arc<dyn EmbeddingService> =
            Arc::new(ApiEmbeddingService::new(settings.embedding.clone())?);
        Self::with_services(settings, llm, embedding_service).await
    }

    /// Initialize with injected providers. Tests use this with a scripted
    /// model and the hash embedder.
    pub async fn with_services(
        settings: Settings,
        llm: Arc<dyn LlmClient>,
        embedding_service: Arc<dyn EmbeddingService>,
    ) -> Result<Self> {
        let root = settings.storage_root.clone();
        tracing::info!("Using storage root: {}", root.display());

        if embedding_service.is_available() {
            tracing::info!(model = embedding_service.model_name(), "Embedding service configured");
        } else {
            tracing::warn!("Embedding service not available, related memory disabled");
        }

        let vectors = VectorMemory::new(
            root.join("vectors"),
            embedding_service.clone(),
            settings.vector_write_mode,
        );
        let memory = Arc::new(MemoryManager::open(
            &root,
            settings.session_tail_limit,
            vectors.clone(),
            MemoryConfig::default(),
        )?);
        tracing::info!("Memory tiers opened");

        let skills = Arc::new(SkillRegistry::new(settings.skills_dir.clone()));
        skills.refresh_if_changed();
        tracing::info!(
            count = skills.skills().len(),
            dir = %settings.skills_dir.display(),
            "Skills loaded"
        );

        let tools = Arc::new(builtin_tools(vectors.clone()));
        let plan_generator = Arc::new(PlanGenerator::new(llm.clone(), settings.plan_timeout));
        let macro_generator = Arc::new(MacroGenerator::new(llm.clone(), settings.plan_timeout));

        let feedback_dir = root.join("feedback");
        let code_quality =
            Arc::new(CodeQualityStore::open(feedback_dir.join("code_quality.jsonl")).await);
        let audit = Arc::new(AuditLog::new(feedback_dir.join("audit.jsonl")));
        let telemetry = Arc::new(Telemetry::new(
            settings.telemetry_mode,
            root.join("telemetry.jsonl"),
        ));

        let chat = Arc::new(ChatAgent::new(
            ChatDeps {
                llm: llm.clone(),
                memory: memory.clone(),
                skills: skills.clone(),
                tools: tools.clone(),
                plan_generator: plan_generator.clone(),
                code_quality: code_quality.clone(),
                telemetry: telemetry.clone(),
            },
            ChatOptions {
                show_thinking: settings.show_thinking,
                max_chunk_chars: settings.sse_max_chunk_chars,
                rule_files: settings.rule_files.clone(),
                react: ReactConfig {
                    max_steps: settings.react_max_steps,
                    call_timeout: settings.llm.timeout,
                },
            },
        ));

        Ok(Self {
            settings,
            llm,
            embedding_service,
            vectors,
            memory,
            skills,
            tools,
            plan_generator,
            macro_generator,
            code_quality,
            audit,
            telemetry,
            chat,
        })
    }
}
