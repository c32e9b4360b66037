//! Runtime settings loaded from a required `.env` file.
//!
//! Process environment variables override values from the file. Missing
//! `EMBEDDING_MODEL` or `LLM_API_KEY` is fatal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::embedding::EmbeddingConfig;
use crate::feedback::TelemetryMode;
use crate::llm::openai::LlmConfig;
use crate::memory::VectorWriteMode;
use crate::Ah32Error;

pub const DEFAULT_LLM_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PORT: u16 = 5123;

/// Every key read from the environment.
pub const KNOWN_KEYS: &[&str] = &[
    "EMBEDDING_MODEL",
    "EMBEDDING_API_BASE",
    "EMBEDDING_API_KEY",
    "LLM_API_KEY",
    "LLM_API_BASE",
    "LLM_MODEL",
    "LLM_FAST_MODEL",
    "LLM_TIMEOUT_SECS",
    "PLAN_TIMEOUT_SECS",
    "STORAGE_ROOT",
    "SKILLS_DIR",
    "CONVERSATION_RULE_FILES",
    "TELEMETRY_MODE",
    "CORS_ORIGINS",
    "HOST",
    "PORT",
    "SHOW_THINKING",
    "SSE_MAX_CHUNK_CHARS",
    "SESSION_TAIL_LIMIT",
    "VECTOR_WRITE_MODE",
    "REACT_MAX_STEPS",
];

/// Allowed CORS origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub plan_timeout: Duration,
    pub storage_root: PathBuf,
    pub skills_dir: PathBuf,
    pub rule_files: Vec<PathBuf>,
    pub telemetry_mode: TelemetryMode,
    pub cors_origins: CorsOrigins,
    pub host: String,
    pub port: u16,
    /// Admin switch; a request must also opt in to see thinking frames.
    pub show_thinking: bool,
    pub sse_max_chunk_chars: usize,
    pub session_tail_limit: usize,
    pub vector_write_mode: VectorWriteMode,
    pub react_max_steps: usize,
}

impl Settings {
    /// Load from `env_file`, letting the process environment override it.
    pub fn load(env_file: &Path) -> Result<Self, Ah32Error> {
        if !env_file.is_file() {
            return Err(Ah32Error::Config(format!(
                "Required env file not found: {}",
                env_file.display()
            )));
        }
        let iter = dotenvy::from_path_iter(env_file).map_err(|e| {
            Ah32Error::Config(format!("Failed to read {}: {}", env_file.display(), e))
        })?;
        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                Ah32Error::Config(format!("Invalid line in {}: {}", env_file.display(), e))
            })?;
            vars.insert(key, value);
        }
        for key in KNOWN_KEYS {
            if let Ok(value) = std::env::var(key) {
                vars.insert((*key).to_string(), value);
            }
        }
        Self::from_vars(&vars)
    }

    /// Build settings from already-merged variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, Ah32Error> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| {
            get(key).ok_or_else(|| Ah32Error::Config(format!("{} is required", key)))
        };

        let llm_api_key = required("LLM_API_KEY")?;
        let embedding_model = required("EMBEDDING_MODEL")?;
        let llm_api_base = get("LLM_API_BASE").unwrap_or_else(|| DEFAULT_LLM_API_BASE.to_string());
        let model = get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());
        let llm_timeout = Duration::from_secs(parse_or(vars, "LLM_TIMEOUT_SECS", 60u64)?);

        let storage_root = match get("STORAGE_ROOT") {
            Some(root) => expand_home(&root),
            None => dirs::home_dir()
                .map(|h| h.join(".ah32"))
                .unwrap_or_else(|| PathBuf::from(".ah32")),
        };
        let skills_dir = get("SKILLS_DIR")
            .map(|d| expand_home(&d))
            .unwrap_or_else(|| storage_root.join("skills"));

        let rule_files = get("CONVERSATION_RULE_FILES")
            .map(|v| {
                v.split([';', ','])
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(expand_home)
                    .collect()
            })
            .unwrap_or_default();

        let telemetry_mode = match get("TELEMETRY_MODE") {
            Some(v) => TelemetryMode::from_name(&v).ok_or_else(|| {
                Ah32Error::Config(format!("TELEMETRY_MODE must be off, log or file, got '{}'", v))
            })?,
            None => TelemetryMode::Log,
        };
        let vector_write_mode = match get("VECTOR_WRITE_MODE") {
            Some(v) => VectorWriteMode::from_name(&v).ok_or_else(|| {
                Ah32Error::Config(format!("VECTOR_WRITE_MODE must be async or sync, got '{}'", v))
            })?,
            None => VectorWriteMode::Async,
        };

        let cors_origins = match get("CORS_ORIGINS") {
            Some(v) if v != "*" => CorsOrigins::List(
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => {
                warn!("CORS_ORIGINS not restricted; any origin may call the API");
                CorsOrigins::Any
            }
        };

        Ok(Self {
            llm: LlmConfig {
                api_base: llm_api_base.clone(),
                api_key: llm_api_key.clone(),
                fast_model: get("LLM_FAST_MODEL").unwrap_or_else(|| model.clone()),
                model,
                timeout: llm_timeout,
            },
            embedding: EmbeddingConfig {
                model: embedding_model,
                api_base: get("EMBEDDING_API_BASE").unwrap_or(llm_api_base),
                api_key: get("EMBEDDING_API_KEY").unwrap_or(llm_api_key),
                timeout: llm_timeout,
            },
            plan_timeout: Duration::from_secs(parse_or(vars, "PLAN_TIMEOUT_SECS", 45u64)?),
            storage_root,
            skills_dir,
            rule_files,
            telemetry_mode,
            cors_origins,
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(vars, "PORT", DEFAULT_PORT)?,
            show_thinking: parse_bool(vars, "SHOW_THINKING")?,
            sse_max_chunk_chars: parse_or(vars, "SSE_MAX_CHUNK_CHARS", 600usize)?.max(1),
            session_tail_limit: parse_or(vars, "SESSION_TAIL_LIMIT", 200usize)?.max(1),
            vector_write_mode,
            react_max_steps: parse_or(vars, "REACT_MAX_STEPS", 3usize)?,
        })
    }

    /// `HOST:PORT` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: FromStr>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T, Ah32Error> {
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse()
            .map_err(|_| Ah32Error::Config(format!("{} has invalid value '{}'", key, v))),
        None => Ok(default),
    }
}

fn parse_bool(vars: &HashMap<String, String>, key: &str) -> Result<bool, Ah32Error> {
    match vars.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "" | "0" | "false" | "no" | "off" => Ok(false),
            "1" | "true" | "yes" | "on" => Ok(true),
            _ => Err(Ah32Error::Config(format!("{} must be a boolean, got '{}'", key, v))),
        },
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
