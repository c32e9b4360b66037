//! `ah32 session-id`: derive the session id a task pane would get.

use anyhow::Result;
use serde_json::json;

use crate::cli::output::{output_json, print_kv, OutputMode};
use crate::memory::DocumentIdentity;

pub fn handle_session_id(
    document: DocumentIdentity,
    host: Option<&str>,
    client: Option<&str>,
    mode: OutputMode,
) -> Result<()> {
    let document = document.resolve_local();
    let session_id = document.session_id(host, client);
    let key = document.document_key();

    match mode {
        OutputMode::Json => output_json(&json!({
            "session_id": session_id,
            "document_key": key,
        })),
        OutputMode::Human => {
            print_kv("session_id", &session_id);
            print_kv("document_key", key.as_deref().unwrap_or("(anonymous)"));
        }
    }
    Ok(())
}
