//! Streaming chat turns and session ids.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::unfold;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::agent::{ChatRequest, StreamFrame};
use crate::init::AppContext;
use crate::memory::DocumentIdentity;

/// Frames buffered between the turn task and the SSE writer.
const FRAME_BUFFER: usize = 64;

/// POST /agentic/chat/stream
///
/// The turn runs in its own task. Dropping the connection closes the
/// receiver but the turn still completes and is persisted.
#[instrument(skip_all)]
pub async fn chat_stream(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let (tx, rx) = mpsc::channel::<StreamFrame>(FRAME_BUFFER);
    let agent = ctx.chat.clone();
    tokio::spawn(async move {
        if let Err(e) = agent.run_turn(req, tx).await {
            debug!(error = %e, "Chat turn ended with error");
        }
    });

    let stream = unfold(rx, |mut rx| async move {
        let frame = rx.recv().await?;
        let data = serde_json::to_string(&frame).unwrap_or_default();
        Some((Ok::<_, Infallible>(Event::default().data(data)), rx))
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    #[serde(default, alias = "hostApp")]
    pub host_app: Option<String>,
    #[serde(default, alias = "clientId")]
    pub client_id: Option<String>,
    #[serde(flatten)]
    pub document: DocumentIdentity,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub document_key: Option<String>,
}

/// POST /agentic/session/generate
pub async fn generate_session(Json(req): Json<SessionRequest>) -> Json<SessionResponse> {
    let document = req.document.resolve_local();
    Json(SessionResponse {
        session_id: document.session_id(req.host_app.as_deref(), req.client_id.as_deref()),
        document_key: document.document_key(),
    })
}
