//! HTTP API consumed by the WPS task pane.
//!
//! Everything lives under `/agentic` except `/health`.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::CorsOrigins;
use crate::init::AppContext;

pub use error::ApiError;

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    match origins {
        CorsOrigins::Any => layer.allow_origin(Any),
        CorsOrigins::List(list) => {
            let parsed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|o| match o.parse() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!(origin = %o, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(parsed)
        }
    }
}

/// Build the router with all routes and CORS applied.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let agentic = Router::new()
        .route("/chat/stream", post(handlers::chat::chat_stream))
        .route("/session/generate", post(handlers::chat::generate_session))
        .route("/plan/generate", post(handlers::plan::generate_plan))
        .route("/plan/repair", post(handlers::plan::repair_plan))
        .route("/plan/schema", get(handlers::plan::plan_schema))
        .route("/js-macro/generate", post(handlers::js_macro::generate_macro))
        .route("/js-macro/repair", post(handlers::js_macro::repair_macro))
        .route("/error/report", post(handlers::feedback::report_error))
        .route("/audit/record", post(handlers::feedback::record_audit));

    let cors = cors_layer(&ctx.settings.cors_origins);
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/agentic", agentic)
        .layer(cors)
        .with_state(ctx)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Bind and serve until Ctrl-C, then flush pending vector writes.
pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let addr = ctx.settings.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("AH32 listening on http://{}", addr);

    axum::serve(listener, router(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    ctx.vectors.flush().await;
    info!("Server stopped");
    Ok(())
}
