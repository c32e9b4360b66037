//! `ah32 route`: show the writeback decision for a message.

use anyhow::Result;
use serde_json::json;

use crate::cli::output::{flag, output_json, print_header, print_kv, OutputMode};
use crate::plan::schema::HostApp;
use crate::routing::{route, RouteInput};

pub fn handle_route(message: &str, host: &str, prior: Option<&str>, mode: OutputMode) -> Result<()> {
    let host_app = HostApp::from_name(host);
    let input = RouteInput {
        prior_context: prior.unwrap_or_default(),
        ..RouteInput::new(message, host_app)
    };
    let decision = route(&input);

    match mode {
        OutputMode::Json => output_json(&json!({
            "message": message,
            "host_app": host_app,
            "decision": decision,
        })),
        OutputMode::Human => {
            print_header("Routing decision");
            print_kv("host_app", host_app.map(|h| h.as_str()).unwrap_or("unsupported"));
            print_kv("want_writeback", &flag(decision.want_writeback));
            print_kv("anchor", decision.anchor.as_str());
            let delivery = match decision.delivery.as_str() {
                "" => "rewrite",
                other => other,
            };
            print_kv("delivery", delivery);
            print_kv("reason", &format!("{:?}", decision.reason));
        }
    }
    Ok(())
}
