//! Hook-event delivery handler.
//!
//! `taskforge hook-event <event_type> [context_json]` with stdin fallback.
//! Exit 0 on success, 1 on parse/dispatch error. An unknown event type is
//! an unmatched event (no subscribers) and succeeds.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

use crate::domain::models::{EventContext, HookEventType};
use crate::services::Runtime;

pub async fn handle_hook_event(
    runtime: &Runtime,
    event_type: String,
    context: Option<String>,
) -> Result<()> {
    let raw = match context {
        Some(raw) => raw,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("failed to read context from stdin")?;
            buffer
        }
    };
    let raw = raw.trim();
    let context: EventContext = if raw.is_empty() {
        EventContext::new()
    } else {
        serde_json::from_str(raw).context("context is not a JSON object")?
    };

    let Some(event) = HookEventType::from_str(&event_type) else {
        // Unknown event types have no subscribers by definition.
        tracing::debug!(event_type, "Unknown event type, nothing to dispatch");
        return Ok(());
    };

    runtime.router.handle_event(event, context).await;

    if !runtime.drain(Duration::from_secs(600)).await {
        tracing::warn!("Exiting with dispatch work still pending");
    }
    Ok(())
}
