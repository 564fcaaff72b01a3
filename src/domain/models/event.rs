//! Hook events delivered to the router.
//!
//! External tools (editors, shells, hook invocations) report events with a
//! free-form context payload. Tasks subscribe to event types and filter on
//! context fields.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of event types the router recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEventType {
    /// A file was written to disk.
    FileSaved,
    /// A session (editor, agent, shell) started.
    SessionStart,
    /// A session ended.
    SessionEnd,
    /// A tool is about to be invoked.
    ToolPre,
    /// A tool invocation returned.
    ToolPost,
    /// A cron timer tick, always task-scoped.
    CronTick,
    /// A manual trigger request.
    Manual,
}

impl HookEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileSaved => "file_saved",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::ToolPre => "tool_pre",
            Self::ToolPost => "tool_post",
            Self::CronTick => "cron_tick",
            Self::Manual => "manual",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "file_saved" => Some(Self::FileSaved),
            "session_start" => Some(Self::SessionStart),
            "session_end" => Some(Self::SessionEnd),
            "tool_pre" => Some(Self::ToolPre),
            "tool_post" => Some(Self::ToolPost),
            "cron_tick" => Some(Self::CronTick),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// String-keyed bag of primitive values attached to a dispatch.
///
/// Kept untyped at the core boundary; handlers that expect specific keys
/// (the retry handler expects `retry_count`, etc.) produce their own typed
/// views.
pub type EventContext = HashMap<String, Value>;

/// Read a context value as a string, accepting bare strings and numbers.
pub fn context_str(context: &EventContext, key: &str) -> Option<String> {
    match context.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a context value as an unsigned integer.
pub fn context_u32(context: &EventContext, key: &str) -> Option<u32> {
    match context.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_round_trip() {
        for ev in [
            HookEventType::FileSaved,
            HookEventType::SessionStart,
            HookEventType::SessionEnd,
            HookEventType::ToolPre,
            HookEventType::ToolPost,
            HookEventType::CronTick,
            HookEventType::Manual,
        ] {
            assert_eq!(HookEventType::from_str(ev.as_str()), Some(ev));
        }
        assert_eq!(HookEventType::from_str("no_such_event"), None);
    }

    #[test]
    fn test_context_accessors() {
        let mut ctx = EventContext::new();
        ctx.insert("file_path".into(), json!("src/a.ts"));
        ctx.insert("retry_count".into(), json!(2));

        assert_eq!(context_str(&ctx, "file_path").as_deref(), Some("src/a.ts"));
        assert_eq!(context_u32(&ctx, "retry_count"), Some(2));
        assert_eq!(context_u32(&ctx, "file_path"), None);
        assert_eq!(context_str(&ctx, "missing"), None);
    }
}
