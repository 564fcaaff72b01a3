//! Template variable substitution.
//!
//! Replaces `{{name}}` placeholders with values drawn from a task and an
//! execution, plus a `{{date:FORMAT}}` family with strftime tokens.
//! Unknown placeholders are left verbatim; substituted values are not
//! re-scanned.

use std::sync::OnceLock;

use chrono::Utc;
use regex::{Captures, Regex};

use crate::domain::models::{Execution, Task};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder regex"))
}

/// Resolve all recognized placeholders in `template`.
pub fn resolve(template: &str, task: &Task, execution: &Execution) -> String {
    placeholder_re()
        .replace_all(template, |caps: &Captures<'_>| {
            let name = caps[1].trim();
            match lookup(name, task, execution) {
                Some(value) => value,
                // Unknown placeholder: keep the original text.
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn lookup(name: &str, task: &Task, execution: &Execution) -> Option<String> {
    if let Some(format) = name.strip_prefix("date:") {
        return Some(Utc::now().format(format).to_string());
    }
    let value = match name {
        "task.id" => task.id.to_string(),
        "task.name" => task.name.clone(),
        "task.type" => task.kind().as_str().to_string(),
        "execution.id" => execution.id.to_string(),
        "execution.status" => execution.status.as_str().to_string(),
        "execution.started_at" => execution
            .started_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
        "execution.completed_at" => execution
            .completed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
        "execution.duration_ms" => execution
            .duration_ms
            .map(|d| d.to_string())
            .unwrap_or_default(),
        _ => return None,
    };
    Some(value)
}
