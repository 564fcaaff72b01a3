//! Outcome handlers.
//!
//! Each task carries an ordered list of handlers that run after every
//! execution reaches a terminal state: retry scheduling, file output,
//! and chained task triggers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Linear,
    Exponential,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Which terminal outcomes a retry handler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    Failure,
    Timeout,
    Any,
}

impl Default for RetryOn {
    fn default() -> Self {
        Self::Failure
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

/// Retry handler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub on: RetryOn,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            on: RetryOn::default(),
        }
    }
}

impl RetryConfig {
    /// Delay before the given attempt (1-based), clamped to `max_delay_ms`.
    ///
    /// Linear: `initial * attempt`. Exponential: `initial * 2^(attempt-1)`.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1);
        let raw = match self.backoff {
            Backoff::Linear => self.initial_delay_ms.saturating_mul(u64::from(attempt)),
            Backoff::Exponential => {
                let shift = (attempt - 1).min(63);
                self.initial_delay_ms.saturating_mul(1u64 << shift)
            }
        };
        raw.min(self.max_delay_ms)
    }
}

/// Output file format for the file handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Text,
    Json,
    Markdown,
}

impl Default for FileFormat {
    fn default() -> Self {
        Self::Text
    }
}

/// File handler configuration. `path` is a template resolved against the
/// task and execution at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    pub path: String,
    #[serde(default)]
    pub append: bool,
    #[serde(default)]
    pub format: FileFormat,
}

/// A post-execution action. Handlers run sequentially in declared order;
/// a handler failure never aborts the remaining handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Handler {
    Retry(RetryConfig),
    File(FileConfig),
    Trigger { task_id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delay() {
        let cfg = RetryConfig {
            backoff: Backoff::Linear,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            ..Default::default()
        };
        assert_eq!(cfg.delay_ms(1), 100);
        assert_eq!(cfg.delay_ms(2), 200);
        assert_eq!(cfg.delay_ms(3), 300);
    }

    #[test]
    fn test_exponential_delay() {
        let cfg = RetryConfig {
            backoff: Backoff::Exponential,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            ..Default::default()
        };
        assert_eq!(cfg.delay_ms(1), 100);
        assert_eq!(cfg.delay_ms(2), 200);
        assert_eq!(cfg.delay_ms(3), 400);
        assert_eq!(cfg.delay_ms(4), 800);
    }

    #[test]
    fn test_delay_clamped_to_max() {
        let cfg = RetryConfig {
            backoff: Backoff::Exponential,
            initial_delay_ms: 1_000,
            max_delay_ms: 3_000,
            ..Default::default()
        };
        assert_eq!(cfg.delay_ms(1), 1_000);
        assert_eq!(cfg.delay_ms(2), 2_000);
        assert_eq!(cfg.delay_ms(3), 3_000);
        assert_eq!(cfg.delay_ms(10), 3_000);
        // Large attempt numbers must not overflow.
        assert_eq!(cfg.delay_ms(u32::MAX), 3_000);
    }

    #[test]
    fn test_handler_serde_shape() {
        let handler = Handler::File(FileConfig {
            path: "out/{{task.name}}.md".into(),
            append: true,
            format: FileFormat::Markdown,
        });
        let json = serde_json::to_value(&handler).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["format"], "markdown");

        let back: Handler = serde_json::from_value(json).unwrap();
        assert_eq!(back, handler);
    }
}
