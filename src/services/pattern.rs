//! Pattern matching for trigger filters.
//!
//! A pattern is one of three shapes, dispatched on syntax:
//! - delimited regex: `/^src\/.*\.rs$/`
//! - extension: `.rs` (suffix match)
//! - glob (default): `**/*.rs`, `src/?.ts`, `[ab]*.md`

use globset::Glob;
use regex::Regex;

/// Whether `value` matches `pattern`. Invalid regex or glob syntax never
/// propagates to callers; it logs and counts as no match.
pub fn matches(value: &str, pattern: &str) -> bool {
    if let Some(expr) = pattern
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
        .filter(|_| pattern.len() >= 2)
    {
        return match Regex::new(expr) {
            Ok(re) => re.is_match(value),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Invalid regex pattern, treating as no match");
                false
            }
        };
    }

    if pattern.starts_with('.') {
        return value.ends_with(pattern);
    }

    match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(value),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Invalid glob pattern, treating as no match");
            false
        }
    }
}

/// OR over a pattern family. An empty family matches nothing.
pub fn matches_any(value: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| matches(value, p))
}

/// AND over a pattern family.
pub fn matches_all(value: &str, patterns: &[String]) -> bool {
    patterns.iter().all(|p| matches(value, p))
}
