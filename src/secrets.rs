//! Secret redaction and log scrubbing.
//!
//! `SecretString` wraps sensitive values (API keys, tokens) so they never
//! print in `Debug`/`Display` output, even accidentally via `{:?}` in a log
//! line. `scrub` redacts recognizable secret patterns from arbitrary text
//! before it is sent to the chat transport or written to a log sink.

use std::fmt;

/// A string that never reveals its contents through `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Named loudly so call sites are greppable.
    pub fn unsecure(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Regex patterns for secret families that might leak into log or chat text.
fn patterns() -> &'static [regex::Regex] {
    use std::sync::OnceLock;
    static PATTERNS: OnceLock<Vec<regex::Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"sk-[A-Za-z0-9]{16,}",
            r"AIza[A-Za-z0-9_\-]{20,}",
            r"\d{9,10}:[A-Za-z0-9_-]{30,}",
            r"ghp_[A-Za-z0-9]{30,}",
            r"(?i)bearer\s+[A-Za-z0-9._\-]{10,}",
        ]
        .iter()
        .map(|p| regex::Regex::new(p).expect("static secret pattern is valid"))
        .collect()
    })
}

/// Replace any recognizable secret substrings in `text` with `[REDACTED]`.
pub fn scrub(text: &str) -> String {
    let mut out = text.to_string();
    for pattern in patterns() {
        out = pattern.replace_all(&out, "[REDACTED]").into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_string_never_prints_value() {
        let s = SecretString::new("sk-abcdef1234567890");
        assert_eq!(format!("{s:?}"), "[REDACTED]");
        assert_eq!(format!("{s}"), "[REDACTED]");
        assert_eq!(s.unsecure(), "sk-abcdef1234567890");
    }

    #[test]
    fn scrub_redacts_openai_style_keys() {
        let text = "using key sk-abcdefghijklmnopqrst for this call";
        assert!(!scrub(text).contains("sk-abcdefghijklmnopqrst"));
    }

    #[test]
    fn scrub_redacts_telegram_bot_tokens() {
        let text = "token=123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw done";
        assert!(!scrub(text).contains("AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw"));
    }

    #[test]
    fn scrub_leaves_ordinary_text_untouched() {
        let text = "the task completed successfully";
        assert_eq!(scrub(text), text);
    }
}
