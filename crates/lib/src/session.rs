//! Caller session identifiers.
//!
//! A session names one logical caller. It is never persisted: the id is only used to
//! route responses (HTTP/SSE) and is forwarded to the wrapped tool as `--session <id>`,
//! so the allowed alphabet is kept narrow enough to be safe as a single argv item.

use std::fmt;

use crate::error::GatewayError;

/// Maximum length of a session id.
pub const MAX_SESSION_ID_LEN: usize = 64;

/// Validated session identifier: 1..=64 characters from `[A-Za-z0-9._-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Validate a raw id. Fails with a validation error naming the allowed alphabet.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        if raw.contains('\0') {
            return Err(GatewayError::validation("session_id contains NUL byte"));
        }
        if raw.contains(['\r', '\n']) {
            return Err(GatewayError::validation(
                "session_id contains newline characters",
            ));
        }
        if !is_valid_session_id(raw) {
            return Err(GatewayError::validation(format!(
                "invalid session_id (allowed: [a-zA-Z0-9._-], max {})",
                MAX_SESSION_ID_LEN
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_valid_session_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_SESSION_ID_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_alphabet() {
        for id in ["s1", "a.b_c-d", "ABC123", &"x".repeat(64)] {
            assert_eq!(SessionId::parse(id).unwrap().as_str(), id);
        }
    }

    #[test]
    fn rejects_bad_ids() {
        for id in ["", "bad session", "a/b", "ümlaut", &"x".repeat(65), "a\nb", "a\0b"] {
            assert!(SessionId::parse(id).is_err(), "{id:?} should be rejected");
        }
    }

    #[test]
    fn error_mentions_alphabet() {
        let err = SessionId::parse("bad session").unwrap_err();
        assert!(err.to_string().contains("invalid session_id"));
    }
}
