//! Argument normalizer: turns caller-supplied JSON values into argv tokens.
//! Pure; every failure is a validation error and nothing is truncated.

use serde_json::Value;
use std::time::Duration;

use crate::error::GatewayError;

/// Maximum number of arguments after the subcommand.
pub const MAX_ARGS: usize = 128;

/// Maximum characters per argument.
pub const MAX_ARG_CHARS: usize = 8192;

/// Timeout bounds in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 120_000;

/// Flags the gateway sets itself (control port, output mode, session) or never allows.
/// Matched exactly or as `flag=value`.
pub const FORBIDDEN_FLAGS: &[&str] = &[
    "--cdp",
    "--json",
    "--session",
    "--headers",
    "--executable-path",
    "--extension",
    "--headed",
    "--debug",
    "--full",
    "-f",
];

/// Normalize every item and check the combined shape.
pub fn normalize(raw: &[Value]) -> Result<Vec<String>, GatewayError> {
    if raw.len() > MAX_ARGS {
        return Err(GatewayError::validation(format!(
            "too many arguments (max {})",
            MAX_ARGS
        )));
    }
    raw.iter()
        .enumerate()
        .map(|(i, v)| normalize_one(i, v))
        .collect()
}

fn normalize_one(index: usize, value: &Value) -> Result<String, GatewayError> {
    let s = value_to_token(value).ok_or_else(|| {
        GatewayError::validation(format!(
            "argument {} must be a string, number, or boolean",
            index
        ))
    })??;
    check_token(index, &s)?;
    Ok(s)
}

/// `None` for unsupported types; `Some(Err)` for numbers that cannot be rendered.
fn value_to_token(v: &Value) -> Option<Result<String, GatewayError>> {
    match v {
        Value::String(s) => Some(Ok(s.clone())),
        Value::Bool(b) => Some(Ok(b.to_string())),
        Value::Number(n) => Some(number_to_token(n)),
        _ => None,
    }
}

fn number_to_token(n: &serde_json::Number) -> Result<String, GatewayError> {
    if let Some(i) = n.as_i64() {
        return Ok(i.to_string());
    }
    if let Some(u) = n.as_u64() {
        return Ok(u.to_string());
    }
    let f = n
        .as_f64()
        .filter(|f| f.is_finite())
        .ok_or_else(|| GatewayError::validation("numeric argument must be finite"))?;
    // 3.0 is passed as "3", not "3.0".
    if f.fract() == 0.0 && f.abs() < 1e15 {
        Ok(format!("{}", f as i64))
    } else {
        Ok(f.to_string())
    }
}

fn check_token(index: usize, s: &str) -> Result<(), GatewayError> {
    if s.chars().count() > MAX_ARG_CHARS {
        return Err(GatewayError::validation(format!(
            "argument {} too long (max {} chars)",
            index, MAX_ARG_CHARS
        )));
    }
    if s.contains('\0') {
        return Err(GatewayError::validation(format!(
            "argument {} contains NUL byte",
            index
        )));
    }
    if s.contains(['\r', '\n']) {
        return Err(GatewayError::validation(format!(
            "argument {} contains newline characters",
            index
        )));
    }
    if let Some(flag) = forbidden_flag(s) {
        return Err(GatewayError::validation(format!("flag not allowed: {}", flag)));
    }
    Ok(())
}

/// The forbidden flag `s` would set, if any.
pub fn forbidden_flag(s: &str) -> Option<&'static str> {
    FORBIDDEN_FLAGS.iter().copied().find(|flag| {
        s == *flag
            || s
                .strip_prefix(*flag)
                .is_some_and(|rest| rest.starts_with('='))
    })
}

/// Resolve `timeout_sec` (absent or null => `default_sec`) into a clamped duration.
pub fn resolve_timeout(raw: Option<&Value>, default_sec: u64) -> Result<Duration, GatewayError> {
    let secs = match raw {
        None | Some(Value::Null) => default_sec as f64,
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .ok_or_else(|| GatewayError::validation("timeout_sec must be a finite number"))?,
        Some(_) => return Err(GatewayError::validation("timeout_sec must be a number")),
    };
    let ms = (secs * 1000.0).round().clamp(MIN_TIMEOUT_MS as f64, MAX_TIMEOUT_MS as f64);
    Ok(Duration::from_millis(ms as u64))
}
