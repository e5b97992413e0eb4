//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.browser-shell/config.json`) and environment.
//! The egress policy document is separate (see [`crate::policy`]) and re-read per call.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP/SSE transport settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Wrapped automation tool settings.
    #[serde(default)]
    pub tool: ToolConfig,

    /// Egress policy document location.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// HTTP bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and SSE (default 8079).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Allow binding to a non-loopback address. The gateway has no auth of its own.
    #[serde(default)]
    pub allow_remote: bool,
}

fn default_gateway_port() -> u16 {
    8079
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            allow_remote: false,
        }
    }
}

/// How the wrapped tool is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    /// Binary name or path (default "agent-browser").
    #[serde(default = "default_tool_binary")]
    pub binary: PathBuf,

    /// Fixed CDP port passed as `--cdp`. Never caller controlled.
    #[serde(default = "default_cdp_port")]
    pub cdp_port: u16,

    /// Timeout used when the caller does not pass `timeout_sec`.
    #[serde(default = "default_timeout_sec")]
    pub default_timeout_sec: u64,

    /// Extra environment for the child, on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_tool_binary() -> PathBuf {
    PathBuf::from("agent-browser")
}

fn default_cdp_port() -> u16 {
    9222
}

fn default_timeout_sec() -> u64 {
    30
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: default_tool_binary(),
            cdp_port: default_cdp_port(),
            default_timeout_sec: default_timeout_sec(),
            env: BTreeMap::new(),
        }
    }
}

/// Where the egress policy document lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    #[serde(default = "default_policy_path")]
    pub path: PathBuf,
}

fn default_policy_path() -> PathBuf {
    PathBuf::from("/etc/agent-browser/browser-shell.policy.json")
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            path: default_policy_path(),
        }
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("BROWSER_SHELL_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".browser-shell").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Resolve the policy document path: env BROWSER_SHELL_POLICY_PATH overrides config.
pub fn resolve_policy_path(config: &Config) -> PathBuf {
    std::env::var("BROWSER_SHELL_POLICY_PATH")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config.policy.path.clone())
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    if b == "localhost" {
        return true;
    }
    b.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<std::net::IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.gateway.port, 8079);
        assert_eq!(c.gateway.bind, "127.0.0.1");
        assert!(!c.gateway.allow_remote);
        assert_eq!(c.tool.binary, PathBuf::from("agent-browser"));
        assert_eq!(c.tool.cdp_port, 9222);
        assert_eq!(c.tool.default_timeout_sec, 30);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: Config =
            serde_json::from_str(r#"{"tool": {"cdpPort": 9333, "env": {"A": "b"}}}"#).unwrap();
        assert_eq!(c.tool.cdp_port, 9333);
        assert_eq!(c.tool.binary, PathBuf::from("agent-browser"));
        assert_eq!(c.tool.env.get("A").map(String::as_str), Some("b"));
        assert_eq!(c.gateway.port, 8079);
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind("127.0.0.2"));
        assert!(is_loopback_bind("::1"));
        assert!(is_loopback_bind("[::1]"));
        assert!(is_loopback_bind("localhost"));
        assert!(!is_loopback_bind("0.0.0.0"));
        assert!(!is_loopback_bind("10.0.0.5"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join(format!(
            "browser-shell-config-missing-{}.json",
            uuid::Uuid::new_v4()
        ));
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(c.gateway.port, 8079);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!(
            "browser-shell-config-bad-{}.json",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "{not json").unwrap();
        let err = load_config(Some(path.clone())).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config"));
        let _ = std::fs::remove_file(path);
    }
}
