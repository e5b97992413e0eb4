//! Egress policy document: which destinations `open` may navigate to.
//!
//! Shape on disk: `{"open": {"allow_schemes": [..], "allow_about_blank": bool,
//! "allow_hosts": [..], "allow_host_suffixes": [..]}}`. Every field is optional.
//! A missing file is not an error; the conservative default is used instead.

use serde::Deserialize;
use std::path::Path;

use crate::error::GatewayError;

/// Root of the policy document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub open: OpenPolicyDoc,
}

/// Raw `open` section as written by the operator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenPolicyDoc {
    #[serde(default)]
    pub allow_schemes: Option<Vec<String>>,
    #[serde(default)]
    pub allow_about_blank: Option<bool>,
    #[serde(default)]
    pub allow_hosts: Option<Vec<String>>,
    #[serde(default)]
    pub allow_host_suffixes: Option<Vec<String>>,
}

/// Normalized egress policy used by [`crate::egress::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressPolicy {
    /// Lowercased scheme names without the trailing colon.
    pub allowed_schemes: Vec<String>,
    pub allow_about_blank: bool,
    /// Exact hostnames, lowercased. `None` or empty means no exact-host restriction.
    pub allow_hosts: Option<Vec<String>>,
    /// Suffixes, lowercased, each beginning with ".". Entries without the dot are dropped.
    pub allow_host_suffixes: Option<Vec<String>>,
}

impl Default for EgressPolicy {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            allow_about_blank: true,
            allow_hosts: None,
            allow_host_suffixes: None,
        }
    }
}

impl From<PolicyDocument> for EgressPolicy {
    fn from(doc: PolicyDocument) -> Self {
        let defaults = EgressPolicy::default();
        let open = doc.open;
        Self {
            allowed_schemes: open
                .allow_schemes
                .map(|v| {
                    v.iter()
                        .map(|s| s.trim().trim_end_matches(':').to_ascii_lowercase())
                        .collect()
                })
                .unwrap_or(defaults.allowed_schemes),
            allow_about_blank: open.allow_about_blank.unwrap_or(defaults.allow_about_blank),
            allow_hosts: open
                .allow_hosts
                .map(|v| v.iter().map(|h| h.trim().to_ascii_lowercase()).collect()),
            allow_host_suffixes: open.allow_host_suffixes.map(|v| {
                v.iter()
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| s.starts_with('.'))
                    .collect()
            }),
        }
    }
}

impl EgressPolicy {
    /// True when either host list is configured and non-empty.
    pub fn has_host_allowlist(&self) -> bool {
        self.allow_hosts.as_ref().is_some_and(|v| !v.is_empty())
            || self.allow_host_suffixes.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// Exact-host or suffix match. With no allowlist configured every host matches.
    /// A suffix entry ".example.com" matches subdomains only, never "example.com" itself.
    pub fn host_allowed(&self, hostname: &str) -> bool {
        if !self.has_host_allowlist() {
            return true;
        }
        let host = hostname.to_ascii_lowercase();
        if let Some(hosts) = &self.allow_hosts {
            if hosts.iter().any(|h| *h == host) {
                return true;
            }
        }
        if let Some(suffixes) = &self.allow_host_suffixes {
            if suffixes.iter().any(|s| host.ends_with(s.as_str())) {
                return true;
            }
        }
        false
    }
}

/// Read the policy document at `path`. Missing file => default policy.
/// An unreadable or malformed document is an error: the gateway never falls back to
/// permissive behaviour when the operator's policy cannot be understood.
pub async fn load_policy(path: &Path) -> Result<EgressPolicy, GatewayError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("policy file not found, using defaults: {}", path.display());
            return Ok(EgressPolicy::default());
        }
        Err(e) => {
            return Err(GatewayError::Policy(format!(
                "reading {}: {}",
                path.display(),
                e
            )))
        }
    };
    parse_policy(&raw).map_err(|e| GatewayError::Policy(format!("{}: {}", path.display(), e)))
}

/// Parse a policy document. The root must be a JSON object.
pub fn parse_policy(raw: &str) -> Result<EgressPolicy, String> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err("policy must be an object".to_string());
    }
    let doc: PolicyDocument = serde_json::from_value(value).map_err(|e| e.to_string())?;
    Ok(doc.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_http_https_without_host_restriction() {
        let p = EgressPolicy::default();
        assert_eq!(p.allowed_schemes, vec!["http", "https"]);
        assert!(p.allow_about_blank);
        assert!(!p.has_host_allowlist());
        assert!(p.host_allowed("anything.example"));
    }

    #[test]
    fn parse_fills_missing_fields_with_defaults() {
        let p = parse_policy(r#"{"open": {"allow_about_blank": false}}"#).unwrap();
        assert!(!p.allow_about_blank);
        assert_eq!(p.allowed_schemes, vec!["http", "https"]);
        let p = parse_policy("{}").unwrap();
        assert_eq!(p, EgressPolicy::default());
    }

    #[test]
    fn parse_rejects_non_object_root() {
        assert!(parse_policy("[]").is_err());
        assert!(parse_policy("not json").is_err());
    }

    #[test]
    fn host_allowlist_exact_and_suffix() {
        let exact = parse_policy(r#"{"open": {"allow_hosts": ["Example.com"]}}"#).unwrap();
        assert!(exact.host_allowed("example.com"));
        assert!(exact.host_allowed("EXAMPLE.COM"));
        assert!(!exact.host_allowed("sub.example.com"));

        let suffix = parse_policy(r#"{"open": {"allow_host_suffixes": [".example.com"]}}"#).unwrap();
        assert!(suffix.host_allowed("sub.example.com"));
        assert!(suffix.host_allowed("a.b.example.com"));
        assert!(!suffix.host_allowed("example.com"));
        assert!(!suffix.host_allowed("badexample.com"));
    }

    #[test]
    fn suffix_without_leading_dot_is_ignored() {
        let p = parse_policy(r#"{"open": {"allow_host_suffixes": ["example.com"]}}"#).unwrap();
        assert_eq!(p.allow_host_suffixes, Some(vec![]));
        assert!(!p.has_host_allowlist());
    }

    #[test]
    fn empty_lists_mean_no_restriction() {
        let p = parse_policy(r#"{"open": {"allow_hosts": [], "allow_host_suffixes": []}}"#).unwrap();
        assert!(p.host_allowed("example.org"));
    }

    #[tokio::test]
    async fn missing_file_loads_default() {
        let path = std::env::temp_dir().join(format!(
            "browser-shell-policy-missing-{}.json",
            uuid::Uuid::new_v4()
        ));
        let p = load_policy(&path).await.unwrap();
        assert_eq!(p, EgressPolicy::default());
    }

    #[tokio::test]
    async fn malformed_file_is_a_policy_error() {
        let path = std::env::temp_dir().join(format!(
            "browser-shell-policy-bad-{}.json",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "{oops").unwrap();
        let err = load_policy(&path).await.unwrap_err();
        assert!(matches!(err, GatewayError::Policy(_)));
        let _ = std::fs::remove_file(path);
    }
}
