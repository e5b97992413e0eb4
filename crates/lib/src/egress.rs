//! Egress URL policy and SSRF protection for the `open` subcommand.
//!
//! Validates the scheme, rejects localhost and private/internal targets (IP literals
//! directly, hostnames after DNS resolution), and enforces the optional host allowlist.
//!
//! The DNS check is point-in-time: the wrapped tool resolves the hostname again when it
//! navigates, so a record that changes between the two lookups is not caught here.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use url::{Host, Url};

use crate::error::GatewayError;
use crate::policy::EgressPolicy;

/// Target that means "no navigation".
pub const ABOUT_BLANK: &str = "about:blank";

/// Scheme prepended when the caller omits one (matches the wrapped tool's own default).
const DEFAULT_SCHEME_PREFIX: &str = "https://";

/// Rejected even if an operator puts them in `allow_schemes`.
const DENIED_SCHEMES: &[&str] = &[
    "file",
    "data",
    "javascript",
    "blob",
    "filesystem",
    "about",
    "view-source",
    "chrome",
    "chrome-extension",
    "devtools",
];

const DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a hostname to every address it currently maps to.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the runtime's system lookup, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self {
            timeout: DNS_TIMEOUT,
        }
    }
}

impl SystemResolver {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        let lookup = tokio::net::lookup_host((host, 0u16));
        let addrs = tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "dns lookup timed out")
            })??;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// Fixed host -> addresses table. Unknown hosts fail with `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        self.entries.insert(host.into().to_ascii_lowercase(), addrs);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        self.entries
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such host")
            })
    }
}

fn is_private_or_local_ipv4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()                        // 127.0.0.0/8
        || ip.is_private()                  // 10/8, 172.16/12, 192.168/16
        || ip.is_link_local()               // 169.254.0.0/16
        || a == 0                           // 0.0.0.0/8 "this network"
        || ip.is_broadcast()
        || (a == 100 && (64..=127).contains(&b)) // 100.64.0.0/10 carrier-grade NAT
}

fn is_private_or_local_ipv6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_or_local_ipv4(&v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()                        // ::1
        || ip.is_unspecified()              // ::
        || (first & 0xfe00) == 0xfc00       // fc00::/7 unique local
        || (first & 0xffc0) == 0xfe80       // fe80::/10 link-local
}

/// True if the address is loopback, private, link-local, or "this network".
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_or_local_ipv4(v4),
        IpAddr::V6(v6) => is_private_or_local_ipv6(v6),
    }
}

/// `scheme:` prefix per RFC 3986, but `host:port` (digits after the colon) is not a scheme.
fn has_explicit_scheme(s: &str) -> bool {
    let Some(idx) = s.find(':') else {
        return false;
    };
    let (scheme, rest) = (&s[..idx], &s[idx + 1..]);
    let mut chars = scheme.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'));
    valid && !rest.starts_with(|c: char| c.is_ascii_digit())
}

/// Trim and default the scheme. Returns the string that will be handed to the tool.
fn normalize_open_url(raw: &str) -> Result<String, GatewayError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::validation("open requires a non-empty url"));
    }
    if trimmed.eq_ignore_ascii_case(ABOUT_BLANK) {
        return Ok(ABOUT_BLANK.to_string());
    }
    if has_explicit_scheme(trimmed) {
        return Ok(trimmed.to_string());
    }
    Ok(format!("{}{}", DEFAULT_SCHEME_PREFIX, trimmed))
}

/// Authorize a navigation target. Returns the URL to pass to the tool, or the first
/// rule it violated. No URL is returned unless every check passed.
pub async fn authorize(
    raw_url: &str,
    policy: &EgressPolicy,
    resolver: &dyn Resolver,
) -> Result<String, GatewayError> {
    let normalized = normalize_open_url(raw_url)?;
    if normalized == ABOUT_BLANK {
        if !policy.allow_about_blank {
            return Err(GatewayError::security("about:blank is not allowed by policy"));
        }
        return Ok(normalized);
    }

    let url = Url::parse(&normalized)
        .map_err(|e| GatewayError::validation(format!("invalid url: {}", e)))?;

    let scheme = url.scheme();
    if !policy.allowed_schemes.iter().any(|s| s == scheme) || DENIED_SCHEMES.contains(&scheme) {
        return Err(GatewayError::security(format!(
            "scheme not allowed: {}:",
            scheme
        )));
    }

    let host = url
        .host()
        .ok_or_else(|| GatewayError::security("missing hostname"))?;
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.');
            if domain.is_empty() {
                return Err(GatewayError::security("missing hostname"));
            }
            if domain.eq_ignore_ascii_case("localhost") {
                return Err(GatewayError::security("hostname not allowed: localhost"));
            }
            check_allowlist(domain, policy)?;
            check_resolved(domain, resolver).await?;
        }
        Host::Ipv4(ip) => check_ip_literal(IpAddr::V4(ip), policy)?,
        Host::Ipv6(ip) => check_ip_literal(IpAddr::V6(ip), policy)?,
    }
    Ok(normalized)
}

fn check_allowlist(hostname: &str, policy: &EgressPolicy) -> Result<(), GatewayError> {
    if policy.host_allowed(hostname) {
        Ok(())
    } else {
        Err(GatewayError::security(format!(
            "hostname not in allowlist: {}",
            hostname
        )))
    }
}

fn check_ip_literal(ip: IpAddr, policy: &EgressPolicy) -> Result<(), GatewayError> {
    check_allowlist(&ip.to_string(), policy)?;
    if is_private_or_local(&ip) {
        return Err(GatewayError::security(format!("ip not allowed: {}", ip)));
    }
    Ok(())
}

/// Reject if resolution fails or if any returned address is internal.
async fn check_resolved(hostname: &str, resolver: &dyn Resolver) -> Result<(), GatewayError> {
    let addrs = resolver.resolve(hostname).await.map_err(|e| {
        GatewayError::security(format!("dns lookup failed for {}: {}", hostname, e))
    })?;
    if addrs.is_empty() {
        return Err(GatewayError::security(format!(
            "dns lookup failed for {}: no addresses",
            hostname
        )));
    }
    if let Some(bad) = addrs.iter().find(|ip| is_private_or_local(ip)) {
        return Err(GatewayError::security(format!(
            "hostname resolves to disallowed ip: {} -> {}",
            hostname, bad
        )));
    }
    Ok(())
}
