//! The `browser-shell` tool: parse a `tools/call`, validate it into a [`ValidatedCommand`],
//! build the child argv, and shape the child's output for the caller.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;

use crate::egress::{self, Resolver};
use crate::error::GatewayError;
use crate::exec::{truncate_output, ExecStatus, ExecutionResult, MAX_OUTPUT_CHARS};
use crate::policy;
use crate::session::SessionId;
use crate::tools::args::{self, MAX_ARGS};
use crate::tools::subcommands::{self, OPEN};

pub const TOOL_NAME: &str = "browser-shell";

const ARGUMENT_KEYS: &[&str] = &["session_id", "argv", "timeout_sec"];

/// Entry for `tools/list`.
pub fn tool_definition() -> Value {
    let names: Vec<&str> = subcommands::names().collect();
    json!({
        "name": TOOL_NAME,
        "description": format!(
            "Run one allowlisted browser automation subcommand ({}). No shell; the control port is fixed.",
            names.join(", ")
        ),
        "inputSchema": {
            "type": "object",
            "additionalProperties": false,
            "required": ["session_id", "argv"],
            "properties": {
                "session_id": {
                    "type": "string",
                    "minLength": 1,
                    "maxLength": crate::session::MAX_SESSION_ID_LEN,
                    "pattern": "^[A-Za-z0-9._-]+$"
                },
                "argv": {
                    "type": "array",
                    "items": { "type": ["string", "number", "boolean"] },
                    "minItems": 1,
                    "maxItems": MAX_ARGS + 1
                },
                "timeout_sec": {
                    "type": "number",
                    "description": "Timeout in seconds (1 to 120, default 30)"
                }
            }
        }
    })
}

/// Caller input for one invocation, checked for shape but not yet validated.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub session_id: SessionId,
    pub subcommand: String,
    pub args: Vec<Value>,
    pub timeout_sec: Option<Value>,
}

impl ToolCallRequest {
    /// Parse `tools/call` params: `{name, arguments: {session_id, argv, timeout_sec?}}`.
    pub fn from_params(params: &Value) -> Result<Self, GatewayError> {
        let name = params.get("name").and_then(Value::as_str).unwrap_or("");
        if name != TOOL_NAME {
            return Err(GatewayError::validation(format!("unknown tool: {}", name)));
        }
        let empty = Map::new();
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(m)) => m,
            Some(_) => return Err(GatewayError::validation("arguments must be an object")),
        };
        Self::from_arguments(arguments)
    }

    pub fn from_arguments(a: &Map<String, Value>) -> Result<Self, GatewayError> {
        let session_id = match a.get("session_id") {
            Some(Value::String(s)) => SessionId::parse(s)?,
            _ => return Err(GatewayError::validation("session_id must be a string")),
        };

        let argv = match a.get("argv") {
            Some(Value::Array(v)) => v,
            _ => return Err(GatewayError::validation("argv must be an array")),
        };
        if argv.is_empty() {
            return Err(GatewayError::validation("argv must have at least 1 item"));
        }
        if argv.len() > MAX_ARGS + 1 {
            return Err(GatewayError::validation(format!(
                "argv too long (max {} items)",
                MAX_ARGS + 1
            )));
        }

        if let Some(k) = a.keys().find(|k| !ARGUMENT_KEYS.contains(&k.as_str())) {
            return Err(GatewayError::validation(format!("unknown argument: {}", k)));
        }

        let subcommand = match &argv[0] {
            Value::String(s) => s.clone(),
            _ => return Err(GatewayError::validation("argv[0] must be a string")),
        };

        Ok(Self {
            session_id,
            subcommand,
            args: argv[1..].to_vec(),
            timeout_sec: a.get("timeout_sec").cloned(),
        })
    }
}

/// A command that passed every check. Only [`validate`] creates one.
#[derive(Debug, Clone)]
pub struct ValidatedCommand {
    session_id: SessionId,
    subcommand: &'static str,
    args: Vec<String>,
    timeout: Duration,
}

impl ValidatedCommand {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn subcommand(&self) -> &str {
        self.subcommand
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `--session <id> --cdp <port> --json <subcommand> <args...>`
    pub fn to_argv(&self, cdp_port: u16) -> Vec<String> {
        let mut argv = Vec::with_capacity(6 + self.args.len());
        argv.push("--session".to_string());
        argv.push(self.session_id.to_string());
        argv.push("--cdp".to_string());
        argv.push(cdp_port.to_string());
        argv.push("--json".to_string());
        argv.push(self.subcommand.to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// Settings that validation needs besides the request itself.
pub struct ValidationContext<'a> {
    pub policy_path: &'a Path,
    pub resolver: &'a dyn Resolver,
    pub default_timeout_sec: u64,
}

/// Full pre-execution pipeline: subcommand allowlist, argument normalization, shape rules,
/// then the egress policy for `open`. The policy document is read fresh on every call.
pub async fn validate(
    req: ToolCallRequest,
    ctx: &ValidationContext<'_>,
) -> Result<ValidatedCommand, GatewayError> {
    let sub = subcommands::lookup(&req.subcommand).ok_or_else(|| {
        GatewayError::validation(format!("disallowed subcommand: {}", req.subcommand))
    })?;
    let mut normalized = args::normalize(&req.args)?;
    subcommands::check_arity(sub.name, &normalized)?;
    let timeout = args::resolve_timeout(req.timeout_sec.as_ref(), ctx.default_timeout_sec)?;

    let policy = policy::load_policy(ctx.policy_path).await?;
    if sub.name == OPEN {
        let url = egress::authorize(&normalized[0], &policy, ctx.resolver)
            .await
            .inspect_err(|e| {
                log::warn!("session {}: open rejected: {}", req.session_id, e);
            })?;
        normalized = vec![url];
    }

    Ok(ValidatedCommand {
        session_id: req.session_id,
        subcommand: sub.name,
        args: normalized,
        timeout,
    })
}

/// Caller-visible result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapedResult {
    pub session_id: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ShapedResult {
    /// MCP tool result: one text block carrying the JSON-encoded shaped result.
    pub fn to_tool_result(&self) -> Value {
        let text = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        json!({ "content": [{ "type": "text", "text": text }] })
    }
}

/// Unwrap the tool's `{success, data, error}` envelope when present and bound both streams.
/// Output that is not such an envelope passes through unchanged.
pub fn shape(cmd: &ValidatedCommand, exec: ExecutionResult) -> ShapedResult {
    let mut exit_code = exec.exit_code;
    let mut stdout = exec.stdout_raw;
    let mut stderr = exec.stderr_raw;

    if exec.status == ExecStatus::Timeout {
        stderr.push_str(&format!(
            "timed out after {} ms\n",
            cmd.timeout.as_millis()
        ));
    }

    if let Some(envelope) = parse_envelope(&stdout) {
        let data = envelope.get("data").filter(|d| !d.is_null());
        if envelope.success {
            stdout = data.map(json_line).unwrap_or_default();
        } else {
            let msg = envelope
                .get("error")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("Unknown error");
            stderr = format!("{}\n{}", msg, stderr);
            if exit_code == 0 {
                exit_code = 1;
            }
            stdout = data.map(json_line).unwrap_or_default();
        }
    }

    ShapedResult {
        session_id: cmd.session_id.to_string(),
        exit_code,
        stdout: truncate_output(&stdout, MAX_OUTPUT_CHARS),
        stderr: truncate_output(&stderr, MAX_OUTPUT_CHARS),
    }
}

struct Envelope {
    success: bool,
    body: Map<String, Value>,
}

impl Envelope {
    fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }
}

fn parse_envelope(stdout: &str) -> Option<Envelope> {
    match serde_json::from_str::<Value>(stdout.trim()).ok()? {
        Value::Object(body) => {
            let success = body.get("success")?.as_bool()?;
            Some(Envelope { success, body })
        }
        _ => None,
    }
}

fn json_line(v: &Value) -> String {
    format!("{}\n", v)
}
