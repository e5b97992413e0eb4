//! Transport-independent JSON-RPC method table.

use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::egress::{Resolver, SystemResolver};
use crate::error::GatewayError;
use crate::exec::{CommandRunner, ExecutionResult, ProcessRunner};
use crate::gateway::codes;
use crate::gateway::protocol::{RpcRequest, RpcResponse, JSONRPC_VERSION};
use crate::tools::{self, ShapedResult, ToolCallRequest, ValidationContext};

/// Protocol version echoed when `initialize` does not declare one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Routes `initialize`, `tools/list` and `tools/call`. Stateless per request; cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    runner: Arc<dyn CommandRunner>,
    resolver: Arc<dyn Resolver>,
    policy_path: PathBuf,
    cdp_port: u16,
    default_timeout_sec: u64,
}

impl Dispatcher {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        resolver: Arc<dyn Resolver>,
        policy_path: impl Into<PathBuf>,
    ) -> Self {
        let defaults = crate::config::ToolConfig::default();
        Self {
            runner,
            resolver,
            policy_path: policy_path.into(),
            cdp_port: defaults.cdp_port,
            default_timeout_sec: defaults.default_timeout_sec,
        }
    }

    /// Real process runner and system DNS, configured from `config.tool`.
    pub fn from_config(config: &Config, policy_path: PathBuf) -> Self {
        let runner = ProcessRunner::new(config.tool.binary.clone())
            .with_env(config.tool.env.clone());
        Self::new(Arc::new(runner), Arc::new(SystemResolver::default()), policy_path)
            .with_cdp_port(config.tool.cdp_port)
            .with_default_timeout(config.tool.default_timeout_sec)
    }

    pub fn with_cdp_port(mut self, port: u16) -> Self {
        self.cdp_port = port;
        self
    }

    pub fn with_default_timeout(mut self, secs: u64) -> Self {
        self.default_timeout_sec = secs;
        self
    }

    /// Handle one parsed message. `None` means nothing is sent back (notification,
    /// missing method, non-object message). Never fails.
    pub async fn handle(&self, msg: &Value) -> Option<Value> {
        let req = RpcRequest::from_value(msg)?;
        let method = req.method.clone()?;
        let result = if req.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
            Err((codes::INVALID_REQUEST, "invalid request: jsonrpc must be \"2.0\"".to_string()))
        } else {
            self.call_method(&method, &req).await
        };
        let id = req.id?;
        let resp = match result {
            Ok(v) => RpcResponse::ok(id, v),
            Err((code, message)) => RpcResponse::err(id, code, message),
        };
        Some(resp.to_value())
    }

    async fn call_method(&self, method: &str, req: &RpcRequest) -> Result<Value, (i64, String)> {
        match method {
            "initialize" => Ok(initialize_result(&req.params)),
            "tools/list" => Ok(json!({ "tools": [tools::tool_definition()] })),
            "tools/call" => match self.call_tool(&req.params).await {
                Ok(shaped) => Ok(shaped.to_tool_result()),
                Err(e) => {
                    log::debug!("tools/call failed: {}", e);
                    Err((e.rpc_code(), e.to_string()))
                }
            },
            other => Err((codes::METHOD_NOT_FOUND, format!("unknown method: {}", other))),
        }
    }

    /// Validate, execute, shape. Spawn failures become a shaped result with exit code 127;
    /// everything before the spawn fails the call.
    pub async fn call_tool(&self, params: &Value) -> Result<ShapedResult, GatewayError> {
        let req = ToolCallRequest::from_params(params)?;
        let ctx = ValidationContext {
            policy_path: &self.policy_path,
            resolver: self.resolver.as_ref(),
            default_timeout_sec: self.default_timeout_sec,
        };
        let cmd = tools::validate(req, &ctx).await?;
        let argv = cmd.to_argv(self.cdp_port);
        let exec = match self.runner.run(&argv, cmd.timeout()).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("session {}: {}", cmd.session_id(), e);
                ExecutionResult::spawn_failure(&e)
            }
        };
        log::debug!(
            "session {}: {} -> {} ({})",
            cmd.session_id(),
            cmd.subcommand(),
            exec.exit_code,
            exec.status.as_str()
        );
        Ok(tools::shape(&cmd, exec))
    }
}

fn initialize_result(params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| Value::String(DEFAULT_PROTOCOL_VERSION.to_string()));
    json!({
        "protocolVersion": protocol_version,
        "serverInfo": {
            "name": tools::TOOL_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": { "tools": { "listChanged": false } },
    })
}
