//! Error taxonomy shared by validation, egress policy, and execution.

/// Failure raised anywhere between receiving a `tools/call` and handing argv to the runner.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed or disallowed input shape (caller's fault).
    #[error("{0}")]
    Validation(String),
    /// Egress policy rejection (caller's fault, security relevant).
    #[error("{0}")]
    Security(String),
    /// The policy document exists but could not be read or parsed.
    #[error("policy error: {0}")]
    Policy(String),
    /// The wrapped tool could not be spawned.
    #[error("exec failed: {0}")]
    Execution(String),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    /// JSON-RPC error code used when this error is surfaced as a protocol error.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::Validation(_) => crate::gateway::codes::INVALID_PARAMS,
            Self::Security(_) => crate::gateway::codes::SECURITY_REJECTED,
            Self::Policy(_) => crate::gateway::codes::POLICY_ERROR,
            Self::Execution(_) => crate::gateway::codes::SERVER_ERROR,
        }
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
