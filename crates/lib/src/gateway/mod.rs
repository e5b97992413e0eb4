//! Gateway: JSON-RPC dispatch plus the stdio and HTTP/SSE transports.
//!
//! Both transports share one [`Dispatcher`]. Over HTTP, a request is POSTed for a session
//! and its response is delivered on that session's event stream.

mod dispatch;
mod protocol;
mod registry;
mod server;
mod stdio;

pub use dispatch::{Dispatcher, DEFAULT_PROTOCOL_VERSION};
pub use protocol::{RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION};
pub use registry::{SessionRegistry, StreamGuard, StreamHandle};
pub use server::{build_router, run_http, serve, GatewayState, MAX_BODY_BYTES};
pub use stdio::run_stdio;

/// JSON-RPC error codes.
pub mod codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const SERVER_ERROR: i64 = -32000;
    /// Egress policy rejected the navigation target.
    pub const SECURITY_REJECTED: i64 = -32001;
    /// Policy document unreadable or malformed.
    pub const POLICY_ERROR: i64 = -32002;
}
