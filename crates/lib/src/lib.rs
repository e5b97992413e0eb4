//! browser-shell core library: a policy-enforced JSON-RPC gateway in front of a
//! headless-browser CLI, shared by the stdio and HTTP/SSE transports.

pub mod config;
pub mod egress;
pub mod error;
pub mod exec;
pub mod gateway;
pub mod policy;
pub mod session;
pub mod tools;

pub use error::GatewayError;
