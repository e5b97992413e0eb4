//! Tool layer: argument normalization, the subcommand allowlist, and the `browser-shell` tool.

pub mod args;
mod browser_shell;
pub mod subcommands;

pub use browser_shell::{
    shape, tool_definition, validate, ShapedResult, ToolCallRequest, ValidatedCommand,
    ValidationContext, TOOL_NAME,
};
