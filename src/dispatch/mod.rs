//! Tool registry and dispatch. Grounded directly in
//! `ai_session::mcp::tools::ToolRegistry` (name/description/schema
//! entries, static `with_builtin_tools` constructor), generalized from
//! its sync `Fn(Value) -> Result<ToolResult>` handlers to genuinely
//! async ones, since dispatch here already runs inside an async
//! runtime and has no need for a `block_in_place` sync-bridging
//! workaround.

mod envelope;
mod registry;
mod tools;

pub use envelope::{Envelope, ErrorPayload, ResponseMode};
pub use registry::{Dispatcher, Tool, ToolContext, ToolHandler, ToolOutcome};
pub use tools::with_builtin_tools;
