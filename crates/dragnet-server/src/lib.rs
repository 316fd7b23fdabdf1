//! Dragnet Server - The tool protocol surface.
//!
//! This crate wires the pieces together:
//! - [`protocol`]: JSON-RPC 2.0 envelope and tool-protocol types
//! - [`transport`]: line-framed stdio transport (plus a buffer transport
//!   for tests)
//! - [`registry`]: the tool table and the `execute` dispatch pipeline
//! - [`schemas`]: named parameter schemas referenced by the tool file
//! - [`bootstrap`]: building the registry from settings + tool definitions
//! - [`server`]: the serve loop
//!
//! The dispatch invariant: a tool invocation never crashes the server and
//! always returns a structured reply. The only protocol-level fault is an
//! unknown tool name.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bootstrap;
pub mod protocol;
pub mod registry;
pub mod schemas;
pub mod server;
pub mod transport;

pub use bootstrap::{BuildError, build_registry};
pub use registry::{DispatchError, ResponseShape, ToolDescriptor, ToolRegistry, ToolResult};
pub use server::McpServer;
pub use transport::{BufferTransport, StdioTransport, Transport, TransportError};
