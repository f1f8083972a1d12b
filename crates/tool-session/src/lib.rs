//! Connection to a tool-providing worker process.
//!
//! A [`ToolSession`] starts the worker, performs the capability handshake,
//! discovers the tools it exposes and dispatches invocations to it. The
//! production transport is MCP over the worker's standard streams; other
//! transports plug in through [`WorkerLauncher`] and [`WorkerConnection`].

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod error;
mod mcp;
mod session;
mod worker;

pub use config::{ConfigError, WorkerConfig, WorkerConfigBuilder};
pub use error::{Error, ErrorKind};
pub use mcp::McpLauncher;
pub use session::{SessionState, ToolSession};
pub use worker::{ContentPart, ToolOutput, WorkerConnection, WorkerLauncher};
