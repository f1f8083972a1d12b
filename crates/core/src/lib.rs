//! Core logic of the conversation: the tool-call loop, retries and the
//! conversation history.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod conversation;
mod error;
mod model_client;
mod orchestrator;

pub use error::BackendError;
pub use model_client::RetryPolicy;
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, TOOL_ROUND_LIMIT_REPLY,
    TranscriptSource,
};
