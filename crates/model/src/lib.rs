//! An abstraction layer for the model backends Barry can talk to.
//!
//! This crate establishes an unified protocol for the orchestrator to
//! interact with various supported backends, so that a conversation can
//! seamlessly run on any of them without modifying the core codebase.
//!
//! Besides the request and response types, the crate owns the description
//! of the tools a worker exposes ([`ToolDescriptor`]) and the pure
//! translation of those descriptors into the declaration shape each backend
//! understands (see [`translate`]).

#![deny(missing_docs)]

mod backend;
mod error;
mod request;
mod response;
mod tool;
pub mod translate;

pub use backend::*;
pub use error::*;
pub use request::*;
pub use response::*;
pub use tool::*;
pub use translate::{
    BackendKind, SchemaTranslationError, ToolDeclaration, translate,
    translate_all,
};
