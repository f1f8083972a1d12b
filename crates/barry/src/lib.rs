//! A terminal client that answers questions about chocolate products by
//! letting a model call the tools of a Barry worker.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to run Barry sessions from your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod session;

pub use config::{BackendConfig, ClientConfig, ClientConfigBuilder, ConfigError};
pub use session::{Error, SessionBuilder};

/// Re-exports of [`barry_core`] crate.
pub mod core {
    pub use barry_core::*;
}
