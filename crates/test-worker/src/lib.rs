//! An in-process fake worker for testing purpose.
//!
//! [`FakeWorker`] plugs into a `ToolSession` as its launcher and serves the
//! product query tools from a [`Dataset`] snapshot, without spawning any
//! process. It records every call and can be told to misbehave.

mod dataset;
mod tools;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use barry_model::ToolDescriptor;
use barry_tool_session::{
    Error, ToolOutput, WorkerConfig, WorkerConnection, WorkerLauncher,
};
use serde_json::{Map, Value};
use tokio::time::sleep;

pub use dataset::{Dataset, SkuRecord};
pub use tools::{
    ChocolateQuery, ChocolateType, FatQuery, call, query_chocolate_products,
    query_skus_by_fat, tool_descriptors,
};

/// A tool call received by the fake worker.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    /// Name of the called tool.
    pub name: String,
    /// Arguments exactly as received.
    pub arguments: Map<String, Value>,
}

#[derive(Default)]
struct State {
    launches: usize,
    shutdowns: usize,
    calls: Vec<RecordedCall>,
}

#[derive(Clone, Default)]
struct Behavior {
    handshake_delay: Option<Duration>,
    launch_error: Option<String>,
    list_error: Option<String>,
    broken_tools: Vec<String>,
    failing_tools: Vec<String>,
    extra_tools: Vec<ToolDescriptor>,
}

/// A fake worker launcher.
///
/// Clones share the same records, so a test can keep one handle and give
/// another to the session.
#[derive(Clone)]
pub struct FakeWorker {
    dataset: Dataset,
    behavior: Behavior,
    state: Arc<Mutex<State>>,
}

impl Default for FakeWorker {
    fn default() -> Self {
        Self::new(Dataset::sample())
    }
}

impl FakeWorker {
    /// Creates a worker serving `dataset`.
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            behavior: Behavior::default(),
            state: Default::default(),
        }
    }

    /// Delays the handshake, to exercise timeouts.
    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.behavior.handshake_delay = Some(delay);
        self
    }

    /// Makes the launch fail, as if the process could not be spawned.
    pub fn with_launch_error<S: Into<String>>(mut self, reason: S) -> Self {
        self.behavior.launch_error = Some(reason.into());
        self
    }

    /// Makes tool discovery fail.
    pub fn with_list_error<S: Into<String>>(mut self, reason: S) -> Self {
        self.behavior.list_error = Some(reason.into());
        self
    }

    /// Makes calls to `name` fail at the transport level.
    pub fn with_broken_tool<S: Into<String>>(mut self, name: S) -> Self {
        self.behavior.broken_tools.push(name.into());
        self
    }

    /// Makes calls to `name` return a result flagged as an error.
    pub fn with_failing_tool<S: Into<String>>(mut self, name: S) -> Self {
        self.behavior.failing_tools.push(name.into());
        self
    }

    /// Lists an extra tool after the built-in ones.
    pub fn with_extra_tool(mut self, tool: ToolDescriptor) -> Self {
        self.behavior.extra_tools.push(tool);
        self
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Returns how many times a worker was launched.
    pub fn launches(&self) -> usize {
        self.state().launches
    }

    /// Returns how many times a worker was shut down.
    pub fn shutdowns(&self) -> usize {
        self.state().shutdowns
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WorkerLauncher for FakeWorker {
    async fn launch(
        &self,
        _config: &WorkerConfig,
    ) -> Result<Box<dyn WorkerConnection>, Error> {
        self.state().launches += 1;
        if let Some(delay) = self.behavior.handshake_delay {
            sleep(delay).await;
        }
        if let Some(reason) = &self.behavior.launch_error {
            return Err(Error::protocol().with_reason(reason.clone()));
        }
        Ok(Box::new(FakeConnection(self.clone())))
    }
}

struct FakeConnection(FakeWorker);

#[async_trait]
impl WorkerConnection for FakeConnection {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
        let behavior = &self.0.behavior;
        if let Some(reason) = &behavior.list_error {
            return Err(Error::protocol().with_reason(reason.clone()));
        }
        let mut tools = tool_descriptors();
        tools.extend(behavior.extra_tools.iter().cloned());
        Ok(tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, Error> {
        self.0.state().calls.push(RecordedCall {
            name: name.to_owned(),
            arguments: arguments.clone(),
        });

        let behavior = &self.0.behavior;
        if behavior.broken_tools.iter().any(|t| t == name) {
            return Err(Error::tool_execution()
                .with_reason("connection closed by the worker"));
        }
        if behavior.failing_tools.iter().any(|t| t == name) {
            return Ok(ToolOutput::error("dataset not loaded"));
        }
        Ok(call(&self.0.dataset, name, arguments))
    }

    async fn shutdown(self: Box<Self>) -> Result<(), Error> {
        self.0.state().shutdowns += 1;
        Ok(())
    }
}
