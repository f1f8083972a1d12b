use std::collections::HashSet;

use barry_model::ToolDescriptor;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::Instrument;

use crate::config::WorkerConfig;
use crate::error::Error;
use crate::mcp::McpLauncher;
use crate::worker::{WorkerConnection, WorkerLauncher};

/// The connection state of a [`ToolSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No worker is running.
    Disconnected,
    /// A worker is being started.
    Connecting,
    /// A worker is running and its tools are known.
    Connected,
}

enum State {
    Disconnected,
    Connecting,
    Connected(Box<dyn WorkerConnection>),
}

/// A connection to a tool-providing worker.
///
/// The session owns the worker process from [`connect`] to [`disconnect`].
/// Tool calls go through [`invoke`], which never fails because of the tool
/// itself: every failure is turned into text the model can read.
///
/// Dropping a connected session drops the worker connection, which kills
/// the worker process.
///
/// [`connect`]: ToolSession::connect
/// [`disconnect`]: ToolSession::disconnect
/// [`invoke`]: ToolSession::invoke
pub struct ToolSession {
    config: WorkerConfig,
    launcher: Box<dyn WorkerLauncher>,
    state: State,
    tools: Vec<ToolDescriptor>,
}

impl ToolSession {
    /// Creates a disconnected session that starts workers with `launcher`.
    pub fn new<L: WorkerLauncher + 'static>(
        config: WorkerConfig,
        launcher: L,
    ) -> Self {
        Self {
            config,
            launcher: Box::new(launcher),
            state: State::Disconnected,
            tools: vec![],
        }
    }

    /// Creates a disconnected session that talks MCP to its workers.
    #[inline]
    pub fn with_mcp(config: WorkerConfig) -> Self {
        Self::new(config, McpLauncher)
    }

    /// Connects a session, runs `body` with it, and disconnects it
    /// afterwards.
    ///
    /// The worker is released exactly once, whatever `body` returns. If
    /// the future is dropped before completion, dropping the session
    /// releases the worker instead.
    pub async fn scoped<L, F, R>(
        config: WorkerConfig,
        launcher: L,
        body: F,
    ) -> Result<R, Error>
    where
        L: WorkerLauncher + 'static,
        F: AsyncFnOnce(&mut ToolSession) -> R,
    {
        let mut session = Self::new(config, launcher);
        session.connect().await?;
        let output = body(&mut session).await;
        session.disconnect().await;
        Ok(output)
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        match self.state {
            State::Disconnected => SessionState::Disconnected,
            State::Connecting => SessionState::Connecting,
            State::Connected(_) => SessionState::Connected,
        }
    }

    /// Returns `true` if the session is connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Returns the configuration of this session.
    #[inline]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Returns the tools discovered during [`connect`](Self::connect), in
    /// discovery order.
    #[inline]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Finds a discovered tool by name.
    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    /// Starts the worker, performs the handshake and discovers its tools.
    ///
    /// The handshake must complete within the configured timeout, otherwise
    /// the worker is released and a `ConnectionTimeout` error is returned.
    /// Connecting an already connected session is a protocol error.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if let State::Connected(_) = self.state {
            return Err(Error::protocol().with_reason("already connected"));
        }

        self.state = State::Connecting;
        let handshake_timeout = self.config.handshake_timeout();
        let launch = self
            .launcher
            .launch(&self.config)
            .instrument(debug_span!("worker handshake"));
        let conn = match timeout(handshake_timeout, launch).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => {
                self.state = State::Disconnected;
                warn!("failed to start worker: {err}");
                return Err(err);
            }
            Err(_) => {
                self.state = State::Disconnected;
                warn!("worker handshake timed out");
                return Err(Error::connection_timeout().with_reason(format!(
                    "worker did not finish the handshake within {:?}",
                    handshake_timeout
                )));
            }
        };

        let tools = match conn.list_tools().await {
            Ok(tools) => tools,
            Err(err) => {
                warn!("failed to list tools: {err}");
                if let Err(err) = conn.shutdown().await {
                    warn!("failed to stop worker: {err}");
                }
                self.state = State::Disconnected;
                return Err(Error::protocol().with_reason(err.reason()));
            }
        };

        let mut seen = HashSet::new();
        self.tools = tools
            .into_iter()
            .filter(|tool| {
                let fresh = seen.insert(tool.name().to_owned());
                if !fresh {
                    warn!("dropping duplicated tool `{}`", tool.name());
                }
                fresh
            })
            .collect();
        info!(
            "connected to worker, {} tool(s) available: {:?}",
            self.tools.len(),
            self.tools.iter().map(|t| t.name()).collect::<Vec<_>>()
        );
        self.state = State::Connected(conn);
        Ok(())
    }

    /// Invokes a tool and returns its rendered output.
    ///
    /// The only error is `NotConnected`. Unknown tools, missing required
    /// arguments, failures reported by the tool and broken transports all
    /// come back as text starting with `Error: `.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, Error> {
        let State::Connected(conn) = &self.state else {
            return Err(Error::not_connected());
        };

        let Some(tool) = self.tool(name) else {
            return Ok(format!("Error: Unknown tool: {name}"));
        };
        let missing: Vec<_> = tool.missing_arguments(&arguments).collect();
        if !missing.is_empty() {
            return Ok(format!(
                "Error: Missing required argument(s) for {name}: {}",
                missing.join(", ")
            ));
        }

        let span = debug_span!("tool invoke", tool = name);
        match conn.call_tool(name, arguments).instrument(span).await {
            Ok(output) => {
                if output.is_error {
                    debug!("tool `{name}` reported an error");
                }
                Ok(output.render())
            }
            Err(err) => {
                warn!("failed to call tool `{name}`: {err}");
                Ok(format!("Error: {}", err.reason()))
            }
        }
    }

    /// Stops the worker and forgets its tools.
    ///
    /// Calling this on a session that is not connected does nothing.
    /// Shutdown failures are logged and otherwise ignored.
    pub async fn disconnect(&mut self) {
        let state = std::mem::replace(&mut self.state, State::Disconnected);
        self.tools.clear();
        if let State::Connected(conn) = state {
            match conn.shutdown().await {
                Ok(()) => debug!("worker stopped"),
                Err(err) => warn!("failed to stop worker: {err}"),
            }
        }
    }
}

impl Drop for ToolSession {
    fn drop(&mut self) {
        if let State::Connected(_) = self.state {
            debug!("session dropped while connected, killing the worker");
        }
    }
}
