use std::error::Error as StdError;
use std::fmt::{self, Display};

use barry_core::{Orchestrator, OrchestratorBuilder, TranscriptSource};
use barry_model::{ModelBackend, SchemaTranslationError};
use barry_tool_session::{
    Error as WorkerError, McpLauncher, ToolSession, WorkerLauncher,
};

use crate::config::ClientConfig;

type TranscriptFn = Box<dyn Fn(&str, TranscriptSource) + Send + Sync>;

/// The error returned when a session cannot be set up.
#[derive(Debug)]
pub enum Error {
    /// The worker could not be started.
    Worker(WorkerError),
    /// A tool of the worker cannot be declared to the backend.
    Schema(SchemaTranslationError),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Worker(err) => {
                write!(f, "Failed to start the worker: {err}")
            }
            Error::Schema(err) => write!(f, "Failed to declare tools: {err}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Worker(err) => Some(err),
            Error::Schema(err) => Some(err),
        }
    }
}

impl From<WorkerError> for Error {
    fn from(err: WorkerError) -> Self {
        Error::Worker(err)
    }
}

impl From<SchemaTranslationError> for Error {
    fn from(err: SchemaTranslationError) -> Self {
        Error::Schema(err)
    }
}

/// A session builder.
///
/// A session starts the worker, declares its tools to the backend and
/// hands an [`Orchestrator`] to the caller. When the caller is done, the
/// worker is stopped, whatever happened in between.
pub struct SessionBuilder<B, L = McpLauncher> {
    config: ClientConfig,
    backend: B,
    launcher: L,
    on_transcript: Option<TranscriptFn>,
}

impl<B: ModelBackend> SessionBuilder<B> {
    /// Creates a session builder that talks MCP to the worker.
    pub fn new(config: ClientConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            launcher: McpLauncher,
            on_transcript: None,
        }
    }
}

impl<B, L> SessionBuilder<B, L>
where
    B: ModelBackend,
    L: WorkerLauncher + 'static,
{
    /// Replaces the way the worker is started.
    pub fn with_launcher<M: WorkerLauncher + 'static>(
        self,
        launcher: M,
    ) -> SessionBuilder<B, M> {
        SessionBuilder {
            config: self.config,
            backend: self.backend,
            launcher,
            on_transcript: self.on_transcript,
        }
    }

    /// Attaches a callback to be invoked when a transcript is generated.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Box::new(on_transcript));
        self
    }

    /// Runs `body` with a ready orchestrator and returns its output.
    pub async fn run<F, R>(self, body: F) -> Result<R, Error>
    where
        F: AsyncFnOnce(&mut Orchestrator<'_, B>) -> R,
    {
        let Self {
            config,
            backend,
            launcher,
            on_transcript,
        } = self;
        let worker = config.worker().clone();

        let result = ToolSession::scoped(worker, launcher, async |session| {
            let mut builder = OrchestratorBuilder::with_backend(backend)
                .with_max_tool_rounds(config.max_tool_rounds());
            if let Some(prompt) = config.system_prompt() {
                builder = builder.with_system_prompt(prompt);
            }
            if let Some(on_transcript) = on_transcript {
                builder = builder.on_transcript(on_transcript);
            }

            let mut orchestrator = match builder.build(session) {
                Ok(orchestrator) => orchestrator,
                Err(err) => {
                    error!("{err}");
                    return Err(Error::Schema(err));
                }
            };
            info!(
                "session ready, {} tool(s) declared to {}",
                session.tools().len(),
                config.backend().kind()
            );
            Ok(body(&mut orchestrator).await)
        })
        .await;

        result?
    }
}
