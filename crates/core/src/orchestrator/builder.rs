use barry_model::{
    ModelBackend, ModelMessage, SchemaTranslationError, translate_all,
};
use barry_tool_session::ToolSession;

use super::{Orchestrator, TranscriptFn, TranscriptSource};
use crate::conversation::Conversation;
use crate::model_client::{ModelClient, RetryPolicy};

const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// [`Orchestrator`] builder.
pub struct OrchestratorBuilder<B> {
    backend: B,
    system_prompt: Option<String>,
    max_tool_rounds: usize,
    retry_policy: RetryPolicy,
    on_transcript: Option<TranscriptFn>,
}

impl<B: ModelBackend> OrchestratorBuilder<B> {
    /// Creates a new builder with the specified model backend.
    #[inline]
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            system_prompt: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            retry_policy: RetryPolicy::default(),
            on_transcript: None,
        }
    }

    /// Sets the system prompt, sent as the first message of every request.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets how many tool rounds a single turn may take.
    #[inline]
    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    /// Sets how rate-limited requests are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Attaches a callback to be invoked when new transcripts are
    /// available.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Box::new(on_transcript));
        self
    }

    /// Declares the tools of `session` to the backend and builds the
    /// orchestrator.
    ///
    /// Fails if a tool has a parameter type the backend can't express.
    pub fn build(
        self,
        session: &ToolSession,
    ) -> Result<Orchestrator<'_, B>, SchemaTranslationError> {
        let Self {
            mut backend,
            system_prompt,
            max_tool_rounds,
            retry_policy,
            on_transcript,
        } = self;

        let kind = backend.kind();
        let declarations = translate_all(session.tools(), kind)?;
        debug!("declaring {} tool(s) to {kind}", declarations.len());
        backend.declare_tools(declarations);

        let mut conversation = Conversation::default();
        if let Some(prompt) = system_prompt {
            conversation.push(ModelMessage::System(prompt.clone()), prompt);
        }

        Ok(Orchestrator {
            session,
            model_client: ModelClient::new(backend, retry_policy),
            conversation,
            max_tool_rounds,
            on_transcript,
        })
    }
}
