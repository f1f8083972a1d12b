mod builder;
#[cfg(test)]
mod tests;

use barry_model::{
    ModelBackend, ModelMessage, ModelRequest, ToolCallResult,
};
use barry_tool_session::ToolSession;
use serde_json::Value;
use tracing::Instrument;

use crate::conversation::Conversation;
use crate::error::BackendError;
use crate::model_client::ModelClient;
pub use builder::OrchestratorBuilder;

/// The reply given when the model keeps asking for tools past the round
/// limit.
pub const TOOL_ROUND_LIMIT_REPLY: &str = "I wasn't able to finish answering \
    within the allowed number of tool calls. Please try rephrasing or \
    narrowing down your question.";

type TranscriptFn = Box<dyn Fn(&str, TranscriptSource) + Send + Sync>;

/// The source of a transcript.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranscriptSource {
    /// A text delta streamed by the model.
    Assistant,
    /// A tool call requested by the model.
    ToolCall,
    /// The result of a tool call, as sent back to the model.
    ToolResult,
}

/// Drives a conversation between the user, a model backend and the tools
/// of a [`ToolSession`].
///
/// Each call to [`send_message`] is one turn: the model is asked for an
/// answer and every tool it requests is invoked, until it replies with
/// plain text. Turns are atomic. A turn that fails, or whose future is
/// dropped, leaves the conversation exactly as it was before.
///
/// The orchestrator borrows the session, so the session outlives every
/// orchestrator using it, and only one turn can run at a time.
///
/// [`send_message`]: Orchestrator::send_message
pub struct Orchestrator<'s, B> {
    session: &'s ToolSession,
    model_client: ModelClient<B>,
    conversation: Conversation,
    max_tool_rounds: usize,
    on_transcript: Option<TranscriptFn>,
}

impl<'s, B: ModelBackend> Orchestrator<'s, B> {
    /// Returns the conversation so far.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns the tool session used by this orchestrator.
    #[inline]
    pub fn session(&self) -> &'s ToolSession {
        self.session
    }

    /// Returns the model backend.
    #[inline]
    pub fn backend(&self) -> &B {
        self.model_client.backend()
    }

    /// Sends a user message and returns the final reply of the model.
    ///
    /// Tool calls requested by the model are invoked in order, and their
    /// results are sent back before asking the model again. Tool failures
    /// never fail the turn, they are reported to the model as text. After
    /// the configured number of tool rounds, the turn ends with
    /// [`TOOL_ROUND_LIMIT_REPLY`].
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. If the future is dropped before it
    /// completes, the messages of the unfinished turn are discarded.
    pub async fn send_message(
        &mut self,
        text: &str,
    ) -> Result<String, BackendError> {
        let on_transcript = self.on_transcript.as_deref();
        let emit = |transcript: &str, source| {
            if let Some(on_transcript) = on_transcript {
                on_transcript(transcript, source);
            }
        };

        let mut turn = Turn::begin(&mut self.conversation);
        turn.push(ModelMessage::User(text.to_owned()), text.to_owned());

        let mut rounds = 0;
        loop {
            let req = turn.to_request();
            let resp = self
                .model_client
                .send_request(&req, |delta| {
                    emit(delta, TranscriptSource::Assistant)
                })
                .await?;
            debug!(
                "model finished with {:?}, {} tool call(s)",
                resp.finish_reason,
                resp.tool_calls.len()
            );

            if resp.tool_calls.is_empty() {
                let reply = resp.transcript;
                let msg = ModelMessage::Assistant(reply.clone());
                turn.push(msg, reply.clone());
                turn.commit();
                return Ok(reply);
            }

            if rounds >= self.max_tool_rounds {
                warn!(
                    "model still wants tools after {rounds} round(s), giving up"
                );
                let reply = TOOL_ROUND_LIMIT_REPLY.to_owned();
                emit(&reply, TranscriptSource::Assistant);
                let msg = ModelMessage::Assistant(reply.clone());
                turn.push(msg, reply.clone());
                turn.commit();
                return Ok(reply);
            }
            rounds += 1;

            if !resp.transcript.is_empty() {
                turn.push(
                    ModelMessage::Assistant(resp.transcript.clone()),
                    resp.transcript,
                );
            }

            for call in resp.tool_calls {
                let announcement = format!(
                    "{}({})",
                    call.name,
                    Value::Object(call.arguments.clone())
                );
                emit(&announcement, TranscriptSource::ToolCall);

                let span =
                    info_span!("tool call", tool = %call.name, round = rounds);
                let content = match self
                    .session
                    .invoke(&call.name, call.arguments.clone())
                    .instrument(span)
                    .await
                {
                    Ok(result) => format!(
                        "Here is the data from the {} function:\n\n{result}\
                         \n\nPlease format this nicely for the user.",
                        call.name
                    ),
                    Err(err) => {
                        warn!("failed to call `{}`: {err}", call.name);
                        format!("Error calling function {}: {err}", call.name)
                    }
                };
                emit(&content, TranscriptSource::ToolResult);

                let result = ToolCallResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    content: content.clone(),
                };
                turn.push(ModelMessage::ToolCall(call), announcement);
                turn.push(ModelMessage::Tool(result), content);
            }
        }
    }
}

/// An unfinished turn. Unless committed, the messages pushed through it
/// are removed when it goes out of scope.
struct Turn<'c> {
    conversation: &'c mut Conversation,
    checkpoint: usize,
    committed: bool,
}

impl<'c> Turn<'c> {
    fn begin(conversation: &'c mut Conversation) -> Self {
        let checkpoint = conversation.len();
        Self {
            conversation,
            checkpoint,
            committed: false,
        }
    }

    #[inline]
    fn push(&mut self, msg: ModelMessage, transcript: String) {
        self.conversation.push(msg, transcript);
    }

    #[inline]
    fn to_request(&self) -> ModelRequest {
        self.conversation.to_request()
    }

    #[inline]
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!(
                "discarding {} message(s) of an unfinished turn",
                self.conversation.len() - self.checkpoint
            );
            self.conversation.truncate(self.checkpoint);
        }
    }
}
