use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use barry_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::Sse;
use crate::proto::GenerateContentChunk;

const SAFETY_REASONS: &[&str] =
    &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

struct PartialState {
    sse: Sse,
    // Events decoded from a chunk but not yet delivered.
    pending_events: VecDeque<ModelResponseEvent>,
    tool_call_count: usize,
    completed: bool,
}

impl PartialState {
    fn finish_reason(&self) -> ModelFinishReason {
        if self.tool_call_count > 0 {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        }
    }

    fn complete(&mut self) {
        if !self.completed {
            self.completed = true;
            let reason = self.finish_reason();
            self.pending_events
                .push_back(ModelResponseEvent::Completed(reason));
        }
    }

    fn handle_chunk(
        &mut self,
        chunk: GenerateContentChunk,
    ) -> Result<(), Error> {
        if let Some(reason) =
            chunk.prompt_feedback.and_then(|feedback| feedback.block_reason)
        {
            return Err(Error::new(
                format!("The prompt was blocked: {reason}"),
                ErrorKind::Moderated,
            ));
        }

        for candidate in chunk.candidates.into_iter().take(1) {
            let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
            for part in parts {
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        self.pending_events
                            .push_back(ModelResponseEvent::MessageDelta(text));
                    }
                }
                if let Some(call) = part.function_call {
                    let id = call.id.unwrap_or_else(|| {
                        format!("gemini-call-{}", self.tool_call_count)
                    });
                    self.tool_call_count += 1;
                    let req = ToolCallRequest {
                        id,
                        name: call.name,
                        arguments: call.args,
                    };
                    self.pending_events
                        .push_back(ModelResponseEvent::ToolCall(req));
                }
            }

            if let Some(reason) = candidate.finish_reason {
                if SAFETY_REASONS.contains(&reason.as_str()) {
                    return Err(Error::new(
                        format!("The response was blocked: {reason}"),
                        ErrorKind::Moderated,
                    ));
                }
                debug!("candidate finished: {reason}");
                self.complete();
            }
        }
        Ok(())
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming response of the Gemini backend.
    pub struct GeminiResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl GeminiResponse {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            pending_events: Default::default(),
            tool_call_count: 0,
            completed: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future
        // for the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.completed {
            return Ok((None, partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                // Some proxies cut the stream without a finish reason.
                warn!("stream ended without a finish reason");
                partial_state.complete();
                continue;
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");

        let chunk = serde_json::from_str::<GenerateContentChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        partial_state.handle_chunk(chunk)?;
    }
}
