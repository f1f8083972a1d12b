use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use barry_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::Lines;
use crate::proto::ChatChunk;

struct PartialState {
    lines: Lines,
    // Events decoded from a chunk but not yet delivered.
    pending_events: VecDeque<ModelResponseEvent>,
    tool_call_count: usize,
    completed: bool,
}

impl PartialState {
    fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let reason = if self.tool_call_count > 0 {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        };
        self.pending_events
            .push_back(ModelResponseEvent::Completed(reason));
    }

    fn handle_chunk(&mut self, chunk: ChatChunk) -> Result<(), Error> {
        if let Some(error) = chunk.error {
            return Err(Error::new(error, ErrorKind::Other));
        }

        if let Some(message) = chunk.message {
            if !message.content.is_empty() {
                let delta = ModelResponseEvent::MessageDelta(message.content);
                self.pending_events.push_back(delta);
            }
            for call in message.tool_calls {
                let id = format!("ollama-call-{}", self.tool_call_count);
                self.tool_call_count += 1;
                let name = call.function.name.clone();
                let req = ToolCallRequest::from_value(
                    id,
                    name,
                    call.function.arguments(),
                );
                self.pending_events
                    .push_back(ModelResponseEvent::ToolCall(req));
            }
        }

        if chunk.done {
            debug!("chat finished: {:?}", chunk.done_reason);
            self.complete();
        }
        Ok(())
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming response of the Ollama backend.
    pub struct OllamaResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OllamaResponse {
    #[inline]
    pub(crate) fn from_lines(lines: Lines) -> Self {
        let partial_state = PartialState {
            lines,
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

impl ModelResponse for OllamaResponse {
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

        let line = match partial_state.lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                warn!("stream ended before the final chunk");
                partial_state.complete();
                continue;
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got chunk: {line}");

        let chunk = serde_json::from_str::<ChatChunk>(&line)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        partial_state.handle_chunk(chunk)?;
    }
}
