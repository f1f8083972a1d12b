//! A local fake model backend for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use barry_model::{
    BackendKind, ErrorKind, ModelBackend, ModelBackendError,
    ModelFinishReason, ModelRequest, ModelResponse, ModelResponseEvent,
    ToolDeclaration,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Error {}

impl ModelBackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let preset_events = &this.events;
            if this.event_idx < preset_events.len() {
                let event = match &preset_events[this.event_idx] {
                    PresetEvent::MessageDelta(msg) => {
                        ModelResponseEvent::MessageDelta(msg.clone())
                    }
                    PresetEvent::ToolCall(req) => {
                        ModelResponseEvent::ToolCall(req.clone())
                    }
                };
                this.event_idx += 1;
                return Poll::Ready(Ok(Some(event)));
            } else if this.event_idx == preset_events.len() {
                this.event_idx += 1;
                let has_tool_call = preset_events
                    .iter()
                    .any(|event| matches!(event, PresetEvent::ToolCall(_)));
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    if has_tool_call {
                        ModelFinishReason::ToolCalls
                    } else {
                        ModelFinishReason::Stop
                    },
                ))));
            } else {
                // In case this method is called after completion.
                return Poll::Ready(Ok(None));
            }
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

#[derive(Default)]
struct State {
    script: VecDeque<PresetResponse>,
    attempts: u64,
    requests: Vec<ModelRequest>,
    declarations: Vec<ToolDeclaration>,
}

/// A local fake model backend for testing purpose.
///
/// Before sending requests, you need to queue the responses the model should
/// give, one per call to [`converse`](ModelBackend::converse). If the queue
/// is exhausted, an error will be returned.
///
/// The backend is cheap to clone and all clones share the same script and
/// records, so a test can keep a handle after moving the backend into the
/// code under test.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone)]
pub struct TestModelBackend {
    kind: BackendKind,
    delay: Option<Duration>,
    state: Arc<Mutex<State>>,
}

impl Default for TestModelBackend {
    fn default() -> Self {
        Self::new(BackendKind::Gemini)
    }
}

impl TestModelBackend {
    /// Creates an empty backend that expects declarations of `kind`.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            delay: None,
            state: Default::default(),
        }
    }

    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.state().script.push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, including failed attempts.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.state().requests.clone()
    }

    /// Returns the tools declared by the last `declare_tools` call.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.state().declarations.clone()
    }

    /// Returns the number of queued responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.state().script.len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_response(
        &self,
        req: &ModelRequest,
    ) -> Result<Vec<PresetEvent>, Error> {
        let mut state = self.state();
        state.requests.push(req.clone());

        let Some(preset) = state.script.front() else {
            return Err(Error {
                message: "no enough responses",
                kind: ErrorKind::Other,
            });
        };
        if let Some(failures) = preset.failures {
            let kind = preset.failure_kind;
            if failures == 0 || state.attempts < failures {
                state.attempts += 1;
                return Err(Error {
                    message: "injected failure",
                    kind,
                });
            }
        }

        state.attempts = 0;
        Ok(state
            .script
            .pop_front()
            .map(|preset| preset.events)
            .unwrap_or_default())
    }
}

impl ModelBackend for TestModelBackend {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn declare_tools(&mut self, declarations: Vec<ToolDeclaration>) {
        self.state().declarations = declarations;
    }

    fn converse(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let resp = self.next_response(req).map(|events| TestModelResponse {
            events,
            event_idx: 0,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        });
        ready(resp)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use barry_model::{ModelMessage, ModelRequest, ToolCallRequest};
    use serde_json::json;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>, ModelFinishReason) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_call = None;
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
                .unwrap();
            match event {
                ModelResponseEvent::Completed(reason) => {
                    return (msg, tool_call, reason);
                }
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
                ModelResponseEvent::ToolCall(req) => tool_call = Some(req),
            }
        }
    }

    #[tokio::test]
    async fn test_converse() {
        let mut backend = TestModelBackend::default();
        backend.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        backend.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Let me check.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest::from_value(
                "call:1",
                "query_skus_by_fat",
                json!({ "fat_value": 30 }),
            )),
        ]));

        let mut req = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
        };
        let resp = backend.converse(&req).await.unwrap();
        let (msg, _, reason) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");
        assert_eq!(reason, ModelFinishReason::Stop);

        req.messages.push(ModelMessage::Assistant(msg));
        req.messages
            .push(ModelMessage::User("Any fatty SKUs?".to_owned()));
        let resp = backend.converse(&req).await.unwrap();
        let (msg, tool_call, reason) = collect_response(resp).await;
        assert_eq!(msg, "Let me check.");
        assert_eq!(reason, ModelFinishReason::ToolCalls);
        let tool_call = tool_call.unwrap();
        assert_eq!(tool_call.name, "query_skus_by_fat");
        assert_eq!(tool_call.arguments["fat_value"], json!(30));

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1], req);
        assert_eq!(backend.remaining(), 0);

        let err = backend.converse(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_failures() {
        let mut backend = TestModelBackend::new(BackendKind::Ollama);
        backend.add_response(PresetResponse::text("ok").with_failures(2));

        let req = ModelRequest::default();
        for _ in 0..2 {
            let err = backend.converse(&req).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        }
        let resp = backend.converse(&req).await.unwrap();
        let (msg, _, _) = collect_response(resp).await;
        assert_eq!(msg, "ok");
        assert_eq!(backend.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_shared_clone() {
        let backend = TestModelBackend::new(BackendKind::Ollama);
        let mut moved = backend.clone();
        moved.add_response(
            PresetResponse::text("never")
                .with_failures(0)
                .with_failure_kind(ErrorKind::Moderated),
        );
        moved.declare_tools(vec![]);

        let req = ModelRequest::default();
        let err = moved.converse(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Moderated);
        assert_eq!(backend.remaining(), 1);
        assert_eq!(backend.requests().len(), 1);
    }
}
