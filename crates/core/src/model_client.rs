use std::future::poll_fn;
use std::pin::pin;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use barry_model::{
    ErrorKind, ModelBackend, ModelBackendError, ModelFinishReason, ModelRequest, ModelResponse,
    ModelResponseEvent, ToolCallRequest,
};
use tokio::time::sleep;
use tracing::Instrument;

use crate::error::BackendError;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Controls how rate-limited requests are retried.
///
/// Only requests rejected with
/// [`RateLimitExceeded`](ErrorKind::RateLimitExceeded) before any event
/// was streamed are retried. The delay between attempts grows
/// exponentially, starting from the initial interval and capped at the
/// max interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_interval: Duration,
    max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy that never retries.
    #[inline]
    pub fn never() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Sets how many times a request may be retried.
    #[inline]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first retry.
    #[inline]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Sets the longest delay between two attempts.
    #[inline]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Returns how many times a request may be retried.
    #[inline]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn backoff(&self) -> impl Backoff {
        // Retries are bounded by count, not by wall time.
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// A wrapper around a model backend that drives its streaming responses
/// and retries rate-limited requests.
pub(crate) struct ModelClient<B> {
    backend: B,
    retry_policy: RetryPolicy,
}

/// A completely received response from the model client.
#[derive(Clone, Debug)]
pub(crate) struct ModelClientResponse {
    pub transcript: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

enum Failure<E> {
    /// The backend rejected the request, nothing was streamed.
    Rejected(E),
    /// The response broke while streaming.
    Interrupted(E),
}

impl<B: ModelBackend> ModelClient<B> {
    #[inline]
    pub fn new(backend: B, retry_policy: RetryPolicy) -> Self {
        Self {
            backend,
            retry_policy,
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Sends a request and collects the response, calling `on_delta` with
    /// every text delta as it arrives.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn send_request<F: Fn(&str)>(
        &self,
        req: &ModelRequest,
        on_delta: F,
    ) -> Result<ModelClientResponse, BackendError> {
        trace!("got a request: {req:?}");
        let mut backoff = self.retry_policy.backoff();
        let mut attempt = 0;
        loop {
            let span = trace_span!("model client req", attempt);
            let failure = match self
                .try_send_request(req, &on_delta)
                .instrument(span)
                .await
            {
                Ok(resp) => return Ok(resp),
                Err(failure) => failure,
            };

            let err = match failure {
                Failure::Rejected(err)
                    if err.kind() == ErrorKind::RateLimitExceeded
                        && attempt < self.retry_policy.max_retries =>
                {
                    err
                }
                Failure::Rejected(err) | Failure::Interrupted(err) => {
                    error!("got an error: {err:?}");
                    return Err(BackendError::new(err));
                }
            };

            attempt += 1;
            let delay = backoff
                .next_backoff()
                .unwrap_or(self.retry_policy.max_interval);
            warn!(
                "rate limited ({err}), retry {attempt}/{} in {delay:?}",
                self.retry_policy.max_retries
            );
            sleep(delay).await;
        }
    }

    async fn try_send_request<F: Fn(&str)>(
        &self,
        req: &ModelRequest,
        on_delta: &F,
    ) -> Result<ModelClientResponse, Failure<B::Error>> {
        let resp = self.backend.converse(req).await.map_err(Failure::Rejected)?;

        let mut transcript = String::new();
        let mut tool_calls = Vec::new();
        let mut finish_reason = None;

        trace!("start receiving events");

        let mut pinned_resp = pin!(resp);
        loop {
            let event =
                poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx))
                    .await
                    .map_err(Failure::Interrupted)?;
            let Some(event) = event else {
                break;
            };
            trace!("got an event: {event:?}");

            match event {
                ModelResponseEvent::MessageDelta(msg) => {
                    on_delta(&msg);
                    transcript.push_str(&msg);
                }
                ModelResponseEvent::ToolCall(req) => {
                    tool_calls.push(req);
                }
                ModelResponseEvent::Completed(reason) => {
                    finish_reason = Some(reason);
                    // Nothing meaningful follows the completion event.
                    break;
                }
            }
        }

        trace!("finished a request");

        Ok(ModelClientResponse {
            transcript,
            tool_calls,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use barry_model::{BackendKind, ModelMessage};
    use barry_test_model::{PresetEvent, PresetResponse, TestModelBackend};
    use serde_json::json;

    use super::*;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut backend = TestModelBackend::default();
        backend.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("How ".to_owned()),
            PresetEvent::MessageDelta("are ".to_owned()),
            PresetEvent::MessageDelta("you?".to_owned()),
        ]));
        backend.add_response(PresetResponse::tool_calls([
            ToolCallRequest::from_value(
                "call:0",
                "query_skus_by_fat",
                json!({ "fat_value": 30 }),
            ),
        ]));

        let model_client = ModelClient::new(backend, RetryPolicy::never());
        let deltas = RefCell::new(vec![]);
        let resp = model_client
            .send_request(&request(), |delta| {
                deltas.borrow_mut().push(delta.to_owned())
            })
            .await
            .unwrap();
        assert_eq!(resp.transcript, "How are you?");
        assert_eq!(resp.finish_reason, Some(ModelFinishReason::Stop));
        assert_eq!(deltas.borrow().len(), 3);

        let resp = model_client.send_request(&request(), |_| {}).await.unwrap();
        assert!(resp.transcript.is_empty());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.finish_reason, Some(ModelFinishReason::ToolCalls));
    }

    #[tokio::test]
    async fn test_error_handling() {
        let backend = TestModelBackend::default();
        let model_client =
            ModelClient::new(backend.clone(), RetryPolicy::default());
        let err = model_client
            .send_request(&request(), |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        // Only rate limits are retried.
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_rate_limited() {
        let mut backend = TestModelBackend::new(BackendKind::Ollama);
        backend.add_response(PresetResponse::text("fine").with_failures(2));
        let model_client =
            ModelClient::new(backend.clone(), RetryPolicy::default());
        let resp = model_client.send_request(&request(), |_| {}).await.unwrap();
        assert_eq!(resp.transcript, "fine");
        assert_eq!(backend.requests().len(), 3);

        let mut backend = TestModelBackend::new(BackendKind::Ollama);
        backend.add_response(PresetResponse::text("never").with_failures(0));
        let policy = RetryPolicy::default().with_max_retries(2);
        let model_client = ModelClient::new(backend.clone(), policy);
        let err = model_client
            .send_request(&request(), |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(backend.requests().len(), 3);
    }
}
