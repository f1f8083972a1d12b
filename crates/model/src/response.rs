use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::ModelBackendError;

/// A response from the model backend.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type that may be returned by the backend.
    type Error: ModelBackendError;

    /// Attempts to pull out the next event from the response.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct response state:
    ///
    /// - `Poll::Pending` means that this response is still waiting for
    ///   the next event. Implementations will ensure that the current
    ///   task will be notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means the response has an event
    ///   to deliver, and may produce further events on subsequent
    ///   `poll_next_event` calls.
    /// - `Poll::Ready(Ok(None))` means the response has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   processing the response.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// The reason why a model response has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The model needs to call a tool.
    ToolCalls,
    /// The model has finished generating text.
    Stop,
}

/// Describes a tool call request from the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The arguments to pass to the tool, keyed by parameter name.
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    /// Creates a request from loosely typed arguments.
    ///
    /// Backends don't always honor the declared schema. Anything other
    /// than a JSON object is treated as an empty argument list, which the
    /// tool session will then reject with a readable error if the tool
    /// has required parameters.
    pub fn from_value<ID: Into<String>, N: Into<String>>(
        id: ID,
        name: N,
        arguments: Value,
    ) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The event from a model response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// The response has been completed.
    Completed(ModelFinishReason),
    /// Received a message delta.
    MessageDelta(String),
    /// Received a tool call request.
    ToolCall(ToolCallRequest),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_value() {
        let req = ToolCallRequest::from_value(
            "call:0",
            "query_skus_by_fat",
            json!({ "fat_value": 30, "operator": ">" }),
        );
        assert_eq!(req.arguments.len(), 2);
        assert_eq!(req.arguments["fat_value"], json!(30));

        let req = ToolCallRequest::from_value("call:1", "noop", json!("30"));
        assert!(req.arguments.is_empty());
    }
}
