use async_trait::async_trait;
use barry_model::ToolDescriptor;
use serde_json::{Map, Value};

use crate::config::WorkerConfig;
use crate::error::Error;

/// A piece of content returned by a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContentPart {
    /// Plain text.
    Text(String),
    /// Anything that is not text, such as an image or a resource.
    Binary {
        /// The media type of the content.
        mime_type: String,
    },
}

/// The raw output of a tool call, as reported by the worker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ToolOutput {
    /// The content parts, in the order the worker sent them.
    pub parts: Vec<ContentPart>,
    /// Whether the worker flagged the call as failed.
    pub is_error: bool,
}

impl ToolOutput {
    /// Creates a successful output with one text part.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            parts: vec![ContentPart::Text(text.into())],
            is_error: false,
        }
    }

    /// Creates a failed output with one text part.
    #[inline]
    pub fn error<S: Into<String>>(text: S) -> Self {
        Self {
            parts: vec![ContentPart::Text(text.into())],
            is_error: true,
        }
    }

    /// Renders the output as the text handed to the model.
    ///
    /// Text parts are joined by newlines. An output without any text reads
    /// `No result`, and a failed output is prefixed with `Error: `.
    pub fn render(&self) -> String {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Binary { .. } => None,
            })
            .collect();
        let text = if texts.is_empty() {
            "No result".to_owned()
        } else {
            texts.join("\n")
        };
        if self.is_error {
            format!("Error: {text}")
        } else {
            text
        }
    }
}

/// Starts worker processes.
///
/// A launcher must spawn the worker and complete the capability handshake
/// before returning. The caller bounds the whole operation with the
/// configured handshake timeout, and dropping the returned future must
/// release the worker.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Spawns a worker and performs the handshake.
    async fn launch(
        &self,
        config: &WorkerConfig,
    ) -> Result<Box<dyn WorkerConnection>, Error>;
}

/// An established connection to a worker.
///
/// Dropping the connection must terminate the worker.
#[async_trait]
pub trait WorkerConnection: Send + Sync {
    /// Lists the tools the worker exposes.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error>;

    /// Calls a tool.
    ///
    /// An `Err` means the call never produced a result, e.g. the transport
    /// broke. Failures reported by the tool itself come back as an output
    /// with [`is_error`](ToolOutput::is_error) set.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, Error>;

    /// Shuts the connection down and terminates the worker.
    async fn shutdown(self: Box<Self>) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let output = ToolOutput {
            parts: vec![
                ContentPart::Text("first".to_owned()),
                ContentPart::Binary {
                    mime_type: "image/png".to_owned(),
                },
                ContentPart::Text("second".to_owned()),
            ],
            is_error: false,
        };
        assert_eq!(output.render(), "first\nsecond");

        assert_eq!(ToolOutput::default().render(), "No result");
        assert_eq!(ToolOutput::error("boom").render(), "Error: boom");
    }
}
