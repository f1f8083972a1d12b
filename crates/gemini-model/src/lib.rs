//! A model backend for the Gemini API.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use barry_model::translate::GeminiFunctionDeclaration;
use barry_model::{
    BackendKind, ErrorKind, ModelBackend, ModelBackendError, ModelRequest,
    ToolDeclaration,
};
use mime::Mime;
use reqwest::{Client, StatusCode, header};

pub use config::{GeminiConfig, GeminiConfigBuilder};
use io::Sse;
pub use response::GeminiResponse;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Error type for [`GeminiBackend`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelBackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Gemini model backend.
#[derive(Clone, Debug)]
pub struct GeminiBackend {
    client: Client,
    config: Arc<GeminiConfig>,
    declarations: Arc<[GeminiFunctionDeclaration]>,
}

impl GeminiBackend {
    /// Creates a new `GeminiBackend` with the given configuration.
    #[inline]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
            declarations: Vec::new().into(),
        }
    }

    /// Returns the configuration of this backend.
    #[inline]
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

impl ModelBackend for GeminiBackend {
    type Error = Error;
    type Response = GeminiResponse;

    #[inline]
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    fn declare_tools(&mut self, declarations: Vec<ToolDeclaration>) {
        self.declarations = declarations
            .into_iter()
            .filter_map(|decl| match decl {
                ToolDeclaration::Gemini(decl) => Some(decl),
                other => {
                    warn!("ignoring foreign declaration `{}`", other.name());
                    None
                }
            })
            .collect();
    }

    fn converse(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let gemini_req =
            proto::create_request(req, &self.declarations, &self.config);
        let resp_fut = self
            .client
            .post(self.config.endpoint())
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .json(&gemini_req)
            .send();

        async move {
            let resp = resp_fut.await.map_err(|err| {
                Error::new(format!("{err}"), ErrorKind::Other)
            })?;

            let status = resp.status();
            if !status.is_success() {
                let kind = match status {
                    StatusCode::TOO_MANY_REQUESTS => {
                        ErrorKind::RateLimitExceeded
                    }
                    _ => ErrorKind::Other,
                };
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::new(
                    format!("Gemini API returned {status}: {body}"),
                    kind,
                ));
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            // Here we got a successful response.
            Ok(GeminiResponse::from_sse(Sse::from_response(resp)))
        }
    }
}

#[cfg(test)]
mod tests {
    use barry_model::{ToolDescriptor, translate_all};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_declare_tools() {
        let tools = [ToolDescriptor::from_input_schema(
            "query_skus_by_fat",
            "Query SKUs by fat",
            json!({ "properties": { "fat_value": { "type": "number" } } }),
        )];
        let mut backend =
            GeminiBackend::new(GeminiConfigBuilder::with_api_key("x").build());
        assert_eq!(backend.kind(), BackendKind::Gemini);

        let declarations = translate_all(&tools, BackendKind::Gemini);
        backend.declare_tools(declarations.unwrap());
        assert_eq!(backend.declarations.len(), 1);

        let declarations = translate_all(&tools, BackendKind::Ollama);
        backend.declare_tools(declarations.unwrap());
        assert!(backend.declarations.is_empty());
    }
}
