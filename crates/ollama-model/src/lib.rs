//! A model backend for a local Ollama server.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use barry_model::translate::OllamaFunctionTool;
use barry_model::{
    BackendKind, ErrorKind, ModelBackend, ModelBackendError, ModelRequest,
    ToolDeclaration,
};
use mime::Mime;
use reqwest::{Client, Response, StatusCode, header};

pub use config::{OllamaConfig, OllamaConfigBuilder};
use io::Lines;
use proto::TagsResponse;
pub use response::OllamaResponse;

/// Error type for [`OllamaBackend`].
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

    fn other(err: impl Display) -> Self {
        Self::new(err.to_string(), ErrorKind::Other)
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

/// Ollama model backend.
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    client: Client,
    config: Arc<OllamaConfig>,
    tools: Arc<[OllamaFunctionTool]>,
}

impl OllamaBackend {
    /// Creates a new `OllamaBackend` with the given configuration.
    #[inline]
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
            tools: Vec::new().into(),
        }
    }

    /// Returns the configuration of this backend.
    #[inline]
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Checks that the configured model has been pulled on the server.
    ///
    /// The error message lists the models that are available instead.
    pub async fn ensure_model_available(&self) -> Result<(), Error> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|err| {
                Error::other(format!(
                    "Cannot reach Ollama at {}: {err}",
                    self.config.base_url
                ))
            })?;
        let tags: TagsResponse = resp.json().await.map_err(Error::other)?;

        let model = &self.config.model;
        if tags.models.iter().any(|tag| tag.id() == model) {
            return Ok(());
        }
        let available: Vec<_> = tags.models.iter().map(|t| t.id()).collect();
        Err(Error::other(format!(
            "Model `{model}` not found locally (available: {}). \
             To pull the model, run: ollama pull {model}",
            available.join(", ")
        )))
    }
}

impl ModelBackend for OllamaBackend {
    type Error = Error;
    type Response = OllamaResponse;

    #[inline]
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    fn declare_tools(&mut self, declarations: Vec<ToolDeclaration>) {
        self.tools = declarations
            .into_iter()
            .filter_map(|decl| match decl {
                ToolDeclaration::Ollama(tool) => Some(tool),
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
        let ollama_req = proto::create_request(req, &self.tools, &self.config);
        let resp_fut = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&ollama_req)
            .send();

        async move {
            let resp = resp_fut.await.map_err(Error::other)?;

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
                    format!("Ollama returned {status}: {body}"),
                    kind,
                ));
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_valid_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| {
                    matches!(m.subtype().as_str(), "x-ndjson" | "json")
                })
                .unwrap_or(false);
            if !is_valid_content_type {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            // Here we got a successful response.
            Ok(OllamaResponse::from_lines(Lines::from_response(resp)))
        }
    }
}
