use std::error::Error as StdError;
use std::fmt::{self, Display};

use barry_gemini_model::{GeminiConfig, GeminiConfigBuilder};
use barry_model::BackendKind;
use barry_ollama_model::{OllamaConfig, OllamaConfigBuilder};
use barry_tool_session::WorkerConfig;

const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// The error returned when a client configuration holds invalid values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The Gemini API key is empty.
    MissingApiKey,
    /// The model name is empty.
    EmptyModel,
    /// The Ollama base URL is not an HTTP URL.
    InvalidBaseUrl(String),
    /// The tool round limit is zero.
    ZeroToolRounds,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingApiKey => {
                write!(f, "The Gemini API key must not be empty")
            }
            ConfigError::EmptyModel => {
                write!(f, "The model name must not be empty")
            }
            ConfigError::InvalidBaseUrl(url) => {
                write!(f, "`{url}` is not an HTTP URL")
            }
            ConfigError::ZeroToolRounds => {
                write!(f, "At least one tool round must be allowed")
            }
        }
    }
}

impl StdError for ConfigError {}

/// The model backend a client talks to.
#[derive(Clone, Debug)]
pub enum BackendConfig {
    /// The Gemini API.
    Gemini(GeminiConfig),
    /// A local Ollama server.
    Ollama(OllamaConfig),
}

impl BackendConfig {
    /// Configures the Gemini backend. The default model is used when
    /// `model` is `None`.
    pub fn gemini<S: Into<String>>(
        api_key: S,
        model: Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        let mut builder = GeminiConfigBuilder::with_api_key(api_key);
        if let Some(model) = model {
            builder = builder.with_model(non_empty_model(model)?);
        }
        Ok(BackendConfig::Gemini(builder.build()))
    }

    /// Configures the Ollama backend. Defaults are used for the values
    /// that are `None`.
    pub fn ollama(
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = OllamaConfigBuilder::new();
        if let Some(model) = model {
            builder = builder.with_model(non_empty_model(model)?);
        }
        if let Some(base_url) = base_url {
            let is_http = base_url.starts_with("http://")
                || base_url.starts_with("https://");
            if !is_http {
                return Err(ConfigError::InvalidBaseUrl(base_url));
            }
            builder = builder.with_base_url(base_url);
        }
        Ok(BackendConfig::Ollama(builder.build()))
    }

    /// Returns the declaration shape of the backend.
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Gemini(_) => BackendKind::Gemini,
            BackendConfig::Ollama(_) => BackendKind::Ollama,
        }
    }

    /// Returns the model name.
    pub fn model(&self) -> &str {
        match self {
            BackendConfig::Gemini(config) => config.model(),
            BackendConfig::Ollama(config) => config.model(),
        }
    }
}

fn non_empty_model(model: String) -> Result<String, ConfigError> {
    if model.trim().is_empty() {
        Err(ConfigError::EmptyModel)
    } else {
        Ok(model)
    }
}

/// Builder for [`ClientConfig`].
#[derive(Clone, Debug)]
pub struct ClientConfigBuilder {
    worker: WorkerConfig,
    backend: BackendConfig,
    max_tool_rounds: Option<usize>,
    system_prompt: Option<String>,
}

impl ClientConfigBuilder {
    /// Creates a builder with the worker and backend to use.
    #[inline]
    pub fn new(worker: WorkerConfig, backend: BackendConfig) -> Self {
        Self {
            worker,
            backend,
            max_tool_rounds: None,
            system_prompt: None,
        }
    }

    /// Sets how many tool rounds a single turn may take.
    #[inline]
    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = Some(max_tool_rounds);
        self
    }

    /// Sets the system prompt.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Validates the values and builds the configuration.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let max_tool_rounds =
            self.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS);
        if max_tool_rounds == 0 {
            return Err(ConfigError::ZeroToolRounds);
        }
        Ok(ClientConfig {
            worker: self.worker,
            backend: self.backend,
            max_tool_rounds,
            system_prompt: self.system_prompt,
        })
    }
}

/// Everything a client needs to run a session.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    worker: WorkerConfig,
    backend: BackendConfig,
    max_tool_rounds: usize,
    system_prompt: Option<String>,
}

impl ClientConfig {
    /// Returns the worker configuration.
    #[inline]
    pub fn worker(&self) -> &WorkerConfig {
        &self.worker
    }

    /// Returns the backend configuration.
    #[inline]
    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// Returns how many tool rounds a single turn may take.
    #[inline]
    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
    }

    /// Returns the system prompt, if any.
    #[inline]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }
}
