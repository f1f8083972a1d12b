const DEFAULT_MODEL: &str = "qwen2.5-coder:7b";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Builder for [`OllamaConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OllamaConfigBuilder {
    model: Option<String>,
    base_url: Option<String>,
}

impl OllamaConfigBuilder {
    /// Creates a builder with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model to use.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a custom base URL.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> OllamaConfig {
        OllamaConfig {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: self
                .base_url
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

/// Configuration for the Ollama backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OllamaConfig {
    pub(crate) model: String,
    pub(crate) base_url: String,
}

impl OllamaConfig {
    /// Returns the model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the base URL of the server.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build() {
        let config = OllamaConfigBuilder::new().build();
        assert_eq!(config.model(), "qwen2.5-coder:7b");
        assert_eq!(config.base_url(), "http://localhost:11434");

        let config = OllamaConfigBuilder::new()
            .with_model("llama3.1")
            .with_base_url("http://gpu-box:11434/")
            .build();
        assert_eq!(config.model(), "llama3.1");
        assert_eq!(config.base_url(), "http://gpu-box:11434");
    }
}
