
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::OllamaConfig;
use crate::providers::{EmbeddingProvider, GenerationOptions, GenerationProvider};
use crate::{RagError, Result};

/// Upper bound applied at the HTTP layer; generation against a cold model
/// can take a while on modest hardware.
const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// Client for a single Ollama instance, serving both embedding and
/// generation requests. Constructed explicitly and injected wherever a
/// provider is needed; there is no shared global instance.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    generation_model: String,
    keep_alive: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
    keep_alive: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    keep_alive: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateModelOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateModelOptions {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    name: String,
    size: Option<u64>,
    details: Option<RawModelDetails>,
}

#[derive(Debug, Deserialize)]
struct RawModelDetails {
    family: Option<String>,
    parameter_size: Option<String>,
}

/// Normalized description of a model known to the serving runtime. The raw
/// wire shape varies between server versions; everything downstream of the
/// client only ever sees this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: Option<u64>,
    pub family: Option<String>,
    pub parameter_size: Option<String>,
}

impl From<RawModel> for ModelInfo {
    fn from(raw: RawModel) -> Self {
        let (family, parameter_size) = raw
            .details
            .map(|d| (d.family, d.parameter_size))
            .unwrap_or((None, None));
        Self {
            name: raw.name,
            size_bytes: raw.size,
            family,
            parameter_size,
        }
    }
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| RagError::Config(format!("Failed to build Ollama URL: {}", e)))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            keep_alive: config.keep_alive.clone(),
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn generation_model(&self) -> &str {
        &self.generation_model
    }

    /// Test connection to the Ollama server and verify both configured
    /// models are available
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping()?;

        let models = self.list_models()?;
        self.require_model(&models, &self.embedding_model)?;
        self.require_model(&models, &self.generation_model)?;

        info!(
            "Health check passed for Ollama server at {} (embedding: {}, generation: {})",
            self.base_url, self.embedding_model, self.generation_model
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self.join("/api/tags")?;

        debug!("Pinging Ollama server at {}", url);

        self.get(&url)
            .map_err(|e| classify_provider_error("ping failed", &e))?;

        debug!("Server ping successful");
        Ok(())
    }

    /// List all models available on the server, normalized into [`ModelInfo`]
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.join("/api/tags")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .get(&url)
            .map_err(|e| classify_provider_error("failed to list models", &e))?;

        let tags: TagsResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Provider(format!("Malformed models response: {}", e)))?;

        debug!("Found {} models", tags.models.len());
        Ok(tags.models.into_iter().map(ModelInfo::from).collect())
    }

    fn require_model(&self, models: &[ModelInfo], name: &str) -> Result<()> {
        if models.iter().any(|m| m.name == name) {
            debug!("Model {} is available", name);
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!("Model {} not found. Available models: {:?}", name, available);
            Err(RagError::Provider(format!(
                "Model '{}' is not available. Available models: {:?}",
                name, available
            )))
        }
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Provider(format!("Failed to build URL for {}: {}", path, e)))
    }

    fn get(&self, url: &Url) -> std::result::Result<String, ureq::Error> {
        self.agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
    }

    fn post_json(&self, url: &Url, body: &str) -> std::result::Result<String, ureq::Error> {
        self.agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
    }
}

impl EmbeddingProvider for OllamaClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: self.embedding_model.clone(),
            prompt: text.to_string(),
            keep_alive: self.keep_alive.clone(),
        };

        let url = self.join("/api/embeddings")?;
        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Provider(format!("Failed to serialize request: {}", e)))?;

        let response_text = self
            .post_json(&url, &request_json)
            .map_err(|e| classify_provider_error("embedding request failed", &e))?;

        let embed_response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Provider(format!("Malformed embedding response: {}", e)))?;

        debug!(
            "Generated embedding with {} dimensions",
            embed_response.embedding.len()
        );

        Ok(embed_response.embedding)
    }
}

impl GenerationProvider for OllamaClient {
    #[inline]
    fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        debug!(
            "Generating completion with model {} (prompt length: {})",
            options.model,
            prompt.len()
        );

        let request = GenerateRequest {
            model: options.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            keep_alive: options.keep_alive.clone(),
            options: options
                .num_predict
                .map(|num_predict| GenerateModelOptions { num_predict }),
        };

        let url = self.join("/api/generate")?;
        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Generation(format!("Failed to serialize request: {}", e)))?;

        let response_text = self
            .post_json(&url, &request_json)
            .map_err(|e| RagError::Generation(format!("Generation request failed: {}", e)))?;

        let generate_response: GenerateResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Generation(format!("Malformed generation response: {}", e)))?;

        debug!(
            "Generated completion ({} bytes)",
            generate_response.response.len()
        );

        Ok(generate_response.response)
    }
}

/// Splits transport failures (server not reachable) from everything else so
/// the caller sees the right error category. No retry is attempted in either
/// case; failures surface to the caller on the first attempt.
fn classify_provider_error(context: &str, error: &ureq::Error) -> RagError {
    match error {
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => {
            warn!("Transport error: {}: {}", context, error);
            RagError::ProviderUnavailable(format!("{}: {}", context, error))
        }
        ureq::Error::StatusCode(status) => {
            warn!("Server returned status {}: {}", status, context);
            RagError::Provider(format!("{}: HTTP {}", context, status))
        }
        _ => RagError::Provider(format!("{}: {}", context, error)),
    }
}
