//! Inference collaborators: text generation and embeddings.
//!
//! The core only depends on the [`TextGenerator`] and [`Embedder`] contracts.
//! [`TgiClient`] and [`TeiClient`] implement them over HTTP (TGI/TEI, Ollama,
//! OpenAI-compatible APIs), plus offline providers for local runs and tests.

use crate::config::{env_or_default, env_positive_usize, env_usize};
use crate::{AgentError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_TEI_URL: &str = "http://localhost:8081";
const DEFAULT_TEI_PROVIDER: &str = "tei";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_EMBED_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_TGI_URL: &str = "http://localhost:8082";
const DEFAULT_TGI_PROVIDER: &str = "tgi";
const DEFAULT_OLLAMA_MODEL: &str = "phi4-mini:latest";
const DEFAULT_OPENAI_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_OPENAI_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_TEI_MAX_BATCH: usize = 32;
const DEFAULT_TIMEOUT_SECS: usize = 120;
const DEFAULT_MAX_NEW_TOKENS: usize = 1024;
const DEFAULT_LOCAL_DIMENSION: usize = 256;

/// Generate text from a prompt
#[allow(async_fn_in_trait)]
pub trait TextGenerator {
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String>;
}

/// Embed text into fixed-size vectors
#[allow(async_fn_in_trait)]
pub trait Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts; output order matches input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        (**self).complete(prompt, system_prompt).await
    }
}

impl<T: Embedder + ?Sized> Embedder for &T {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }
}

// ==========================================
// EMBEDDINGS
// ==========================================

#[derive(Clone)]
enum TeiProvider {
    Tei,
    Ollama,
    Local(HashEmbedder),
}

/// Embedding client (TEI, Ollama, or the offline hashing embedder)
#[derive(Clone)]
pub struct TeiClient {
    client: Client,
    base_url: String,
    provider: TeiProvider,
    model: String,
    max_batch: usize,
    dimension: Option<usize>,
}

impl TeiClient {
    /// TEI client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            provider: TeiProvider::Tei,
            model: DEFAULT_OLLAMA_EMBED_MODEL.to_string(),
            max_batch: DEFAULT_TEI_MAX_BATCH,
            dimension: None,
        }
    }

    /// Ollama embeddings client
    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: TeiProvider::Ollama,
            model: model.into(),
            ..Self::new(base_url)
        }
    }

    /// Offline hashing embedder; no network access
    pub fn local(dimension: usize) -> Self {
        let embedder = HashEmbedder::new(dimension);
        Self {
            dimension: Some(embedder.dimension()),
            provider: TeiProvider::Local(embedder),
            ..Self::new("local")
        }
    }

    /// Build from `TEI_PROVIDER` (`tei`, `ollama`, `local`), `TEI_URL`,
    /// `TEI_MODEL`, `TEI_MAX_BATCH` and `TEI_DIMENSION`
    pub fn default_local() -> Self {
        let provider = env_or_default("TEI_PROVIDER", DEFAULT_TEI_PROVIDER);
        let dimension = match env_usize("TEI_DIMENSION", 0) {
            0 => None,
            dim => Some(dim),
        };

        let client = if provider.eq_ignore_ascii_case("ollama") {
            Self::ollama(
                env_or_default("TEI_URL", DEFAULT_OLLAMA_URL),
                env_or_default("TEI_MODEL", DEFAULT_OLLAMA_EMBED_MODEL),
            )
        } else if provider.eq_ignore_ascii_case("local") {
            Self::local(dimension.unwrap_or(DEFAULT_LOCAL_DIMENSION))
        } else {
            Self::new(env_or_default("TEI_URL", DEFAULT_TEI_URL))
        };

        Self {
            max_batch: env_positive_usize("TEI_MAX_BATCH", DEFAULT_TEI_MAX_BATCH),
            dimension: dimension.or(client.dimension),
            ..client
        }
    }

    /// Builder: reject vectors whose length differs from `dimension`
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn provider_name(&self) -> &'static str {
        match self.provider {
            TeiProvider::Tei => "tei",
            TeiProvider::Ollama => "ollama",
            TeiProvider::Local(_) => "local",
        }
    }

    pub async fn health(&self) -> Result<bool> {
        let url = match self.provider {
            TeiProvider::Local(_) => return Ok(true),
            TeiProvider::Tei => format!("{}/health", self.base_url),
            TeiProvider::Ollama => format!("{}/api/tags", self.base_url),
        };
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    fn validate_dimension(&self, len: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != len => Err(AgentError::Embedding(format!(
                "Embedding dimension {} does not match expected {}",
                len, expected
            ))),
            _ => Ok(()),
        }
    }

    async fn tei_embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.base_url);
        let mut results = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.max_batch) {
            let request = TeiEmbedBatchRequest {
                inputs: chunk,
                truncate: true,
            };

            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await?;

            let embeddings = parse_embeddings_response(response)?;
            if embeddings.len() != chunk.len() {
                return Err(AgentError::Embedding(format!(
                    "TEI returned {} embeddings for {} inputs",
                    embeddings.len(),
                    chunk.len()
                )));
            }
            results.extend(embeddings);
        }

        Ok(results)
    }

    async fn ollama_embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = OllamaEmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<OllamaEmbedResponse>()
            .await?;

        Ok(response.embedding)
    }
}

impl Embedder for TeiClient {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = match &self.provider {
            TeiProvider::Local(local) => local.embed(text),
            TeiProvider::Ollama => self.ollama_embed(text).await?,
            TeiProvider::Tei => {
                let url = format!("{}/embed", self.base_url);
                let request = TeiEmbedRequest {
                    inputs: text,
                    truncate: true,
                };
                let response = self
                    .client
                    .post(&url)
                    .json(&request)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<Value>()
                    .await?;
                parse_embedding_response(response)?
            }
        };

        self.validate_dimension(embedding.len())?;
        Ok(embedding)
    }

    #[instrument(skip(self, texts))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Requesting embeddings for {} texts", texts.len());

        let embeddings: Vec<Vec<f32>> = match &self.provider {
            TeiProvider::Local(local) => texts.iter().map(|t| local.embed(t)).collect(),
            TeiProvider::Tei => self.tei_embed_batch(texts).await?,
            TeiProvider::Ollama => {
                let mut results = Vec::with_capacity(texts.len());
                for text in texts {
                    results.push(self.ollama_embed(text).await?);
                }
                results
            }
        };

        for embedding in &embeddings {
            self.validate_dimension(embedding.len())?;
        }
        Ok(embeddings)
    }
}

/// Deterministic bag-of-words embedding for offline use.
///
/// Each lowercased token is hashed into one bucket; the vector is then
/// normalized to unit length.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let idx = (fnv1a(token.as_bytes()) % self.dim as u64) as usize;
            vec[idx] += 1.0;
        }

        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }
}

/// 64-bit FNV-1a, stable across platforms and toolchains
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

// ==========================================
// TEXT GENERATION
// ==========================================

#[derive(Clone, Copy)]
enum TgiProvider {
    Tgi,
    Ollama,
    OpenAi,
    Echo,
}

/// Text-generation client (TGI, Ollama, OpenAI-compatible, or echo)
#[derive(Clone)]
pub struct TgiClient {
    client: Client,
    base_url: String,
    provider: TgiProvider,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    max_new_tokens: usize,
}

impl TgiClient {
    /// TGI client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            provider: TgiProvider::Tgi,
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS as u64),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }

    /// Ollama chat client
    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: TgiProvider::Ollama,
            model: model.into(),
            ..Self::new(base_url)
        }
    }

    /// OpenAI-compatible chat completions client
    pub fn openai(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            provider: TgiProvider::OpenAi,
            model: model.into(),
            api_key,
            ..Self::new(base_url)
        }
    }

    /// Offline generator that answers with the prompt itself
    pub fn echo() -> Self {
        Self {
            provider: TgiProvider::Echo,
            ..Self::new("echo")
        }
    }

    /// Build from `TGI_PROVIDER` (`tgi`, `ollama`, `openai`, `echo`),
    /// `TGI_URL`, `TGI_MODEL`, `TGI_TIMEOUT_SECS` and `LLM_API_KEY`
    pub fn default_local() -> Self {
        let provider = env_or_default("TGI_PROVIDER", DEFAULT_TGI_PROVIDER);
        let client = match provider.to_ascii_lowercase().as_str() {
            "ollama" => Self::ollama(
                env_or_default("TGI_URL", DEFAULT_OLLAMA_URL),
                env_or_default("TGI_MODEL", DEFAULT_OLLAMA_MODEL),
            ),
            "openai" | "openai-compatible" => Self::openai(
                env_or_default("TGI_URL", DEFAULT_OPENAI_URL),
                env_or_default("TGI_MODEL", DEFAULT_OPENAI_MODEL),
                std::env::var("LLM_API_KEY")
                    .ok()
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty()),
            ),
            "echo" => Self::echo(),
            _ => Self::new(env_or_default("TGI_URL", DEFAULT_TGI_URL)),
        };

        let timeout_secs = env_positive_usize("TGI_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        Self {
            timeout: Duration::from_secs(timeout_secs as u64),
            ..client
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn provider_name(&self) -> &'static str {
        match self.provider {
            TgiProvider::Tgi => "tgi",
            TgiProvider::Ollama => "ollama",
            TgiProvider::OpenAi => "openai",
            TgiProvider::Echo => "echo",
        }
    }

    pub async fn health(&self) -> Result<bool> {
        let url = match self.provider {
            TgiProvider::Echo => return Ok(true),
            TgiProvider::Tgi => format!("{}/health", self.base_url),
            TgiProvider::Ollama => format!("{}/api/tags", self.base_url),
            TgiProvider::OpenAi => format!("{}/models", self.base_url),
        };
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        Ok(response.status().is_success())
    }

    async fn tgi_generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let url = format!("{}/generate", self.base_url);
        let inputs = match system_prompt {
            Some(system) => format!("{}\n\n{}", system, prompt),
            None => prompt.to_string(),
        };
        let request = TgiGenerateRequest {
            inputs,
            parameters: TgiParameters {
                max_new_tokens: self.max_new_tokens,
                return_full_text: false,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        extract_generated_text(response)
    }

    async fn ollama_chat(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = OllamaChatRequest {
            model: &self.model,
            messages: chat_messages(prompt, system_prompt),
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<OllamaChatResponse>()
            .await?;

        if let Some(done_reason) = response.done_reason.as_deref() {
            debug!("Ollama chat done_reason={}", done_reason);
        }

        Ok(response.message.content)
    }

    async fn openai_chat(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = OpenAiChatRequest {
            model: &self.model,
            messages: chat_messages(prompt, system_prompt),
            temperature: 0.0,
        };

        let mut builder = self.client.post(&url).json(&request).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await?
            .error_for_status()?
            .json::<OpenAiChatResponse>()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AgentError::Generation("Chat completion returned no content".into()))
    }
}

impl TextGenerator for TgiClient {
    #[instrument(skip(self, prompt, system_prompt), fields(provider = self.provider_name()))]
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        debug!("Requesting completion ({} prompt chars)", prompt.len());
        match self.provider {
            TgiProvider::Echo => Ok(prompt.to_string()),
            TgiProvider::Tgi => self.tgi_generate(prompt, system_prompt).await,
            TgiProvider::Ollama => self.ollama_chat(prompt, system_prompt).await,
            TgiProvider::OpenAi => self.openai_chat(prompt, system_prompt).await,
        }
    }
}

fn chat_messages<'a>(prompt: &'a str, system_prompt: Option<&'a str>) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: prompt,
    });
    messages
}

// ==========================================
// REQUEST/RESPONSE TYPES
// ==========================================

#[derive(Serialize)]
struct TeiEmbedRequest<'a> {
    inputs: &'a str,
    truncate: bool,
}

#[derive(Serialize)]
struct TeiEmbedBatchRequest<'a> {
    inputs: &'a [String],
    truncate: bool,
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct TgiGenerateRequest {
    inputs: String,
    parameters: TgiParameters,
}

#[derive(Serialize)]
struct TgiParameters {
    max_new_tokens: usize,
    return_full_text: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessageResponse,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChatMessageResponse {
    content: String,
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_embedding_response(value: Value) -> Result<Vec<f32>> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(AgentError::Embedding("Empty TEI embedding response".into()));
            }
            if items.first().map(|v| v.is_number()).unwrap_or(false) {
                serde_json::from_value(Value::Array(items)).map_err(|e| {
                    AgentError::Embedding(format!("Invalid TEI embedding array: {}", e))
                })
            } else {
                let first = items.into_iter().next().ok_or_else(|| {
                    AgentError::Embedding("Missing embeddings".to_string())
                })?;
                serde_json::from_value(first).map_err(|e| {
                    AgentError::Embedding(format!("Invalid TEI embedding array: {}", e))
                })
            }
        }
        other => Err(AgentError::Embedding(format!(
            "Unexpected TEI response format: {}",
            other
        ))),
    }
}

fn parse_embeddings_response(value: Value) -> Result<Vec<Vec<f32>>> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Ok(Vec::new());
            }
            if items.first().map(|v| v.is_array()).unwrap_or(false) {
                serde_json::from_value(Value::Array(items)).map_err(|e| {
                    AgentError::Embedding(format!("Invalid TEI embeddings response: {}", e))
                })
            } else {
                let single: Vec<f32> =
                    serde_json::from_value(Value::Array(items)).map_err(|e| {
                        AgentError::Embedding(format!("Invalid TEI embedding array: {}", e))
                    })?;
                Ok(vec![single])
            }
        }
        other => Err(AgentError::Embedding(format!(
            "Unexpected TEI response format: {}",
            other
        ))),
    }
}

fn extract_generated_text(value: Value) -> Result<String> {
    match value {
        Value::Array(mut items) => {
            let first = items
                .pop()
                .ok_or_else(|| AgentError::Generation("Empty TGI response array".to_string()))?;
            extract_generated_text(first)
        }
        Value::Object(mut obj) => {
            if let Some(Value::String(text)) = obj.remove("generated_text") {
                Ok(text)
            } else if let Some(Value::String(text)) = obj.remove("response") {
                Ok(text)
            } else {
                Err(AgentError::Generation(
                    "TGI response missing generated text field".to_string(),
                ))
            }
        }
        other => Err(AgentError::Generation(format!(
            "Unexpected TGI response format: {}",
            other
        ))),
    }
}
