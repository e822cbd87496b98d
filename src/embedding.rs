//! Embedding providers.
//!
//! The gateway treats the embedding model as an external collaborator behind
//! the [`Embedder`] capability: two operations, one for document batches and
//! one for queries. Concrete variants are selected by configuration; all
//! remote providers are plain HTTPS JSON calls.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Known embedding dimensions per OpenAI model.
fn openai_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// Known embedding dimensions per Gemini model. Both published embedding
/// models emit 768-dimensional vectors.
fn gemini_dimension(_model: &str) -> usize {
    768
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("embedding provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("embedding provider returned an unexpected response: {0}")]
    BadResponse(String),
    #[error("missing API key for embedding provider {0}")]
    MissingApiKey(&'static str),
}

/// Capability for turning text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
    /// Output vector dimension; fixed per provider/model.
    fn dimension(&self) -> usize;
}

/// OpenAI `/v1/embeddings`.
pub struct OpenAiEmbedder {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(client: Client, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
        }
    }

    /// Overrides the API host, for tests and proxies.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingRow>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingRow {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?;
        let response = check_status(response).await?;
        let parsed: OpenAiEmbeddingResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(EmbedError::BadResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|row| row.embedding).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::BadResponse("empty embedding batch".to_string()))
    }

    fn dimension(&self) -> usize {
        openai_dimension(&self.model)
    }
}

/// Gemini `batchEmbedContents` / `embedContent`.
pub struct GeminiEmbedder {
    client: Client,
    model: String,
    api_key: String,
}

impl GeminiEmbedder {
    pub fn new(client: Client, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Deserialize)]
struct GeminiBatchResponse {
    embeddings: Vec<GeminiValues>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiSingleResponse {
    embedding: GeminiValues,
}

#[derive(Deserialize)]
struct GeminiValues {
    values: Vec<f32>,
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let requests: Vec<_> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": self.model,
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/{}:batchEmbedContents",
            self.model
        );
        let response = self
            .client
            .post(url)
            .query(&[("key", &self.api_key)])
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        let response = check_status(response).await?;
        let parsed: GeminiBatchResponse = response.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(EmbedError::BadResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/{}:embedContent",
            self.model
        );
        let response = self
            .client
            .post(url)
            .query(&[("key", &self.api_key)])
            .json(&json!({ "content": { "parts": [{ "text": text }] } }))
            .send()
            .await?;
        let response = check_status(response).await?;
        let parsed: GeminiSingleResponse = response.json().await?;
        Ok(parsed.embedding.values)
    }

    fn dimension(&self) -> usize {
        gemini_dimension(&self.model)
    }
}

/// Hugging Face inference API feature extraction.
pub struct HuggingFaceEmbedder {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl HuggingFaceEmbedder {
    pub fn new(client: Client, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
            base_url: "https://api-inference.huggingface.co".to_string(),
        }
    }

    /// Overrides the API host, for tests and proxies.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let url = format!(
            "{}/pipeline/feature-extraction/{}",
            self.base_url, self.model
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "inputs": texts, "options": { "wait_for_model": true } }))
            .send()
            .await?;
        let response = check_status(response).await?;
        let parsed: Vec<Vec<f32>> = response.json().await?;
        if parsed.len() != texts.len() {
            return Err(EmbedError::BadResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.len()
            )));
        }
        Ok(parsed)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::BadResponse("empty embedding batch".to_string()))
    }

    fn dimension(&self) -> usize {
        768
    }
}

/// Zero-vector embedder for tests and offline runs.
pub struct FakeEmbedder {
    dimension: usize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::new(768)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect())
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(vec![0.0; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Config-driven embedding provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    OpenAi,
    Gemini,
    HuggingFace,
    Fake,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown embedding provider: {0} (expected openai, gemini, hf, or fake)")]
pub struct EmbeddingProviderParseError(String);

impl std::str::FromStr for EmbeddingProvider {
    type Err = EmbeddingProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "hf" | "huggingface" => Ok(Self::HuggingFace),
            "fake" => Ok(Self::Fake),
            other => Err(EmbeddingProviderParseError(other.to_string())),
        }
    }
}

/// Builds the configured [`Embedder`]. Remote providers require an API key.
pub fn build_embedder(
    provider: EmbeddingProvider,
    model: &str,
    api_key: Option<&str>,
    client: Client,
) -> Result<Arc<dyn Embedder>, EmbedError> {
    match provider {
        EmbeddingProvider::OpenAi => {
            let key = api_key.ok_or(EmbedError::MissingApiKey("openai"))?;
            Ok(Arc::new(OpenAiEmbedder::new(client, model, key)))
        }
        EmbeddingProvider::Gemini => {
            let key = api_key.ok_or(EmbedError::MissingApiKey("gemini"))?;
            Ok(Arc::new(GeminiEmbedder::new(client, model, key)))
        }
        EmbeddingProvider::HuggingFace => {
            let key = api_key.ok_or(EmbedError::MissingApiKey("huggingface"))?;
            Ok(Arc::new(HuggingFaceEmbedder::new(client, model, key)))
        }
        EmbeddingProvider::Fake => Ok(Arc::new(FakeEmbedder::default())),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, EmbedError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(EmbedError::Api {
            status: status.as_u16(),
            body,
        })
    }
}
