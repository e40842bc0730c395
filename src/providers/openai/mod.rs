
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{Embedder, Generator, ProviderError, endpoint, run_blocking};
use crate::config::ProviderSettings;

/// Largest number of inputs sent in one embeddings request
const EMBEDDING_BATCH_SIZE: usize = 512;

/// Blocking client for the OpenAI REST API
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    content: Option<String>,
}

impl OpenAiClient {
    #[inline]
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or(ProviderError::MissingApiKey("OPENAI_API_KEY"))?;

        Ok(Self {
            base_url: settings.base_url.clone(),
            api_key,
            agent: ureq::Agent::new_with_defaults(),
        })
    }

    /// Embed texts in request-sized batches, preserving input order
    #[inline]
    pub fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            vectors.extend(self.embed_batch(model, batch)?);
        }
        Ok(vectors)
    }

    fn embed_batch(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        debug!("Requesting {} OpenAI embeddings with {}", texts.len(), model);

        let request = EmbeddingRequest { model, input: texts };
        let response: EmbeddingResponse = self.post("embeddings", &request)?;

        if response.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    /// Single-turn chat completion
    #[inline]
    pub fn complete(
        &self,
        model: &str,
        temperature: f32,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        debug!("Requesting OpenAI completion with {}", model);

        let request = ChatRequest {
            model,
            temperature,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response: ChatResponse = self.post("chat/completions", &request)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ProviderError::EmptyResponse)
    }

    fn post<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, ProviderError>
    where
        Req: Serialize,
        Resp: for<'de> Deserialize<'de>,
    {
        let url = endpoint(&self.base_url, path);
        let request_json = serde_json::to_string(request)
            .map_err(|e| ProviderError::InvalidResponse(format!("bad request body: {}", e)))?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())?;

        serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbeddings {
    #[inline]
    pub fn new(client: OpenAiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    #[inline]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.client.clone();
        let model = self.model.clone();
        let texts = texts.to_vec();
        run_blocking(move || client.embed(&model, &texts)).await
    }

    #[inline]
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or(ProviderError::EmptyResponse)
    }

    #[inline]
    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    #[inline]
    pub fn new(client: OpenAiClient, model: &str, temperature: f32) -> Self {
        Self {
            client,
            model: model.to_string(),
            temperature,
        }
    }

    #[inline]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }
}

#[async_trait]
impl Generator for OpenAiChat {
    #[inline]
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let client = self.client.clone();
        let model = self.model.clone();
        let temperature = self.temperature;
        let prompt = prompt.to_string();
        run_blocking(move || client.complete(&model, temperature, &prompt)).await
    }

    #[inline]
    fn model(&self) -> &str {
        &self.model
    }
}
