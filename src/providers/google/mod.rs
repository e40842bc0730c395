
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{Embedder, Generator, ProviderError, endpoint, run_blocking};
use crate::config::ProviderSettings;

/// The Gemini API caps batch embedding requests at 100 inputs
const EMBEDDING_BATCH_SIZE: usize = 100;

const TASK_RETRIEVAL_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";
const TASK_RETRIEVAL_QUERY: &str = "RETRIEVAL_QUERY";

/// Blocking client for the Gemini REST API
#[derive(Debug, Clone)]
pub struct GoogleClient {
    base_url: Url,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini model resource name, e.g. `models/embedding-001`
#[inline]
pub fn model_resource(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

impl GoogleClient {
    #[inline]
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or(ProviderError::MissingApiKey("GOOGLE_API_KEY"))?;

        Ok(Self {
            base_url: settings.base_url.clone(),
            api_key,
            agent: ureq::Agent::new_with_defaults(),
        })
    }

    /// Embed texts with the given retrieval task type, preserving input order
    #[inline]
    pub fn embed(
        &self,
        model: &str,
        task_type: &str,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let resource = model_resource(model);
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            debug!(
                "Requesting {} Gemini embeddings with {} ({})",
                batch.len(),
                resource,
                task_type
            );

            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| EmbedContentRequest {
                        model: &resource,
                        content: Content {
                            role: None,
                            parts: [Part { text }],
                        },
                        task_type,
                    })
                    .collect(),
            };
            let response: BatchEmbedResponse =
                self.post(&format!("{}:batchEmbedContents", resource), &request)?;

            if response.embeddings.len() != batch.len() {
                return Err(ProviderError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            vectors.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(vectors)
    }

    /// Single-turn content generation
    #[inline]
    pub fn generate(
        &self,
        model: &str,
        temperature: f32,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let resource = model_resource(model);
        debug!("Requesting Gemini completion with {}", resource);

        let request = GenerateRequest {
            contents: [Content {
                role: Some("user"),
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig { temperature },
        };
        let response: GenerateResponse =
            self.post(&format!("{}:generateContent", resource), &request)?;

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
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
            .header("x-goog-api-key", self.api_key.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())?;

        serde_json::from_str(&response_text)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct GoogleEmbeddings {
    client: GoogleClient,
    model: String,
}

impl GoogleEmbeddings {
    #[inline]
    pub fn new(client: GoogleClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    async fn embed_with_task(
        &self,
        task_type: &'static str,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let client = self.client.clone();
        let model = self.model.clone();
        run_blocking(move || client.embed(&model, task_type, &texts)).await
    }
}

#[async_trait]
impl Embedder for GoogleEmbeddings {
    #[inline]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_with_task(TASK_RETRIEVAL_DOCUMENT, texts.to_vec())
            .await
    }

    #[inline]
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_with_task(TASK_RETRIEVAL_QUERY, vec![text.to_string()])
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
pub struct GoogleChat {
    client: GoogleClient,
    model: String,
    temperature: f32,
}

impl GoogleChat {
    #[inline]
    pub fn new(client: GoogleClient, model: &str, temperature: f32) -> Self {
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
impl Generator for GoogleChat {
    #[inline]
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let client = self.client.clone();
        let model = self.model.clone();
        let temperature = self.temperature;
        let prompt = prompt.to_string();
        run_blocking(move || client.generate(&model, temperature, &prompt)).await
    }

    #[inline]
    fn model(&self) -> &str {
        &self.model
    }
}
