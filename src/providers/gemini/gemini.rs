use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::providers::traits::{ChatMessage, ChatProvider, EmbeddingProvider, ProviderError, Role};
use crate::providers::utils::RetryPolicy;

/// Upper bound on inputs accepted by one `batchEmbedContents` call.
const MAX_EMBED_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub api_base: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_retries: usize,
}

/// Google Generative Language API client used for both chat and embeddings.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_base: String,
    chat_model: String,
    embedding_model: String,
    temperature: f32,
    retry: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(settings: GeminiSettings) -> Result<Self, ProviderError> {
        if settings.api_key.trim().is_empty() {
            return Err(ProviderError::Config("missing Gemini API key".to_string()));
        }
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(settings.api_key.trim())
            .map_err(|_| ProviderError::Config("invalid Gemini API key".to_string()))?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            chat_model: model_path(&settings.chat_model),
            embedding_model: model_path(&settings.embedding_model),
            temperature: settings.temperature,
            retry: RetryPolicy::new(settings.max_retries),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{}:{}", self.api_base, model, method)
    }
}

/// Gemini addresses models as `models/<name>`.
pub fn model_path(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let request = GenerateContentRequest::from_messages(messages, self.temperature);
        let url = self.endpoint(&self.chat_model, "generateContent");
        let response: GenerateContentResponse = self
            .retry
            .send_json("Gemini generateContent", || self.client.post(&url).json(&request))
            .await?;
        response.into_text()
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_EMBED_BATCH) {
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| EmbedRequest::new(&self.embedding_model, text, TaskType::RetrievalDocument))
                    .collect(),
            };
            let url = self.endpoint(&self.embedding_model, "batchEmbedContents");
            let response: BatchEmbedResponse = self
                .retry
                .send_json("Gemini batchEmbedContents", || self.client.post(&url).json(&request))
                .await?;
            if response.embeddings.len() != batch.len() {
                return Err(ProviderError::InvalidResponse(format!(
                    "Gemini returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    batch.len()
                )));
            }
            embeddings.extend(response.embeddings.into_iter().map(|e| e.values));
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = EmbedRequest::new(&self.embedding_model, text, TaskType::RetrievalQuery);
        let url = self.endpoint(&self.embedding_model, "embedContent");
        let response: EmbedResponse = self
            .retry
            .send_json("Gemini embedContent", || self.client.post(&url).json(&request))
            .await?;
        if response.embedding.values.is_empty() {
            return Err(ProviderError::InvalidResponse("Gemini returned an empty embedding".to_string()));
        }
        Ok(response.embedding.values)
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_messages(messages: &'a [ChatMessage], temperature: f32) -> Self {
        let system: Vec<Part<'a>> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| Part { text: m.content.as_str() })
            .collect();
        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(if m.role == Role::Assistant { "model" } else { "user" }),
                parts: vec![Part { text: m.content.as_str() }],
            })
            .collect();

        Self {
            system_instruction: (!system.is_empty()).then(|| Content { role: None, parts: system }),
            contents,
            generation_config: GenerationConfig { temperature },
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, ProviderError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            return Err(ProviderError::Blocked(reason));
        };

        match candidate.content {
            Some(content) => Ok(content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")),
            None => match candidate.finish_reason.as_deref() {
                Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT") => {
                    Err(ProviderError::Blocked(candidate.finish_reason.unwrap_or_default()))
                }
                _ => Ok(String::new()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

impl<'a> EmbedRequest<'a> {
    fn new(model: &'a str, text: &'a str, task_type: TaskType) -> Self {
        Self {
            model,
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type,
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}
