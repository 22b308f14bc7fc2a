use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
        CreateEmbeddingRequestArgs, EmbeddingInput, Role as OpenAIRole,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;

use crate::providers::traits::{ChatMessage, ChatProvider, EmbeddingProvider, ProviderError, Role};
use crate::providers::utils::RetryPolicy;

#[derive(Debug, Clone)]
pub struct OpenAISettings {
    pub api_key: String,
    pub api_base: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_retries: usize,
}

/// Any OpenAI-compatible endpoint: chat completions plus embeddings.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    chat_model: String,
    embedding_model: String,
    temperature: f32,
}

impl OpenAIProvider {
    pub fn new(settings: OpenAISettings) -> Result<Self, ProviderError> {
        if settings.api_key.trim().is_empty() {
            return Err(ProviderError::Config("missing OpenAI API key".to_string()));
        }
        let config = OpenAIConfig::new()
            .with_api_key(settings.api_key.trim())
            .with_api_base(settings.api_base.trim_end_matches('/'));

        // async-openai retries 429s itself; bound it by the shared retry policy
        let http_client = reqwest::Client::builder().timeout(settings.timeout).build()?;
        let client = Client::with_config(config)
            .with_http_client(http_client)
            .with_backoff(RetryPolicy::new(settings.max_retries).exponential_backoff());

        Ok(Self {
            client,
            chat_model: settings.chat_model,
            embedding_model: settings.embedding_model,
            temperature: settings.temperature,
        })
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, ProviderError> {
    let converted = match message.role {
        Role::System => ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            role: OpenAIRole::System,
            content: message.content.clone(),
            name: None,
        }),
        Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            role: OpenAIRole::User,
            content: ChatCompletionRequestUserMessageContent::Text(message.content.clone()),
            name: None,
        }),
        Role::Assistant => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.clone())
                .build()?,
        ),
    };
    Ok(converted)
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .temperature(self.temperature)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| ProviderError::InvalidResponse("no choices returned".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()?;

        let mut response = self.client.embeddings().create(request).await?;
        if response.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "OpenAI returned {} embeddings for {} inputs",
                response.data.len(),
                texts.len()
            )));
        }
        response.data.sort_by_key(|entry| entry.index);
        Ok(response.data.into_iter().map(|entry| entry.embedding).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        response
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| ProviderError::InvalidResponse("no embedding returned from OpenAI".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_each_role() {
        let system = to_request_message(&ChatMessage::system("be brief")).unwrap();
        let user = to_request_message(&ChatMessage::user("question")).unwrap();
        let assistant = to_request_message(&ChatMessage::assistant("answer")).unwrap();

        assert!(matches!(system, ChatCompletionRequestMessage::System(_)));
        assert!(matches!(user, ChatCompletionRequestMessage::User(_)));
        assert!(matches!(assistant, ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn rejects_blank_api_key() {
        let result = OpenAIProvider::new(OpenAISettings {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4-turbo-preview".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.7,
            timeout: Duration::from_secs(60),
            max_retries: 3,
        });
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[test]
    fn builds_with_timeout_and_retry_settings() {
        let provider = OpenAIProvider::new(OpenAISettings {
            api_key: "sk-test".to_string(),
            api_base: "http://127.0.0.1:9/v1/".to_string(),
            chat_model: "gpt-4-turbo-preview".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.2,
            timeout: Duration::from_millis(200),
            max_retries: 0,
        })
        .unwrap();
        assert_eq!(ChatProvider::model_name(&provider), "gpt-4-turbo-preview");
        assert_eq!(EmbeddingProvider::model_name(&provider), "text-embedding-3-small");
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_instead_of_hanging() {
        let provider = OpenAIProvider::new(OpenAISettings {
            api_key: "sk-test".to_string(),
            api_base: "http://127.0.0.1:9/v1".to_string(),
            chat_model: "gpt-4-turbo-preview".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.2,
            timeout: Duration::from_millis(500),
            max_retries: 0,
        })
        .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(10), provider.embed_query("q")).await;
        assert!(matches!(result, Ok(Err(_))));
    }
}
