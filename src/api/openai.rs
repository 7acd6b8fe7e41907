use super::{http_client, ChatBackend, ChatMessage, Embedder};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible chat-completion and embedding client
///
/// Sampling is pinned to temperature 0 so identical prompts give the most
/// reproducible answers the service allows.
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    embedding_model: String,
}

impl OpenAIClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
            embedding_model: EMBEDDING_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }
}

#[async_trait]
impl ChatBackend for OpenAIClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.0,
            max_tokens: self.max_tokens,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::OracleUnavailable(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let completion: ChatResponse = response.json().await?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::OracleUnavailable("completion had no content".to_string()))?;

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Embedder for OpenAIClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };

        let response: EmbeddingResponse = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::OracleUnavailable("embedding response was empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(url: &str) -> OpenAIClient {
        OpenAIClient::new("sk-test", "gpt-4o-mini", 400, Duration::from_secs(5))
            .unwrap()
            .with_base_url(url)
    }

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("Answer in JSON."),
            ChatMessage::user("candles here"),
        ]
    }

    #[tokio::test]
    async fn test_complete_sends_deterministic_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-mini",
                "temperature": 0.0,
                "max_tokens": 400,
                "messages": [
                    {"role": "system", "content": "Answer in JSON."},
                    {"role": "user", "content": "candles here"}
                ]
            })))
            .with_body(
                r#"{"choices": [{"message": {"role": "assistant", "content": "  {\"signal\": \"buy\"}\n"}}]}"#,
            )
            .create_async()
            .await;

        let client = client(&server.url());
        let text = client.complete(&messages()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(text, r#"{"signal": "buy"}"#);
    }

    #[tokio::test]
    async fn test_service_error_is_oracle_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": {"message": "rate limited"}}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let err = client.complete(&messages()).await.unwrap_err();
        assert!(matches!(err, Error::OracleUnavailable(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts the connection and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let client = OpenAIClient::new("sk-test", "gpt-4o-mini", 400, Duration::from_millis(200))
            .unwrap()
            .with_base_url(format!("http://{}", addr));
        let result = tokio::time::timeout(Duration::from_secs(5), client.complete(&messages())).await;

        let err = result.expect("request should give up on its own").unwrap_err();
        assert!(matches!(err, Error::Http(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_embedding_returns_vector() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/embeddings")
            .match_body(Matcher::PartialJson(
                serde_json::json!({"model": "text-embedding-3-small"}),
            ))
            .with_body(r#"{"data": [{"embedding": [0.25, -0.5, 0.125]}]}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let vector = client.embed("2025-03-04 10:00 O:1.1").await.unwrap();
        assert_eq!(vector, vec![0.25, -0.5, 0.125]);
    }
}
