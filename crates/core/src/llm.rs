use crate::error::ExtractionError;
use crate::traits::{CompletionClient, CompletionRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const COMPLETION_MAX_ATTEMPTS: usize = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub struct OpenAiCompletions {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompletions {
    pub fn new(
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ExtractionError> {
        Self::with_base_url("https://api.openai.com/v1".to_string(), api_key, model, timeout)
    }

    pub fn with_base_url(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ExtractionError> {
        if api_key.trim().is_empty() {
            return Err(ExtractionError::Upstream(
                "missing OpenAI API key".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ExtractionError::Upstream(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletions {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, ExtractionError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt,
            }],
        };

        let mut attempt = 1;
        let response = loop {
            let outcome = self
                .client
                .post(&self.endpoint)
                .bearer_auth(self.api_key.trim())
                .json(&body)
                .send()
                .await;

            match outcome {
                Ok(response) if response.status().is_success() => break response,
                Ok(response) => {
                    let status = response.status();
                    let transient = status.as_u16() == 429 || status.is_server_error();
                    if !transient || attempt >= COMPLETION_MAX_ATTEMPTS {
                        let detail = response.text().await.unwrap_or_default();
                        return Err(ExtractionError::Upstream(format!(
                            "completion endpoint returned {status}: {detail}"
                        )));
                    }
                    warn!(attempt, status = %status, "retrying completion call");
                }
                Err(error) => {
                    if attempt >= COMPLETION_MAX_ATTEMPTS {
                        return Err(ExtractionError::Upstream(error.to_string()));
                    }
                    warn!(attempt, error = %error, "retrying completion call");
                }
            }

            tokio::time::sleep(RETRY_BACKOFF).await;
            attempt += 1;
        };

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| ExtractionError::Upstream(error.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                ExtractionError::Upstream("completion response contained no choices".to_string())
            })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
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
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> OpenAiCompletions {
        OpenAiCompletions::with_base_url(
            server.base_url(),
            "test-key".to_string(),
            "gpt-4o-mini".to_string(),
            Duration::from_secs(5),
        )
        .expect("client should build")
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .json_body_partial(
                        serde_json::json!({
                            "model": "gpt-4o-mini",
                            "temperature": 0.0,
                            "max_tokens": 500,
                        })
                        .to_string(),
                    );
                then.status(200).json_body(serde_json::json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "{\"methodology\": \"m\"}" } }
                    ]
                }));
            })
            .await;

        let client = client_for(&server);
        let content = client
            .complete(CompletionRequest {
                prompt: "analyze this",
                temperature: 0.0,
                max_tokens: 500,
            })
            .await
            .unwrap();

        assert_eq!(content, "{\"methodology\": \"m\"}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_is_retried_then_surfaced() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let client = client_for(&server);
        let result = client
            .complete(CompletionRequest {
                prompt: "analyze this",
                temperature: 0.0,
                max_tokens: 500,
            })
            .await;

        assert!(matches!(result, Err(ExtractionError::Upstream(_))));
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).body("bad key");
            })
            .await;

        let client = client_for(&server);
        let result = client
            .complete(CompletionRequest {
                prompt: "analyze this",
                temperature: 0.0,
                max_tokens: 500,
            })
            .await;

        match result {
            Err(ExtractionError::Upstream(detail)) => assert!(detail.contains("401")),
            other => panic!("expected upstream error, got {other:?}"),
        }
        mock.assert_hits_async(1).await;
    }

    #[test]
    fn empty_api_key_is_refused() {
        let result = OpenAiCompletions::new(
            "  ".to_string(),
            "gpt-4o-mini".to_string(),
            Duration::from_secs(5),
        );
        assert!(result.is_err());
    }
}
