/// LLM client: the single point of entry for completion endpoint calls.
///
/// ARCHITECTURAL RULE: No other module may call the completion API directly.
/// All LLM interactions MUST go through a `CompletionClient`.
///
/// Model: gpt-4o at temperature 0.2
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

/// The model used for every evaluation.
pub const MODEL: &str = "gpt-4o";
/// Low temperature keeps scores close to the rubric wording.
pub const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credential rejected (status {status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Anything that can turn a prompt into completion text.
///
/// Carried in `AppState` as `Arc<dyn CompletionClient>` so the HTTP backend
/// can be swapped without touching the evaluation flow.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Performs exactly one request. No retries.
    async fn complete(&self, credential: &str, system: &str, prompt: &str)
        -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if the endpoint produced any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Chat-completions client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    json_mode: bool,
}

impl OpenAiClient {
    /// `base_url` is like `https://api.openai.com/v1` (trailing slash tolerated).
    pub fn new(base_url: &str, timeout: Duration, json_mode: bool) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            json_mode,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        credential: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, LlmError> {
        let request_body = ChatRequest {
            model: MODEL,
            temperature: TEMPERATURE,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: self.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(credential)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!("Completion endpoint returned {}: {}", status, message);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication {
                    status: status.as_u16(),
                    message,
                },
                _ => LlmError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let chat: ChatResponse = response.json().await?;

        if let Some(usage) = &chat.usage {
            debug!(
                "Completion succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        chat.text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }
}

/// Scripted completion backend for tests. Records every prompt it receives.
#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    enum Script {
        Reply(String),
        Status(u16, String),
    }

    pub struct ScriptedClient {
        script: Script,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn replying(text: impl Into<String>) -> Self {
            Self::with(Script::Reply(text.into()))
        }

        /// 401/403 behave like a rejected credential, anything else like an API failure.
        pub fn failing(status: u16, message: impl Into<String>) -> Self {
            Self::with(Script::Status(status, message.into()))
        }

        fn with(script: Script) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(
            &self,
            _credential: &str,
            _system: &str,
            prompt: &str,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.script {
                Script::Reply(text) => Ok(text.clone()),
                Script::Status(status @ (401 | 403), message) => Err(LlmError::Authentication {
                    status: *status,
                    message: message.clone(),
                }),
                Script::Status(status, message) => Err(LlmError::Api {
                    status: *status,
                    message: message.clone(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};

    /// Serves one fixed chat-completions handler on an ephemeral local port.
    async fn spawn_endpoint(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn client(base_url: &str, json_mode: bool) -> OpenAiClient {
        OpenAiClient::new(base_url, Duration::from_secs(5), json_mode).unwrap()
    }

    #[tokio::test]
    async fn test_complete_sends_fixed_model_and_temperature() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                // Echo the interesting request fields back as the completion text.
                let echo = json!({
                    "auth": auth,
                    "model": body["model"],
                    "temperature": body["temperature"],
                    "format": body["response_format"]["type"],
                    "roles": [body["messages"][0]["role"], body["messages"][1]["role"]],
                });
                Json(json!({
                    "choices": [{"message": {"content": echo.to_string()}}],
                    "usage": {"prompt_tokens": 10, "completion_tokens": 5}
                }))
            }),
        );
        let base = spawn_endpoint(router).await;

        let text = client(&base, true)
            .complete("sk-test", "system", "prompt")
            .await
            .unwrap();
        let echo: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(echo["auth"], "Bearer sk-test");
        assert_eq!(echo["model"], "gpt-4o");
        assert!((echo["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(echo["format"], "json_object");
        assert_eq!(echo["roles"], json!(["system", "user"]));
    }

    #[tokio::test]
    async fn test_json_mode_off_omits_response_format() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                let has_format = body.get("response_format").is_some();
                Json(json!({"choices": [{"message": {"content": has_format.to_string()}}]}))
            }),
        );
        let base = spawn_endpoint(router).await;

        let text = client(&base, false).complete("k", "s", "p").await.unwrap();
        assert_eq!(text, "false");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication_with_endpoint_message() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    axum::http::StatusCode::UNAUTHORIZED,
                    Json(json!({"error": {"message": "Incorrect API key provided"}})),
                )
            }),
        );
        let base = spawn_endpoint(router).await;

        let err = client(&base, true).complete("bad", "s", "p").await.unwrap_err();
        match err {
            LlmError::Authentication { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("expected authentication error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let hits = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    (axum::http::StatusCode::SERVICE_UNAVAILABLE, "overloaded")
                }
            }),
        );
        let base = spawn_endpoint(router).await;

        let err = client(&base, true).complete("k", "s", "p").await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 503, .. }), "{err:?}");
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}/v1"), true)
            .complete("k", "s", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Http(_)), "{err:?}");
    }

    #[test]
    fn test_text_ignores_blank_content() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "  "}}]}"#).unwrap();
        assert!(response.text().is_none());

        let response: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(response.text().is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let c = client("https://example.test/v1/", true);
        assert_eq!(c.endpoint(), "https://example.test/v1/chat/completions");
    }
}
