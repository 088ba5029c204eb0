use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use pc_core::ChatCredentials;
pub use pc_error::{PcError, Result};

const PROVIDER: &str = "openai_compat";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Single-shot completion; returns the first choice's text, or `""` when the
    /// provider returned no content.
    async fn chat(&self, system: &str, context: &str, user: &str) -> Result<String>;
}

/// Builds a chat model bound to one user's stored credentials.
pub trait ChatModelFactory: Send + Sync {
    fn chat_model(&self, creds: &ChatCredentials) -> Arc<dyn ChatModel>;
}

/// Joins the retrieved context and the raw question into the user turn.
pub fn user_message(context: &str, query: &str) -> String {
    format!("Context from database:\n{}\n\nUser question: {}", context, query)
}

// ========== OpenAI-compatible chat completions ==========

#[derive(Clone)]
pub struct OpenAiCompatConfig {
    pub base_url: String, // e.g. https://api.openai.com/v1
    pub api_key: String,  // Bearer token
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    cfg: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(cfg: OpenAiCompatConfig) -> Self {
        Self::with_http(Client::new(), cfg)
    }

    pub fn with_http(http: Client, cfg: OpenAiCompatConfig) -> Self {
        Self { http, cfg }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct OaiChatReqMsg {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OaiChatReq {
    model: String,
    messages: Vec<OaiChatReqMsg>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OaiChatRespChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OaiChatRespChoice {
    #[serde(default)]
    message: Option<OaiChatRespChoiceMsg>,
}

#[derive(Deserialize)]
struct OaiChatResp {
    #[serde(default)]
    choices: Vec<OaiChatRespChoice>,
}

#[derive(Deserialize)]
struct OaiErrorBody {
    error: OaiErrorDetail,
}

#[derive(Deserialize)]
struct OaiErrorDetail {
    message: String,
}

/// Maps a non-success completion response onto the error taxonomy.
fn map_error_status(status: StatusCode, headers: &HeaderMap, body: &str) -> PcError {
    let message = serde_json::from_str::<OaiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| format!("status={} body={}", status, body));

    match status {
        StatusCode::UNAUTHORIZED => PcError::UpstreamAuthentication {
            provider: PROVIDER.to_string(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => PcError::UpstreamRateLimited {
            provider: PROVIDER.to_string(),
            message,
            retry_after: headers
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        _ => PcError::LlmService {
            provider: PROVIDER.to_string(),
            message,
        },
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    #[instrument(skip(self, system, context, user), fields(model = %self.cfg.chat_model))]
    async fn chat(&self, system: &str, context: &str, user: &str) -> Result<String> {
        let body = OaiChatReq {
            model: self.cfg.chat_model.clone(),
            messages: vec![
                OaiChatReqMsg {
                    role: "system",
                    content: system.to_string(),
                },
                OaiChatReqMsg {
                    role: "user",
                    content: user_message(context, user),
                },
            ],
            temperature: self.cfg.temperature,
            max_tokens: self.cfg.max_tokens,
        };

        let resp = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PcError::LlmService {
                provider: PROVIDER.to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let headers = resp.headers().clone();
            let txt = resp.text().await.unwrap_or_default();
            return Err(map_error_status(status, &headers, &txt));
        }

        let data: OaiChatResp = resp.json().await.map_err(|e| PcError::LlmService {
            provider: PROVIDER.to_string(),
            message: e.to_string(),
        })?;
        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

// ========== Factory ==========

/// Fallbacks used when a user has not overridden endpoint or model.
#[derive(Debug, Clone)]
pub struct ChatDefaults {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Shares one HTTP connection pool across all per-user clients.
pub struct OpenAiCompatFactory {
    http: Client,
    defaults: ChatDefaults,
}

impl OpenAiCompatFactory {
    pub fn new(defaults: ChatDefaults) -> Result<Self> {
        let http = Client::builder()
            .timeout(defaults.request_timeout)
            .build()
            .map_err(|e| PcError::Configuration {
                key: "assistant.request_timeout_secs".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { http, defaults })
    }

    pub fn config_for(&self, creds: &ChatCredentials) -> OpenAiCompatConfig {
        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        OpenAiCompatConfig {
            base_url: non_blank(&creds.endpoint_url)
                .unwrap_or_else(|| self.defaults.base_url.clone()),
            api_key: creds.api_key.clone(),
            chat_model: non_blank(&creds.model).unwrap_or_else(|| self.defaults.model.clone()),
            temperature: self.defaults.temperature,
            max_tokens: self.defaults.max_tokens,
        }
    }
}

impl ChatModelFactory for OpenAiCompatFactory {
    fn chat_model(&self, creds: &ChatCredentials) -> Arc<dyn ChatModel> {
        Arc::new(OpenAiCompatClient::with_http(
            self.http.clone(),
            self.config_for(creds),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiCompatClient {
        OpenAiCompatClient::new(OpenAiCompatConfig {
            base_url: format!("{}/v1", server.uri()),
            api_key: "sk-test".into(),
            chat_model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 1000,
        })
    }

    #[tokio::test]
    async fn test_chat_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "max_tokens": 1000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "first"}},
                    {"message": {"role": "assistant", "content": "second"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client_for(&server)
            .chat("system", "ctx", "what did I spend?")
            .await
            .unwrap();
        assert_eq!(answer, "first");
    }

    #[tokio::test]
    async fn test_chat_empty_choices_defaults_to_empty_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let answer = client_for(&server).chat("s", "c", "u").await.unwrap();
        assert_eq!(answer, "");
    }

    #[tokio::test]
    async fn test_chat_maps_invalid_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).chat("s", "c", "u").await.unwrap_err();
        match err {
            PcError::UpstreamAuthentication { message, .. } => {
                assert_eq!(message, "Incorrect API key provided")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_maps_throttling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).chat("s", "c", "u").await.unwrap_err();
        assert!(matches!(err, PcError::UpstreamRateLimited { .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_chat_other_status_is_generic_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let err = client_for(&server).chat("s", "c", "u").await.unwrap_err();
        match err {
            PcError::LlmService { message, .. } => assert!(message.contains("upstream exploded")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_factory_prefers_stored_overrides() {
        let factory = OpenAiCompatFactory::new(ChatDefaults::default()).unwrap();

        let cfg = factory.config_for(&ChatCredentials {
            api_key: "sk".into(),
            endpoint_url: Some("https://openrouter.ai/api/v1".into()),
            model: Some("anthropic/claude-3.5-sonnet".into()),
        });
        assert_eq!(cfg.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(cfg.chat_model, "anthropic/claude-3.5-sonnet");

        let cfg = factory.config_for(&ChatCredentials {
            api_key: "sk".into(),
            endpoint_url: Some("  ".into()),
            model: None,
        });
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.chat_model, DEFAULT_MODEL);
    }

    #[test]
    fn test_user_message_layout() {
        assert_eq!(
            user_message("NOTES:\n1. ID: n1", "q?"),
            "Context from database:\nNOTES:\n1. ID: n1\n\nUser question: q?"
        );
    }
}
