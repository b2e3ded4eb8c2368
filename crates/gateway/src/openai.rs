use crate::error::{GatewayError, Result};
use crate::types::CompletionRequest;
use crate::CompletionGateway;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Connection settings for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Model used when a request does not name one
    pub default_model: String,
    /// HTTP-level timeout; the retry layer applies its own per-attempt limit
    pub request_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            default_model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl GatewaySettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client. Each call sends exactly two messages (system and
/// user) so no conversation state leaks between calls.
pub struct OpenAiGateway {
    client: Client,
    settings: GatewaySettings,
}

impl OpenAiGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(GatewayError::Config("API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|err| GatewayError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: request
                .sampling
                .model
                .as_deref()
                .unwrap_or(self.settings.default_model.as_str()),
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            max_tokens: request.sampling.max_tokens,
        }
    }
}

fn classify_status(status: StatusCode, body: String) -> GatewayError {
    match status.as_u16() {
        401 | 403 => GatewayError::Auth(body),
        429 => GatewayError::RateLimited(body),
        code @ 500..=599 => GatewayError::Server {
            status: code,
            message: body,
        },
        code => GatewayError::InvalidResponse(format!("HTTP {code}: {body}")),
    }
}

fn transport_error(err: reqwest::Error, timeout_secs: u64) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(timeout_secs.saturating_mul(1000))
    } else {
        GatewayError::Transport(err.to_string())
    }
}

fn extract_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| GatewayError::InvalidResponse("response has no message content".into()))
}

#[async_trait]
impl CompletionGateway for OpenAiGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.body(request);
        log::debug!("POST {} (model {})", self.settings.endpoint(), body.model);

        let response = self
            .client
            .post(self.settings.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(err, self.settings.request_timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
        extract_content(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SamplingConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_key_is_config_error() {
        assert!(matches!(
            OpenAiGateway::new(GatewaySettings::default()),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let settings = GatewaySettings {
            base_url: "http://localhost:8080/v1/".into(),
            ..GatewaySettings::new("sk-test")
        };
        assert_eq!(settings.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_request_body_shape() {
        let gateway = OpenAiGateway::new(GatewaySettings::new("sk-test")).unwrap();
        let request = CompletionRequest::new(
            "be terse",
            "Product: kettle",
            SamplingConfig::deterministic()
                .with_model("gpt-4.1-mini")
                .with_max_tokens(100),
        );

        let json = serde_json::to_value(gateway.body(&request)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4.1-mini",
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": "Product: kettle"}
                ],
                "temperature": 0.0,
                "top_p": 0.0,
                "max_tokens": 100
            })
        );
    }

    #[test]
    fn test_default_model_and_no_max_tokens() {
        let gateway = OpenAiGateway::new(GatewaySettings::new("sk-test")).unwrap();
        let request = CompletionRequest::new("s", "u", SamplingConfig::deterministic());

        let json = serde_json::to_value(gateway.body(&request)).unwrap();
        assert_eq!(json["model"], DEFAULT_MODEL);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            GatewayError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            GatewayError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            GatewayError::Server { status: 502, .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, String::new()),
            GatewayError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_extract_content_trims_and_requires_choice() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Electronics\nApparel \n"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(parsed).unwrap(), "Electronics\nApparel");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(extract_content(empty).is_err());
    }
}
