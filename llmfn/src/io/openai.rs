//! OpenAI-compatible chat-completions provider.

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::errors::ProviderError;
use crate::io::provider::{
    CompletionRequest, Message, Provider, ProviderCapabilities, ResponseFormat,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Bytes of an error body kept in [`ProviderError`] messages.
const ERROR_BODY_LIMIT: usize = 2_000;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL up to and including the API version (`.../v1`).
    pub base_url: String,
    pub api_key: String,
}

/// Blocking client for `POST {base_url}/chat/completions`.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::Auth("API key is empty".to_string()));
        }
        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn response_format_body(format: &ResponseFormat) -> Option<Value> {
    match format {
        ResponseFormat::Text => None,
        ResponseFormat::JsonObject => Some(json!({ "type": "json_object" })),
        ResponseFormat::JsonSchema { name, schema } => Some(json!({
            "type": "json_schema",
            "json_schema": { "name": name, "schema": schema, "strict": false },
        })),
    }
}

/// Map a non-success HTTP status to a provider error.
fn status_error(status: StatusCode, body: String) -> ProviderError {
    let body = clip(body);
    match status.as_u16() {
        401 | 403 => ProviderError::Auth(body),
        429 => ProviderError::RateLimited(body),
        400..=499 => ProviderError::MalformedRequest(body),
        code => ProviderError::Api { status: code, body },
    }
}

fn clip(mut body: String) -> String {
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

fn extract_content(body: &str) -> Result<String, ProviderError> {
    let parsed: ApiResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::MalformedResponse(format!("parse completion: {err}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::MalformedResponse("completion has no content".to_string()))
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            json_object: true,
            json_schema: true,
        }
    }

    #[instrument(skip_all, fields(model = %request.model, format = request.response_format.as_str()))]
    fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = ApiRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            response_format: response_format_body(&request.response_format),
        };
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    ProviderError::Timeout(request.timeout)
                } else {
                    ProviderError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().map_err(|err| {
            if err.is_timeout() {
                ProviderError::Timeout(request.timeout)
            } else {
                ProviderError::Transport(err.to_string())
            }
        })?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "completion request failed");
            return Err(status_error(status, text));
        }
        let content = extract_content(&text)?;
        debug!(bytes = content.len(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_statuses_to_provider_errors() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "no".to_string()),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow".to_string()),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad".to_string()),
            ProviderError::MalformedRequest(_)
        ));
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, "down".to_string()),
            ProviderError::Api {
                status: 502,
                body: "down".to_string()
            }
        );
    }

    #[test]
    fn schema_format_is_non_strict() {
        let body = response_format_body(&ResponseFormat::JsonSchema {
            name: "House".to_string(),
            schema: json!({"type": "object"}),
        })
        .expect("format");
        assert_eq!(body["type"], "json_schema");
        assert_eq!(body["json_schema"]["name"], "House");
        assert_eq!(body["json_schema"]["strict"], false);
        assert!(response_format_body(&ResponseFormat::Text).is_none());
    }

    #[test]
    fn extracts_first_choice_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "true"}}]}"#;
        assert_eq!(extract_content(body).expect("content"), "true");
        assert!(matches!(
            extract_content(r#"{"choices": []}"#),
            Err(ProviderError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_content("<html>"),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn empty_key_is_rejected() {
        let err = OpenAiProvider::new(OpenAiConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: "  ".to_string(),
        })
        .err()
        .expect("empty key");
        assert!(matches!(err, ProviderError::Auth(_)));
    }
}
