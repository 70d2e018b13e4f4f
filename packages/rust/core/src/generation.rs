//! HTTP text-generation client.
//!
//! Sends one fully assembled prompt per call and returns the raw generated
//! text. Supports a local Ollama server and the OpenRouter chat API.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use ticketdesk_shared::{GenerationConfig, GenerationProvider, Result, TicketDeskError};

use crate::collaborators::Generator;

const COLLABORATOR: &str = "generation";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Body of `POST /api/generate` (Ollama).
#[derive(Debug, serde::Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, serde::Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Body of `POST /chat/completions` (OpenRouter).
#[derive(Debug, serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatRequestMessage<'a>; 1],
}

#[derive(Debug, serde::Serialize)]
struct ChatRequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, serde::Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`Generator`] backed by an HTTP text-generation API.
pub struct HttpGenerator {
    client: reqwest::Client,
    provider: GenerationProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    /// Build a client from the `[generation]` config section.
    ///
    /// For OpenRouter the API key is read from the env var named in
    /// `api_key_env`.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let base = config.resolved_base_url();
        let (endpoint, api_key) = match config.provider {
            GenerationProvider::Ollama => (format!("{base}/api/generate"), None),
            GenerationProvider::OpenRouter => {
                let key = std::env::var(&config.api_key_env).map_err(|_| {
                    TicketDeskError::config(format!(
                        "generation API key not found in {}",
                        config.api_key_env
                    ))
                })?;
                (format!("{base}/chat/completions"), Some(key))
            }
        };

        let client = reqwest::Client::builder()
            .user_agent(concat!("TicketDesk/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TicketDeskError::unavailable(COLLABORATOR, format!("client build: {e}")))?;

        info!(provider = ?config.provider, %endpoint, model = %config.model, "generation client ready");

        Ok(Self {
            client,
            provider: config.provider,
            endpoint,
            model: config.model.clone(),
            api_key,
        })
    }

    async fn post_json<T: serde::Serialize>(&self, body: &T) -> Result<String> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TicketDeskError::unavailable(COLLABORATOR, format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TicketDeskError::unavailable(COLLABORATOR, format!("{}: {e}", self.endpoint)))?;

        if !status.is_success() {
            return Err(TicketDeskError::unavailable(
                COLLABORATOR,
                format!("{}: HTTP {status}: {}", self.endpoint, preview(&text)),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = ?self.provider, prompt_len = prompt.len(), "sending generation request");
        match self.provider {
            GenerationProvider::Ollama => {
                let body = OllamaRequest {
                    model: &self.model,
                    prompt,
                    stream: false,
                };
                parse_ollama_response(&self.post_json(&body).await?)
            }
            GenerationProvider::OpenRouter => {
                let body = ChatRequest {
                    model: &self.model,
                    messages: [ChatRequestMessage {
                        role: "user",
                        content: prompt,
                    }],
                };
                parse_chat_response(&self.post_json(&body).await?)
            }
        }
    }
}

fn parse_ollama_response(body: &str) -> Result<String> {
    let parsed: OllamaResponse = serde_json::from_str(body).map_err(|e| {
        TicketDeskError::malformed(COLLABORATOR, format!("{e} (got: {})", preview(body)))
    })?;
    Ok(parsed.response)
}

fn parse_chat_response(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        TicketDeskError::malformed(COLLABORATOR, format!("{e} (got: {})", preview(body)))
    })?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| TicketDeskError::malformed(COLLABORATOR, "response has no message content"))
}

/// First 200 characters of a response body, for error messages.
fn preview(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_request_serializes_without_streaming() {
        let body = OllamaRequest {
            model: "llama3.2:1b",
            prompt: "hello",
            stream: false,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"model":"llama3.2:1b","prompt":"hello","stream":false}"#);
    }

    #[test]
    fn chat_request_wraps_prompt_as_user_message() {
        let body = ChatRequest {
            model: "m",
            messages: [ChatRequestMessage {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn parses_ollama_response() {
        let body = r#"{"model":"llama3.2:1b","response":"summary text","done":true}"#;
        assert_eq!(parse_ollama_response(body).unwrap(), "summary text");
    }

    #[test]
    fn parses_chat_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"reply"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "reply");
    }

    #[test]
    fn chat_without_choices_is_malformed() {
        let err = parse_chat_response(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, TicketDeskError::MalformedResponse { .. }));
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = parse_ollama_response("<html>bad gateway</html>").unwrap_err();
        assert!(err.to_string().contains("bad gateway"));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let body = "é".repeat(300);
        assert_eq!(preview(&body).chars().count(), 200);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn openrouter_requires_api_key() {
        let config = GenerationConfig {
            provider: GenerationProvider::OpenRouter,
            api_key_env: "TD_TEST_MISSING_GENERATION_KEY_98765".into(),
            ..GenerationConfig::default()
        };
        let err = HttpGenerator::from_config(&config).err().expect("missing key");
        assert!(err.to_string().contains("TD_TEST_MISSING_GENERATION_KEY_98765"));
    }

    #[test]
    fn ollama_endpoint_uses_base_url() {
        let config = GenerationConfig {
            base_url: Some("http://gpu-box:11434/".into()),
            ..GenerationConfig::default()
        };
        let generator = HttpGenerator::from_config(&config).unwrap();
        assert_eq!(generator.endpoint, "http://gpu-box:11434/api/generate");
        assert!(generator.api_key.is_none());
    }
}
