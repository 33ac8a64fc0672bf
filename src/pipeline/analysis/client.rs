use std::sync::Mutex;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::AnalysisError;
use crate::config::{AnalysisConfig, AuthScheme};
use crate::credentials::ApiKey;

/// Longest slice of an error body carried into an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// One chat-completion request: a single user message plus sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(prompt: &str, temperature: f32, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.to_string(),
            temperature,
            max_tokens,
        }
    }
}

/// Generative text service abstraction (allows mocking).
pub trait ChatClient {
    /// Send one request and return the first choice's message content.
    fn complete(&self, request: &ChatRequest, credentials: &ApiKey) -> Result<String, AnalysisError>;
}

/// Azure OpenAI (or OpenAI-compatible) chat-completions client.
pub struct AzureChatClient {
    url: String,
    auth_scheme: AuthScheme,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl AzureChatClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(config, client))
    }

    /// Use a preconfigured HTTP client (proxies, TLS roots, test stubs).
    pub fn with_http_client(config: &AnalysisConfig, client: reqwest::blocking::Client) -> Self {
        Self {
            url: config.completions_url(),
            auth_scheme: config.auth_scheme,
            client,
            timeout_secs: config.timeout_secs,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn headers(&self, credentials: &ApiKey) -> Result<HeaderMap, AnalysisError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let (name, value) = match self.auth_scheme {
            AuthScheme::ApiKeyHeader => (
                HeaderName::from_static("api-key"),
                credentials.expose().to_string(),
            ),
            AuthScheme::Bearer => (AUTHORIZATION, format!("Bearer {}", credentials.expose())),
        };
        let mut value = HeaderValue::from_str(&value)
            .map_err(|_| AnalysisError::Auth("API key contains invalid characters".into()))?;
        value.set_sensitive(true);
        headers.insert(name, value);

        Ok(headers)
    }
}

/// Request body for chat/completions
#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: Vec<CompletionMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from chat/completions
#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

impl ChatClient for AzureChatClient {
    fn complete(&self, request: &ChatRequest, credentials: &ApiKey) -> Result<String, AnalysisError> {
        if credentials.is_blank() {
            return Err(AnalysisError::Auth("API key is missing".into()));
        }

        let body = CompletionRequest {
            messages: vec![CompletionMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers(credentials)?)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Transport(format!(
                        "request timed out after {}s",
                        self.timeout_secs
                    ))
                } else if e.is_connect() {
                    AnalysisError::Transport(format!("cannot connect to analysis service: {e}"))
                } else {
                    AnalysisError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AnalysisError::Auth(format!(
                "analysis service returned status {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::Transport(format!(
                "analysis service returned status {}: {}",
                status.as_u16(),
                truncate_chars(&body, MAX_ERROR_BODY_CHARS)
            )));
        }

        let raw = response
            .text()
            .map_err(|e| AnalysisError::Transport(format!("failed to read response body: {e}")))?;
        let parsed: CompletionResponse = serde_json::from_str(&raw).map_err(|e| {
            AnalysisError::MalformedResponse(format!("unexpected response envelope: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AnalysisError::MalformedResponse("response has no message content".into()))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Mock chat client for testing. Returns a configured reply and records requests.
pub struct MockChatClient {
    reply: Result<String, AnalysisError>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatClient {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: AnalysisError) -> Self {
        Self {
            reply: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request the mock has received, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl ChatClient for MockChatClient {
    fn complete(&self, request: &ChatRequest, _credentials: &ApiKey) -> Result<String, AnalysisError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.reply.clone()
    }
}
