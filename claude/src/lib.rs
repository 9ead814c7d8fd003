//! Anthropic Messages API client for RPG Custodian stat checks.
//!
//! A stat check is one round trip: the rendered tracker prompt goes out as a
//! single user turn together with the `report_stat_changes` tool, the tool
//! choice is forced, and the reply is read for that tool call (or, failing
//! that, for its text). Nothing here streams or keeps a conversation.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Failures of a stat check round trip.
#[derive(Debug, Error)]
pub enum Error {
    #[error("ANTHROPIC_API_KEY is not set")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unreadable reply: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Handle used by the stat checker to reach the Messages endpoint.
///
/// Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct Claude {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl Claude {
    /// Checks are short, so the whole exchange is capped at a minute.
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Reads `ANTHROPIC_API_KEY`; a blank key counts as missing.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(Error::NoApiKey),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Route checks through a proxy or local gateway.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Model for checks whose request leaves `model` unset.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one stat check exchange.
    ///
    /// Non-2xx statuses come back as [`Error::Api`] carrying the raw body.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let body = self.build_api_request(&request);

        let reply = self
            .http
            .post(format!("{}/messages", self.base_url))
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = reply.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: reply.text().await.unwrap_or_default(),
            });
        }

        reply
            .json::<ApiResponse>()
            .await
            .map(Response::from)
            .map_err(|e| Error::Parse(e.to_string()))
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| Error::Config(format!("API key is not a valid header: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    fn build_api_request(&self, request: &Request) -> ApiRequest {
        ApiRequest {
            model: request.model.as_deref().unwrap_or(&self.model).to_string(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            temperature: request.temperature,
            tools: request.tools.iter().map(ApiTool::from).collect(),
            tool_choice: request.tool_choice.as_ref().map(ApiToolChoice::from),
        }
    }
}

// ============================================================================
// Request side
// ============================================================================

/// One stat check: the tracker prompt plus the tools the model may call.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub max_tokens: usize,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<ToolChoice>,
}

impl Request {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            max_tokens: 1024,
            system: None,
            messages,
            temperature: None,
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }
}

/// A user turn. Checks never replay model output, so there is no assistant side.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A tool the model may call; `#[derive(Tool)]` builds these from structs.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// How the model picks among the offered tools.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolChoice {
    /// Let the model answer in prose if it wants.
    Auto,
    /// Require a call to the named tool.
    Tool { name: String },
}

// ============================================================================
// Reply side
// ============================================================================

/// What came back from a check.
#[derive(Debug, Clone)]
pub struct Response {
    pub blocks: Vec<ReplyBlock>,
    /// Raw `stop_reason`, e.g. `tool_use` or `max_tokens`.
    pub stop_reason: Option<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Reply pieces the checker reads. Thinking and other block types are dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBlock {
    Text(String),
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
}

impl Response {
    /// Prose parts of the reply, joined.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ReplyBlock::Text(text) => Some(text.as_str()),
                ReplyBlock::ToolUse { .. } => None,
            })
            .collect()
    }

    /// Arguments of the first call to `tool_name`.
    pub fn tool_input(&self, tool_name: &str) -> Option<&serde_json::Value> {
        self.blocks.iter().find_map(|block| match block {
            ReplyBlock::ToolUse { name, input } if name == tool_name => Some(input),
            _ => None,
        })
    }

    /// True when the reply was cut off by the token limit.
    pub fn truncated(&self) -> bool {
        self.stop_reason.as_deref() == Some("max_tokens")
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ApiToolChoice>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiTextBlock>,
}

#[derive(Debug, Serialize)]
struct ApiTextBlock {
    r#type: &'static str,
    text: String,
}

impl From<&Message> for ApiMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: "user",
            content: vec![ApiTextBlock {
                r#type: "text",
                text: message.text.clone(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

impl From<&Tool> for ApiTool {
    fn from(tool: &Tool) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiToolChoice {
    Auto,
    Tool { name: String },
}

impl From<&ToolChoice> for ApiToolChoice {
    fn from(choice: &ToolChoice) -> Self {
        match choice {
            ToolChoice::Auto => ApiToolChoice::Auto,
            ToolChoice::Tool { name } => ApiToolChoice::Tool { name: name.clone() },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<serde_json::Value>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiReplyBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
}

impl From<ApiResponse> for Response {
    fn from(api: ApiResponse) -> Self {
        let blocks = api
            .content
            .into_iter()
            .filter_map(|raw| match serde_json::from_value(raw) {
                Ok(ApiReplyBlock::Text { text }) => Some(ReplyBlock::Text(text)),
                Ok(ApiReplyBlock::ToolUse { name, input }) => {
                    Some(ReplyBlock::ToolUse { name, input })
                }
                Err(_) => None,
            })
            .collect();

        Response {
            blocks,
            stop_reason: api.stop_reason,
            input_tokens: api.usage.input_tokens,
            output_tokens: api.usage.output_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat_tool() -> Tool {
        Tool {
            name: "report_stat_changes".to_string(),
            description: "Report changes".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn test_client_defaults_and_overrides() {
        let client = Claude::new("test-key");
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url, API_BASE);

        let client = client
            .with_model("claude-3-5-haiku-latest")
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.model(), "claude-3-5-haiku-latest");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_stat_check_request_body() {
        let client = Claude::new("test-key");
        let request = Request::new(vec![Message::user("Health 100. The goblin bites.")])
            .with_system("You track stats")
            .with_max_tokens(512)
            .with_temperature(0.2)
            .with_tools(vec![stat_tool()])
            .with_tool_choice(ToolChoice::Tool {
                name: "report_stat_changes".to_string(),
            });

        let json = serde_json::to_value(client.build_api_request(&request)).unwrap();
        assert_eq!(json["model"], DEFAULT_MODEL);
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["system"], "You track stats");
        assert_eq!(json["tools"][0]["name"], "report_stat_changes");
        assert_eq!(json["tool_choice"]["type"], "tool");
        assert_eq!(json["tool_choice"]["name"], "report_stat_changes");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(
            json["messages"][0]["content"][0]["text"],
            "Health 100. The goblin bites."
        );
    }

    #[test]
    fn test_bare_request_omits_optional_fields() {
        let client = Claude::new("test-key").with_model("claude-3-5-haiku-latest");
        let request = Request::new(vec![Message::user("hi")]);

        let json = serde_json::to_value(client.build_api_request(&request)).unwrap();
        assert_eq!(json["model"], "claude-3-5-haiku-latest");
        assert!(json.get("system").is_none());
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
        assert!(json.get("temperature").is_none());

        let auto = serde_json::to_value(ApiToolChoice::from(&ToolChoice::Auto)).unwrap();
        assert_eq!(auto, serde_json::json!({"type": "auto"}));
    }

    #[test]
    fn test_reply_keeps_text_and_tool_calls_only() {
        let raw = serde_json::json!({
            "id": "msg_1",
            "model": "claude",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Here you go"},
                {"type": "tool_use", "id": "tu_1", "name": "report_stat_changes", "input": {"health": 80}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });

        let api: ApiResponse = serde_json::from_value(raw).unwrap();
        let response = Response::from(api);

        assert_eq!(response.blocks.len(), 2);
        assert_eq!(response.text(), "Here you go");
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(response.input_tokens, 10);
        assert!(!response.truncated());
        assert_eq!(
            response.tool_input("report_stat_changes"),
            Some(&serde_json::json!({"health": 80}))
        );
        assert!(response.tool_input("other").is_none());
    }

    #[test]
    fn test_truncated_reply_without_usage() {
        let raw = serde_json::json!({
            "content": [{"type": "text", "text": "{\"health\": "}],
            "stop_reason": "max_tokens"
        });

        let response = Response::from(serde_json::from_value::<ApiResponse>(raw).unwrap());
        assert!(response.truncated());
        assert_eq!(response.output_tokens, 0);
    }

    #[test]
    fn test_from_env_requires_key() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        assert!(matches!(Claude::from_env(), Err(Error::NoApiKey)));
    }
}
