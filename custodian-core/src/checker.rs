//! Stat checks against a language model.
//!
//! When the cadence says a check is due, the rendered prompt goes to a
//! [`StatChecker`]. The Claude checker forces a `report_stat_changes` tool
//! call so the reply arrives as structured JSON that becomes a [`StatPatch`].

use crate::stats::StatPatch;
use async_trait::async_trait;
use claude::{Claude, Message, Request, ToolChoice};
use custodian_macros::Tool;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Errors from a stat check.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("Claude API error: {0}")]
    Api(#[from] claude::Error),

    #[error("Model reply did not contain stat changes: {0}")]
    InvalidReply(String),

    #[error("Stat checks are disabled")]
    Disabled,
}

/// Asks something for the stat changes since the last check.
#[async_trait]
pub trait StatChecker: Send + Sync {
    async fn check(&self, prompt: &str) -> Result<StatPatch, CheckError>;
}

/// Report changes to the player character's stats. Omit fields that did not change.
#[derive(Tool)]
#[tool(name = "report_stat_changes")]
#[allow(dead_code)]
pub struct ReportStatChanges {
    /// New character level
    level: Option<i64>,
    /// New experience total
    experience: Option<i64>,
    /// New current health
    health: Option<i64>,
    /// New maximum health
    #[tool(rename = "maxHealth")]
    max_health: Option<i64>,
    /// Where the character is now
    location: Option<String>,
    /// The complete inventory after the change, in order
    inventory: Option<Vec<String>>,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are the Game Master's bookkeeper. \
You read the roleplay so far and report how the player character's stats changed. \
Always answer by calling the report_stat_changes tool.";

/// Configuration for the Claude stat checker.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// The model to use (client default when unset).
    pub model: Option<String>,

    /// Maximum tokens for the reply.
    pub max_tokens: usize,

    /// Temperature for generation.
    pub temperature: Option<f32>,

    /// System prompt sent with every check.
    pub system_prompt: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 512,
            temperature: Some(0.2),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl CheckerConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

/// Stat checker backed by the Claude Messages API.
pub struct ClaudeStatChecker {
    client: Claude,
    config: CheckerConfig,
}

impl ClaudeStatChecker {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            config: CheckerConfig::default(),
        }
    }

    /// Create a checker from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, CheckError> {
        Ok(Self::new(Claude::from_env()?))
    }

    pub fn with_config(mut self, config: CheckerConfig) -> Self {
        self.config = config;
        self
    }

    fn build_request(&self, prompt: &str) -> Request {
        let mut request = Request::new(vec![Message::user(prompt)])
            .with_system(&self.config.system_prompt)
            .with_max_tokens(self.config.max_tokens)
            .with_tools(vec![ReportStatChanges::as_tool()])
            .with_tool_choice(ToolChoice::Tool {
                name: ReportStatChanges::tool_name().to_string(),
            });

        if let Some(ref model) = self.config.model {
            request = request.with_model(model);
        }
        if let Some(temp) = self.config.temperature {
            request = request.with_temperature(temp);
        }
        request
    }
}

#[async_trait]
impl StatChecker for ClaudeStatChecker {
    async fn check(&self, prompt: &str) -> Result<StatPatch, CheckError> {
        let response = self.client.complete(self.build_request(prompt)).await?;
        debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "stat check reply received"
        );
        if response.truncated() {
            warn!("stat check reply hit the token limit");
        }

        if let Some(input) = response.tool_input(ReportStatChanges::tool_name()) {
            return Ok(StatPatch::from_value(input.clone()));
        }
        parse_reply_text(&response.text())
    }
}

/// Pull a patch out of a plain-text reply: the first JSON object in it.
///
/// A reply with no braces at all means "nothing changed".
pub fn parse_reply_text(text: &str) -> Result<StatPatch, CheckError> {
    let Some(start) = text.find('{') else {
        return Ok(StatPatch::default());
    };

    // Parse one value from the first brace; whatever follows is ignored.
    let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
    match values.next() {
        Some(Ok(value)) => Ok(StatPatch::from_value(value)),
        Some(Err(e)) => Err(CheckError::InvalidReply(e.to_string())),
        None => Err(CheckError::InvalidReply("empty JSON object".to_string())),
    }
}

/// Checker used when no model is configured.
pub struct DisabledChecker;

#[async_trait]
impl StatChecker for DisabledChecker {
    async fn check(&self, _prompt: &str) -> Result<StatPatch, CheckError> {
        Err(CheckError::Disabled)
    }
}

/// Result of one dispatched check.
pub type CheckOutcome = Result<StatPatch, CheckError>;

/// Runs checks in the background, one at a time.
///
/// A request made while another is outstanding is discarded, not queued,
/// so interleaved replies never apply twice.
pub struct CheckDispatcher {
    checker: Arc<dyn StatChecker>,
    in_flight: Arc<AtomicBool>,
    results: mpsc::UnboundedSender<CheckOutcome>,
}

impl CheckDispatcher {
    /// Create a dispatcher and the receiver its results arrive on.
    pub fn new(checker: Arc<dyn StatChecker>) -> (Self, mpsc::UnboundedReceiver<CheckOutcome>) {
        let (results, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            checker,
            in_flight: Arc::new(AtomicBool::new(false)),
            results,
        };
        (dispatcher, rx)
    }

    /// Start a check. Returns false if one was already running.
    pub fn dispatch(&self, prompt: String) -> bool {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("stat check already outstanding; discarding request");
            return false;
        }

        let checker = Arc::clone(&self.checker);
        let in_flight = InFlight(Arc::clone(&self.in_flight));
        let results = self.results.clone();

        tokio::spawn(async move {
            let outcome = checker.check(&prompt).await;
            drop(in_flight);
            if results.send(outcome).is_err() {
                warn!("stat check finished after the extension stopped");
            }
        });
        info!("stat check dispatched");
        true
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Clears the in-flight flag when the check task ends, even by panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChecker;
    use serde_json::json;

    #[test]
    fn test_tool_definition() {
        assert_eq!(ReportStatChanges::tool_name(), "report_stat_changes");
        assert!(ReportStatChanges::tool_description().starts_with("Report changes"));

        let schema = ReportStatChanges::input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["health"]["type"], "integer");
        assert_eq!(schema["properties"]["maxHealth"]["type"], "integer");
        assert_eq!(schema["properties"]["inventory"]["type"], "array");
        assert_eq!(schema["properties"]["inventory"]["items"]["type"], "string");
        assert_eq!(schema["properties"]["location"]["description"], "Where the character is now");
        assert_eq!(schema["required"], json!([]));
    }

    #[test]
    fn test_request_forces_tool() {
        let checker = ClaudeStatChecker::new(Claude::new("test-key"))
            .with_config(CheckerConfig::default().with_model("claude-3-5-haiku-latest"));
        let request = checker.build_request("How did things change?");

        assert_eq!(request.model.as_deref(), Some("claude-3-5-haiku-latest"));
        assert_eq!(request.max_tokens, 512);
        assert!(matches!(
            request.tool_choice,
            Some(ToolChoice::Tool { ref name }) if name == "report_stat_changes"
        ));
        assert_eq!(request.tools.len(), 1);
    }

    #[test]
    fn test_parse_reply_text() {
        let patch = parse_reply_text("Sure! {\"health\": 12, \"location\": \"Cave\"} Done.").unwrap();
        assert_eq!(patch.health, Some(json!(12)));
        assert_eq!(patch.location, Some(json!("Cave")));

        assert!(parse_reply_text("Nothing changed.").unwrap().is_empty());

        let patch = parse_reply_text(r#"Changes: {"health": 3} and earlier {"health": 9}"#).unwrap();
        assert_eq!(patch.health, Some(json!(3)));
        assert!(matches!(
            parse_reply_text("{\"health\": "),
            Err(CheckError::InvalidReply(_))
        ));
    }

    struct PanickingChecker;

    #[async_trait]
    impl StatChecker for PanickingChecker {
        async fn check(&self, _prompt: &str) -> Result<StatPatch, CheckError> {
            panic!("checker blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_check_clears_in_flight() {
        let (dispatcher, _results) = CheckDispatcher::new(Arc::new(PanickingChecker));
        assert!(dispatcher.dispatch("prompt".to_string()));

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while dispatcher.is_in_flight() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("in-flight flag should clear after a panic");

        assert!(dispatcher.dispatch("again".to_string()));
    }

    #[tokio::test]
    async fn test_disabled_checker() {
        assert!(matches!(
            DisabledChecker.check("prompt").await,
            Err(CheckError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_dispatch_delivers_result() {
        let checker = Arc::new(MockChecker::new(vec![
            StatPatch::default().with_location("Harbor"),
        ]));
        let (dispatcher, mut results) = CheckDispatcher::new(checker.clone());

        assert!(dispatcher.dispatch("prompt one".to_string()));
        let patch = results.recv().await.unwrap().unwrap();
        assert_eq!(patch.location, Some(json!("Harbor")));
        assert_eq!(checker.prompts(), vec!["prompt one".to_string()]);
        assert!(!dispatcher.is_in_flight());
    }

    #[tokio::test]
    async fn test_overlapping_dispatch_is_discarded() {
        let checker = Arc::new(MockChecker::new(vec![StatPatch::default()]).gated());
        let (dispatcher, mut results) = CheckDispatcher::new(checker.clone());

        assert!(dispatcher.dispatch("first".to_string()));
        assert!(!dispatcher.dispatch("second".to_string()));
        assert!(dispatcher.is_in_flight());

        checker.release();
        assert!(results.recv().await.unwrap().is_ok());
        assert_eq!(checker.prompts(), vec!["first".to_string()]);

        assert!(dispatcher.dispatch("third".to_string()));
        checker.release();
        assert!(results.recv().await.is_some());
    }
}
