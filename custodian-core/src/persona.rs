//! Game Master persona bootstrap.
//!
//! The extension ships a character card for a "Game Master" persona and
//! makes sure the host's character repository contains it, creating it
//! from the card when missing.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

/// Avatar file name the host assigns to the Game Master.
pub const GAME_MASTER_AVATAR: &str = "Game Master.json";

/// File name requested when creating the Game Master.
pub const GAME_MASTER_FILE_NAME: &str = "Game Master";

const GAME_MASTER_NAME: &str = "Game Master";

const BUNDLED_TEMPLATE: &str = include_str!("../templates/game_master.json");

/// Errors from persona operations.
#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{context} failed with status {status}")]
    Status { status: u16, context: &'static str },

    #[error("Invalid persona template: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persona not found")]
    NotFound,
}

/// A character card used to create a persona.
///
/// Accepts both the V3 layout (`{"spec": ..., "data": {...}}`) and a flat
/// object. Every optional field falls back to empty, including fields that
/// are `null` or hold the wrong type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PersonaTemplate {
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient")]
    pub personality: String,
    #[serde(default, deserialize_with = "lenient")]
    pub scenario: String,
    #[serde(default, deserialize_with = "lenient")]
    pub first_mes: String,
    #[serde(default, deserialize_with = "lenient")]
    pub mes_example: String,
    #[serde(default, deserialize_with = "lenient")]
    pub creator_notes: String,
    #[serde(default, deserialize_with = "lenient")]
    pub system_prompt: String,
    #[serde(default, deserialize_with = "lenient")]
    pub post_history_instructions: String,
    #[serde(default, deserialize_with = "lenient")]
    pub creator: String,
    #[serde(default, deserialize_with = "lenient")]
    pub character_version: String,
    #[serde(default, deserialize_with = "lenient")]
    pub alternate_greetings: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub extensions: Option<Value>,
}

/// Read a field, replacing `null` or a mistyped value with the default.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl PersonaTemplate {
    /// Parse a card from JSON text.
    pub fn from_json(text: &str) -> Result<Self, PersonaError> {
        let mut card: Value =
            serde_json::from_str(text).map_err(|e| PersonaError::Template(e.to_string()))?;
        if !card.is_object() {
            return Err(PersonaError::Template("card must be a JSON object".to_string()));
        }
        let data = if card.get("data").is_some_and(Value::is_object) {
            card["data"].take()
        } else {
            card
        };
        serde_json::from_value(data).map_err(|e| PersonaError::Template(e.to_string()))
    }

    /// The card compiled into the extension.
    pub fn bundled() -> Result<Self, PersonaError> {
        Self::from_json(BUNDLED_TEMPLATE)
    }

    /// Read a card from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PersonaError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json(&text)
    }

    /// Read `path` if given, otherwise use the bundled card.
    pub async fn load_or_bundled(path: Option<&Path>) -> Result<Self, PersonaError> {
        match path {
            Some(path) => Self::load(path).await,
            None => Self::bundled(),
        }
    }
}

/// Multipart fields for the host's character-create endpoint.
pub fn form_fields(template: &PersonaTemplate, file_name: &str) -> Vec<(&'static str, String)> {
    let name = if template.name.trim().is_empty() {
        GAME_MASTER_NAME.to_string()
    } else {
        template.name.clone()
    };

    let mut fields = vec![
        ("ch_name", name),
        ("file_name", file_name.to_string()),
        ("description", template.description.clone()),
        ("personality", template.personality.clone()),
        ("scenario", template.scenario.clone()),
        ("first_mes", template.first_mes.clone()),
        ("mes_example", template.mes_example.clone()),
        ("creator_notes", template.creator_notes.clone()),
        ("system_prompt", template.system_prompt.clone()),
        (
            "post_history_instructions",
            template.post_history_instructions.clone(),
        ),
        ("creator", template.creator.clone()),
        ("character_version", template.character_version.clone()),
    ];

    fields.extend(
        template
            .alternate_greetings
            .iter()
            .map(|greeting| ("alternate_greetings", greeting.clone())),
    );

    if !template.tags.is_empty() {
        fields.push(("tags", template.tags.join(",")));
    }

    if let Some(extensions) = &template.extensions {
        fields.push(("extensions", extensions.to_string()));
    }

    fields
}

/// One entry of the host's character list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PersonaSummary {
    pub name: String,
    pub avatar: String,
}

/// The host's character repository.
#[async_trait]
pub trait PersonaRepository: Send + Sync {
    /// Fetch the current character list.
    async fn list(&self) -> Result<Vec<PersonaSummary>, PersonaError>;

    /// Create a persona from a card.
    async fn create(&self, template: &PersonaTemplate, file_name: &str)
        -> Result<(), PersonaError>;

    /// Make the persona at `index` of the last list the active one.
    async fn select(&self, index: usize) -> Result<PersonaSummary, PersonaError>;
}

/// Index of the Game Master in a character list.
pub fn find_game_master(personas: &[PersonaSummary]) -> Option<usize> {
    personas.iter().position(|p| p.avatar == GAME_MASTER_AVATAR)
}

/// What [`ensure_game_master`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMasterStatus {
    AlreadyExists,
    Created,
}

/// Create the Game Master from `template` unless it already exists.
pub async fn ensure_game_master(
    repo: &dyn PersonaRepository,
    template: &PersonaTemplate,
) -> Result<GameMasterStatus, PersonaError> {
    if find_game_master(&repo.list().await?).is_some() {
        info!("Game Master persona already exists");
        return Ok(GameMasterStatus::AlreadyExists);
    }

    info!("Game Master persona not found; creating from template");
    repo.create(template, GAME_MASTER_FILE_NAME).await?;

    // Refresh so the next lookup sees the new entry.
    if find_game_master(&repo.list().await?).is_none() {
        warn!("Game Master was created but is not listed yet");
    }
    Ok(GameMasterStatus::Created)
}

/// Select the Game Master, creating it first if needed. Returns its index.
pub async fn switch_to_game_master(
    repo: &dyn PersonaRepository,
    template: &PersonaTemplate,
) -> Result<usize, PersonaError> {
    let index = match find_game_master(&repo.list().await?) {
        Some(index) => index,
        None => {
            warn!("Game Master not found; attempting to create it");
            ensure_game_master(repo, template).await?;
            find_game_master(&repo.list().await?).ok_or(PersonaError::NotFound)?
        }
    };

    repo.select(index).await?;
    info!(index, "switched to Game Master");
    Ok(index)
}

/// Character repository reached over the host server's HTTP API.
pub struct HttpPersonaRepository {
    client: reqwest::Client,
    base_url: String,
    csrf_token: Option<String>,
    listed: Mutex<Vec<PersonaSummary>>,
    active: Mutex<Option<PersonaSummary>>,
}

impl HttpPersonaRepository {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            csrf_token: None,
            listed: Mutex::new(Vec::new()),
            active: Mutex::new(None),
        }
    }

    /// Send this token in the `x-csrf-token` header.
    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    /// The persona selected last, if any.
    pub fn active(&self) -> Option<PersonaSummary> {
        self.active.lock().ok().and_then(|active| active.clone())
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = self
            .csrf_token
            .as_deref()
            .and_then(|token| HeaderValue::from_str(token).ok())
        {
            headers.insert("x-csrf-token", value);
        }
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl PersonaRepository for HttpPersonaRepository {
    async fn list(&self) -> Result<Vec<PersonaSummary>, PersonaError> {
        let response = self
            .client
            .post(self.url("/api/characters/all"))
            .headers(self.headers())
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PersonaError::Status {
                status: response.status().as_u16(),
                context: "listing characters",
            });
        }

        let personas: Vec<PersonaSummary> = response.json().await?;
        if let Ok(mut listed) = self.listed.lock() {
            listed.clone_from(&personas);
        }
        Ok(personas)
    }

    async fn create(
        &self,
        template: &PersonaTemplate,
        file_name: &str,
    ) -> Result<(), PersonaError> {
        let form = form_fields(template, file_name)
            .into_iter()
            .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                form.text(name, value)
            });

        let response = self
            .client
            .post(self.url("/api/characters/create"))
            .headers(self.headers())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PersonaError::Status {
                status: response.status().as_u16(),
                context: "creating character",
            });
        }
        Ok(())
    }

    async fn select(&self, index: usize) -> Result<PersonaSummary, PersonaError> {
        let persona = self
            .listed
            .lock()
            .ok()
            .and_then(|listed| listed.get(index).cloned())
            .ok_or(PersonaError::NotFound)?;

        if let Ok(mut active) = self.active.lock() {
            *active = Some(persona.clone());
        }
        Ok(persona)
    }
}
