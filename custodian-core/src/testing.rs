//! Test doubles for the host capabilities.
//!
//! - `MemoryStore` records every settings write
//! - `MockPersonaRepository` keeps an in-memory character list
//! - `MockChecker` returns scripted stat patches without API calls

use crate::checker::{CheckError, StatChecker};
use crate::persist::{PersistError, SettingsStore};
use crate::persona::{PersonaError, PersonaRepository, PersonaSummary, PersonaTemplate};
use crate::settings::Settings;
use crate::stats::StatPatch;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Semaphore;

/// Settings store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    current: Mutex<Option<Settings>>,
    saves: Mutex<Vec<Settings>>,
    fail_writes: bool,
}

impl MemoryStore {
    /// An empty store, as on first install.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds settings.
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            current: Mutex::new(Some(settings)),
            ..Self::default()
        }
    }

    /// A store whose writes always fail.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Option<Settings> {
        self.current.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Every snapshot written, oldest first.
    pub fn saves(&self) -> Vec<Settings> {
        self.saves.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|s| s.len()).unwrap_or_default()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self) -> Result<Option<Settings>, PersistError> {
        Ok(self.current())
    }

    async fn save(&self, settings: &Settings) -> Result<(), PersistError> {
        if self.fail_writes {
            return Err(PersistError::Io(std::io::Error::other("store is read-only")));
        }
        if let Ok(mut current) = self.current.lock() {
            *current = Some(settings.clone());
        }
        if let Ok(mut saves) = self.saves.lock() {
            saves.push(settings.clone());
        }
        Ok(())
    }
}

/// Character repository held in memory.
#[derive(Debug, Default)]
pub struct MockPersonaRepository {
    personas: Mutex<Vec<PersonaSummary>>,
    created: Mutex<Vec<String>>,
    selected: Mutex<Option<usize>>,
    fail_create: bool,
    fail_list: bool,
}

impl MockPersonaRepository {
    pub fn with_personas(personas: Vec<PersonaSummary>) -> Self {
        Self {
            personas: Mutex::new(personas),
            ..Self::default()
        }
    }

    /// Creation answers with a server error.
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Listing answers with a server error.
    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// File names passed to `create`, in order.
    pub fn created(&self) -> Vec<String> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected.lock().ok().and_then(|s| *s)
    }
}

#[async_trait]
impl PersonaRepository for MockPersonaRepository {
    async fn list(&self) -> Result<Vec<PersonaSummary>, PersonaError> {
        if self.fail_list {
            return Err(PersonaError::Status {
                status: 500,
                context: "listing characters",
            });
        }
        Ok(self.personas.lock().map(|p| p.clone()).unwrap_or_default())
    }

    async fn create(
        &self,
        template: &PersonaTemplate,
        file_name: &str,
    ) -> Result<(), PersonaError> {
        if self.fail_create {
            return Err(PersonaError::Status {
                status: 500,
                context: "creating character",
            });
        }
        if let Ok(mut personas) = self.personas.lock() {
            personas.push(PersonaSummary {
                name: template.name.clone(),
                avatar: format!("{file_name}.json"),
            });
        }
        if let Ok(mut created) = self.created.lock() {
            created.push(file_name.to_string());
        }
        Ok(())
    }

    async fn select(&self, index: usize) -> Result<PersonaSummary, PersonaError> {
        let persona = self
            .personas
            .lock()
            .ok()
            .and_then(|p| p.get(index).cloned())
            .ok_or(PersonaError::NotFound)?;
        if let Ok(mut selected) = self.selected.lock() {
            *selected = Some(index);
        }
        Ok(persona)
    }
}

/// A checker that returns scripted patches in order.
///
/// Once the script runs out it returns empty patches. A gated checker
/// blocks each check until [`MockChecker::release`] is called.
#[derive(Debug)]
pub struct MockChecker {
    responses: Mutex<VecDeque<Result<StatPatch, String>>>,
    prompts: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
}

impl MockChecker {
    pub fn new(responses: Vec<StatPatch>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            prompts: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Make every check wait for a [`MockChecker::release`].
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Queue a failed check.
    pub fn queue_error(&self, message: impl Into<String>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Err(message.into()));
        }
    }

    /// Queue a successful check.
    pub fn queue_patch(&self, patch: StatPatch) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Ok(patch));
        }
    }

    /// Let one waiting check finish.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StatChecker for MockChecker {
    async fn check(&self, prompt: &str) -> Result<StatPatch, CheckError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        match next {
            Some(Ok(patch)) => Ok(patch),
            Some(Err(message)) => Err(CheckError::InvalidReply(message)),
            None => Ok(StatPatch::default()),
        }
    }
}
