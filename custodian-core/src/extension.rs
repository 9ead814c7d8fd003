//! Extension - the running instance the host talks to.
//!
//! Owns the [`StatTracker`] and wires it to the host capabilities: the
//! settings store (through the debounced saver), the stat checker (through
//! the dispatcher), and the optional persona repository. Nothing in here is
//! allowed to take the host down; failures end up as log lines and notices.

use crate::checker::{CheckDispatcher, CheckOutcome, StatChecker};
use crate::commands::CommandRegistry;
use crate::debounce::{DebouncedSaver, DEFAULT_SAVE_DELAY};
use crate::events::{EventReceiver, ExtensionOutput, HostEvent};
use crate::persist::SettingsStore;
use crate::persona::{ensure_game_master, switch_to_game_master, PersonaRepository, PersonaTemplate};
use crate::settings::{Settings, SettingsEdit};
use crate::tracker::StatTracker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Host-provided capabilities.
#[derive(Clone)]
pub struct Capabilities {
    /// Where settings are persisted.
    pub store: Arc<dyn SettingsStore>,

    /// The host's character repository. Persona features are off without it.
    pub personas: Option<Arc<dyn PersonaRepository>>,

    /// Who answers stat checks.
    pub checker: Arc<dyn StatChecker>,
}

/// Configuration for starting the extension.
#[derive(Debug, Clone)]
pub struct ExtensionConfig {
    /// Quiet time before an edit is written.
    pub save_delay: Duration,

    /// Replacement Game Master card. The bundled card is used when unset.
    pub template_path: Option<PathBuf>,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            save_delay: DEFAULT_SAVE_DELAY,
            template_path: None,
        }
    }
}

impl ExtensionConfig {
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    pub fn with_template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }
}

/// A running extension instance.
pub struct Extension {
    tracker: StatTracker,
    commands: CommandRegistry,
    saver: DebouncedSaver,
    dispatcher: CheckDispatcher,
    check_results: mpsc::UnboundedReceiver<CheckOutcome>,
    personas: Option<Arc<dyn PersonaRepository>>,
    template: Option<PersonaTemplate>,
    outputs: mpsc::UnboundedSender<ExtensionOutput>,
}

impl Extension {
    /// Load settings, bootstrap the Game Master and start background tasks.
    ///
    /// Returns the extension and the receiver for its UI outputs.
    pub async fn start(
        caps: Capabilities,
        config: ExtensionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ExtensionOutput>) {
        let settings = load_settings(caps.store.as_ref()).await;
        let tracker = StatTracker::new(settings);

        let saver = DebouncedSaver::spawn(Arc::clone(&caps.store), config.save_delay);
        let (dispatcher, check_results) = CheckDispatcher::new(Arc::clone(&caps.checker));
        let (outputs, output_rx) = mpsc::unbounded_channel();

        let template = match PersonaTemplate::load_or_bundled(config.template_path.as_deref()).await
        {
            Ok(template) => Some(template),
            Err(e) => {
                error!(error = %e, "failed to load Game Master template");
                None
            }
        };

        let mut commands = CommandRegistry::new();
        commands.register("stats", "Show the character stat panel", StatTracker::panel);

        let extension = Self {
            tracker,
            commands,
            saver,
            dispatcher,
            check_results,
            personas: caps.personas,
            template,
            outputs,
        };

        extension.bootstrap_game_master().await;
        info!("extension started");
        (extension, output_rx)
    }

    async fn bootstrap_game_master(&self) {
        let (Some(repo), Some(template)) = (&self.personas, &self.template) else {
            warn!("no Game Master available: persona repository or template missing");
            return;
        };
        if let Err(e) = ensure_game_master(repo.as_ref(), template).await {
            error!(error = %e, "failed to ensure Game Master exists");
        }
    }

    /// Handle one host event.
    pub async fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::MessageReceived => self.message_received(),
            HostEvent::CommandInvoked { name } => {
                let output = match self.commands.invoke(&name, &self.tracker) {
                    Some(text) => ExtensionOutput::Panel(text),
                    None => ExtensionOutput::Notice(format!("Unknown command: /{name}")),
                };
                self.emit(output);
            }
            HostEvent::SettingsEdited(edit) => self.edit_settings(edit),
            HostEvent::SwitchToGameMaster => self.switch_to_game_master().await,
            HostEvent::Shutdown => {}
        }
    }

    fn message_received(&mut self) {
        let Some(prompt) = self.tracker.message_arrived() else {
            return;
        };
        if !self.dispatcher.dispatch(prompt) {
            info!("stat check skipped; previous check still running");
        }
    }

    fn edit_settings(&mut self, edit: SettingsEdit) {
        let relabel = matches!(edit, SettingsEdit::SetLabel(..));
        let stats_changed = self.tracker.apply_edit(edit);
        self.saver.schedule(self.tracker.snapshot());
        if stats_changed || relabel {
            self.emit_stats();
        }
    }

    async fn switch_to_game_master(&mut self) {
        let (Some(repo), Some(template)) = (&self.personas, &self.template) else {
            self.emit(ExtensionOutput::Notice("No Game Master available".to_string()));
            return;
        };
        match switch_to_game_master(repo.as_ref(), template).await {
            Ok(_) => self.emit(ExtensionOutput::Notice("Switched to Game Master".to_string())),
            Err(e) => {
                error!(error = %e, "failed to switch to Game Master");
                self.emit(ExtensionOutput::Notice("No Game Master available".to_string()));
            }
        }
    }

    /// Apply the result of a finished stat check.
    pub fn apply_check_result(&mut self, outcome: CheckOutcome) {
        match outcome {
            Ok(patch) => {
                if self.tracker.apply_patch(&patch) {
                    info!("stats updated from check");
                    self.saver.schedule(self.tracker.snapshot());
                    self.emit_stats();
                }
            }
            Err(e) => warn!(error = %e, "stat check failed"),
        }
    }

    /// Wait for the next finished stat check.
    pub async fn next_check_result(&mut self) -> Option<CheckOutcome> {
        self.check_results.recv().await
    }

    /// Process host events and check results until shutdown.
    ///
    /// Ends on [`HostEvent::Shutdown`] or once every [`EventBus`] handle
    /// is gone.
    ///
    /// [`EventBus`]: crate::events::EventBus
    pub async fn run(mut self, mut events: EventReceiver) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(HostEvent::Shutdown) | None => break,
                    Some(event) => self.handle_event(event).await,
                },
                Some(outcome) = self.check_results.recv() => self.apply_check_result(outcome),
            }
        }
        self.shutdown().await;
    }

    /// Write pending settings and stop background work.
    pub async fn shutdown(self) {
        self.saver.shutdown().await;
        info!("extension stopped");
    }

    /// Write pending settings now.
    pub async fn flush(&self) {
        self.saver.flush().await;
    }

    pub fn tracker(&self) -> &StatTracker {
        &self.tracker
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn check_in_flight(&self) -> bool {
        self.dispatcher.is_in_flight()
    }

    fn emit_stats(&self) {
        self.emit(ExtensionOutput::StatsChanged {
            record: self.tracker.record().clone(),
            labels: self.tracker.labels().clone(),
        });
    }

    fn emit(&self, output: ExtensionOutput) {
        // The host may not listen for outputs.
        let _ = self.outputs.send(output);
    }
}

/// Stored settings, or defaults. Defaults are written back only when the
/// store is empty, never over a file that failed to load.
async fn load_settings(store: &dyn SettingsStore) -> Settings {
    match store.load().await {
        Ok(Some(settings)) => settings.normalized(),
        Ok(None) => {
            info!("no stored settings; initializing defaults");
            let settings = Settings::default();
            if let Err(e) = store.save(&settings).await {
                warn!(error = %e, "failed to persist default settings");
            }
            settings
        }
        Err(e) => {
            warn!(error = %e, "failed to load settings; using defaults");
            Settings::default()
        }
    }
}
