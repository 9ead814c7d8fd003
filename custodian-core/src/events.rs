//! Host events in, extension outputs out.

use crate::settings::SettingsEdit;
use crate::stats::{StatLabels, StatRecord};
use tokio::sync::mpsc;

/// Something the host reports to the extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A chat message arrived. Carries no payload.
    MessageReceived,
    /// The user ran a slash command.
    CommandInvoked { name: String },
    /// The user changed a value in the settings editor.
    SettingsEdited(SettingsEdit),
    /// The user asked to open the Game Master chat.
    SwitchToGameMaster,
    /// The host is tearing the extension down.
    Shutdown,
}

/// Something the extension wants the host UI to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionOutput {
    /// Rendered stat panel text.
    Panel(String),
    /// The stat record or its labels changed; re-render.
    StatsChanged {
        record: StatRecord,
        labels: StatLabels,
    },
    /// A short message for the user.
    Notice(String),
}

/// Receiving end of an [`EventBus`], owned by the running extension.
pub type EventReceiver = mpsc::Receiver<HostEvent>;

/// Queue the host uses to deliver events to the extension.
///
/// Events are delivered in order and none are dropped. When the queue is
/// full, [`EventBus::emit`] waits for the extension to catch up.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: mpsc::Sender<HostEvent>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` undelivered events.
    pub fn channel(capacity: usize) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Deliver an event. Returns false once the extension has stopped.
    pub async fn emit(&self, event: HostEvent) -> bool {
        self.sender.send(event).await.is_ok()
    }
}

/// Default queue depth for [`EventBus::channel`].
pub const DEFAULT_EVENT_CAPACITY: usize = 64;
