//! Debounced settings writer.
//!
//! Every edit hands the saver a full snapshot. The saver keeps only the
//! newest one and writes it once the edits have been quiet for the
//! configured delay. Shutting down writes whatever is still pending.

use crate::persist::SettingsStore;
use crate::settings::Settings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Delay after the last edit before settings are written.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(1000);

enum SaveCommand {
    Schedule(Box<Settings>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background writer task.
pub struct DebouncedSaver {
    commands: mpsc::UnboundedSender<SaveCommand>,
    task: JoinHandle<()>,
}

impl DebouncedSaver {
    /// Start the writer on the current tokio runtime.
    pub fn spawn(store: Arc<dyn SettingsStore>, delay: Duration) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_saver(store, delay, rx));
        Self { commands, task }
    }

    /// Replace the pending snapshot and restart the quiet timer.
    pub fn schedule(&self, settings: Settings) {
        if self
            .commands
            .send(SaveCommand::Schedule(Box::new(settings)))
            .is_err()
        {
            warn!("settings writer has stopped; dropping snapshot");
        }
    }

    /// Write any pending snapshot now.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(SaveCommand::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Stop the writer, writing any pending snapshot first.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            warn!(error = %e, "settings writer task failed");
        }
    }
}

async fn run_saver(
    store: Arc<dyn SettingsStore>,
    delay: Duration,
    mut commands: mpsc::UnboundedReceiver<SaveCommand>,
) {
    let mut pending: Option<Box<Settings>> = None;
    let mut deadline = Instant::now();

    loop {
        let command = if pending.is_some() {
            tokio::select! {
                command = commands.recv() => command,
                _ = sleep_until(deadline) => {
                    write(store.as_ref(), pending.take()).await;
                    continue;
                }
            }
        } else {
            commands.recv().await
        };

        match command {
            Some(SaveCommand::Schedule(settings)) => {
                pending = Some(settings);
                deadline = Instant::now() + delay;
            }
            Some(SaveCommand::Flush(ack)) => {
                write(store.as_ref(), pending.take()).await;
                let _ = ack.send(());
            }
            None => {
                write(store.as_ref(), pending.take()).await;
                break;
            }
        }
    }
}

async fn write(store: &dyn SettingsStore, settings: Option<Box<Settings>>) {
    let Some(settings) = settings else {
        return;
    };
    match store.save(&settings).await {
        Ok(()) => debug!("settings saved"),
        Err(e) => warn!(error = %e, "failed to save settings"),
    }
}
