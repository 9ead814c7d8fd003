//! StatTracker - the owned session state behind every handler.
//!
//! The tracker holds the live stat record, labels, cadence and settings.
//! It performs no I/O: callers decide when to persist [`StatTracker::snapshot`]
//! and where to send a rendered prompt.

use crate::cadence::UpdateCadence;
use crate::commands::render_panel;
use crate::prompt::render_prompt;
use crate::settings::{Settings, SettingsEdit};
use crate::stats::{apply_patch, StatLabels, StatPatch, StatRecord};
use tracing::debug;

/// Seed the live record and cadence from settings without touching them.
pub fn initialize(settings: &Settings) -> (StatRecord, UpdateCadence) {
    (
        settings.character_stats.clone(),
        UpdateCadence::new(settings.check_frequency),
    )
}

/// Live stat state for one extension instance.
#[derive(Debug, Clone)]
pub struct StatTracker {
    settings: Settings,
    record: StatRecord,
    cadence: UpdateCadence,
}

impl StatTracker {
    pub fn new(settings: Settings) -> Self {
        let settings = settings.normalized();
        let (record, cadence) = initialize(&settings);
        Self {
            settings,
            record,
            cadence,
        }
    }

    /// Count a chat message. Returns the rendered prompt when a check is due.
    ///
    /// A disabled tracker ignores messages and leaves the countdown alone.
    pub fn message_arrived(&mut self) -> Option<String> {
        if !self.settings.enabled {
            return None;
        }
        let due = self.cadence.message_arrived();
        debug!(remaining = self.cadence.remaining(), due, "message counted");
        due.then(|| self.render_prompt())
    }

    /// Merge a patch into the live record. Returns whether anything changed.
    pub fn apply_patch(&mut self, patch: &StatPatch) -> bool {
        let next = apply_patch(&self.record, patch);
        if next == self.record {
            return false;
        }
        self.record = next;
        self.settings.character_stats = self.record.clone();
        true
    }

    /// Apply a settings editor change. Returns whether the stat record changed.
    pub fn apply_edit(&mut self, edit: SettingsEdit) -> bool {
        let before = self.settings.check_frequency;
        let touches_stats = edit.touches_stats();

        edit.apply(&mut self.settings);
        self.settings = std::mem::take(&mut self.settings).normalized();

        if self.settings.check_frequency != before {
            self.cadence.set_frequency(self.settings.check_frequency);
        }
        if touches_stats && self.settings.character_stats != self.record {
            self.record = self.settings.character_stats.clone();
            return true;
        }
        false
    }

    /// The update prompt rendered against the live record.
    pub fn render_prompt(&self) -> String {
        render_prompt(&self.settings.update_prompt, &self.record, &self.settings.stat_labels)
    }

    /// The text stat panel.
    pub fn panel(&self) -> String {
        render_panel(&self.record, &self.settings.stat_labels)
    }

    pub fn record(&self) -> &StatRecord {
        &self.record
    }

    pub fn labels(&self) -> &StatLabels {
        &self.settings.stat_labels
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cadence(&self) -> &UpdateCadence {
        &self.cadence
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Full settings snapshot for persistence.
    pub fn snapshot(&self) -> Settings {
        self.settings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatKey;

    #[test]
    fn test_initialize_does_not_mutate() {
        let settings = Settings {
            check_frequency: 4,
            ..Settings::default()
        };
        let copy = settings.clone();
        let (record, cadence) = initialize(&settings);
        assert_eq!(settings, copy);
        assert_eq!(record, settings.character_stats);
        assert_eq!(cadence.remaining(), 4);
    }

    #[test]
    fn test_prompt_every_third_message() {
        let mut tracker = StatTracker::new(Settings::default());
        let due: Vec<bool> = (0..6).map(|_| tracker.message_arrived().is_some()).collect();
        assert_eq!(due, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn test_prompt_reflects_live_record() {
        let mut tracker = StatTracker::new(Settings {
            check_frequency: 1,
            ..Settings::default()
        });
        tracker.apply_patch(&StatPatch::default().with_location("Sunken Temple"));
        let prompt = tracker.message_arrived().expect("frequency 1 checks every message");
        assert!(prompt.contains("Location: Sunken Temple"));
    }

    #[test]
    fn test_disabled_ignores_messages() {
        let mut tracker = StatTracker::new(Settings {
            enabled: false,
            check_frequency: 1,
            ..Settings::default()
        });
        assert!(tracker.message_arrived().is_none());
        assert_eq!(tracker.cadence().remaining(), 1);
    }

    #[test]
    fn test_patch_syncs_settings() {
        let mut tracker = StatTracker::new(Settings::default());
        assert!(tracker.apply_patch(&StatPatch::default().with_stat(StatKey::Health, 70)));
        assert_eq!(tracker.record().health, 70);
        assert_eq!(tracker.snapshot().character_stats.health, 70);

        assert!(!tracker.apply_patch(&StatPatch::default().with_stat(StatKey::Health, 70)));
        assert!(!tracker.apply_patch(&StatPatch::default()));
    }

    #[test]
    fn test_frequency_edit_restarts_cadence() {
        let mut tracker = StatTracker::new(Settings::default());
        tracker.message_arrived();
        assert!(!tracker.apply_edit(SettingsEdit::SetCheckFrequency("2".to_string())));
        assert_eq!(tracker.cadence().remaining(), 2);
        assert!(tracker.message_arrived().is_none());
        assert!(tracker.message_arrived().is_some());
    }

    #[test]
    fn test_stat_edit_updates_record() {
        let mut tracker = StatTracker::new(Settings::default());
        assert!(tracker.apply_edit(SettingsEdit::SetStat(StatKey::Level, "5".to_string())));
        assert_eq!(tracker.record().level, 5);

        assert!(!tracker.apply_edit(SettingsEdit::SetStat(StatKey::Level, "five".to_string())));
        assert_eq!(tracker.record().level, 5);
    }

    #[test]
    fn test_label_edit_shows_in_panel() {
        let mut tracker = StatTracker::new(Settings::default());
        tracker.apply_edit(SettingsEdit::SetLabel(StatKey::Experience, "Renown".to_string()));
        assert!(tracker.panel().contains("Renown"));
        assert_eq!(tracker.labels().experience, "Renown");
    }

    #[test]
    fn test_new_normalizes_frequency() {
        let tracker = StatTracker::new(Settings {
            check_frequency: 0,
            ..Settings::default()
        });
        assert_eq!(tracker.settings().check_frequency, 1);
    }
}
