//! Persisted extension settings and the editor's edit operations.

use crate::prompt::DEFAULT_UPDATE_PROMPT;
use crate::stats::{parse_int_text, split_items, StatKey, StatLabels, StatRecord};
use serde::{Deserialize, Serialize};

/// Default number of messages between stat checks.
pub const DEFAULT_CHECK_FREQUENCY: u32 = 3;

/// Everything the extension persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Whether chat messages advance the cadence.
    pub enabled: bool,

    /// Messages between stat checks. Always at least 1 after [`Settings::normalized`].
    pub check_frequency: u32,

    /// The current stat record.
    pub character_stats: StatRecord,

    /// Display labels for the stat panel and prompt.
    pub stat_labels: StatLabels,

    /// Template rendered into the stat check prompt.
    pub update_prompt: String,

    /// Where the host last placed the stat panel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel_position: Option<PanelPosition>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_frequency: DEFAULT_CHECK_FREQUENCY,
            character_stats: StatRecord::default(),
            stat_labels: StatLabels::default(),
            update_prompt: DEFAULT_UPDATE_PROMPT.to_string(),
            panel_position: None,
        }
    }
}

impl Settings {
    /// Repair values the editor or an old file may have left invalid.
    pub fn normalized(mut self) -> Self {
        self.check_frequency = self.check_frequency.max(1);
        if self.update_prompt.trim().is_empty() {
            self.update_prompt = DEFAULT_UPDATE_PROMPT.to_string();
        }
        self
    }
}

/// Panel placement in host pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PanelPosition {
    pub x: i32,
    pub y: i32,
}

/// A single change made in the settings editor.
///
/// Numeric edits carry the raw text the user typed; malformed text is
/// coerced when the edit is applied rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsEdit {
    SetEnabled(bool),
    SetCheckFrequency(String),
    SetStat(StatKey, String),
    SetLabel(StatKey, String),
    SetLocation(String),
    SetInventory(String),
    SetUpdatePrompt(String),
    MovePanel { x: i32, y: i32 },
    /// Restore the default stat record, keep everything else.
    ResetStats,
    /// Restore every setting to its default.
    ResetAll,
}

impl SettingsEdit {
    /// Apply the edit to a settings bundle.
    pub fn apply(self, settings: &mut Settings) {
        match self {
            SettingsEdit::SetEnabled(enabled) => settings.enabled = enabled,
            SettingsEdit::SetCheckFrequency(text) => {
                settings.check_frequency = parse_frequency(&text, settings.check_frequency);
            }
            SettingsEdit::SetStat(key, text) => {
                let stats = &mut settings.character_stats;
                let value = parse_int_text(&text).unwrap_or_else(|| stats.get(key));
                stats.set(key, value);
            }
            SettingsEdit::SetLabel(key, label) => settings.stat_labels.set(key, label),
            SettingsEdit::SetLocation(location) => {
                settings.character_stats.location = location.trim().to_string();
            }
            SettingsEdit::SetInventory(text) => {
                settings.character_stats.inventory = split_items(&text);
            }
            SettingsEdit::SetUpdatePrompt(prompt) => {
                settings.update_prompt = if prompt.trim().is_empty() {
                    DEFAULT_UPDATE_PROMPT.to_string()
                } else {
                    prompt
                };
            }
            SettingsEdit::MovePanel { x, y } => {
                settings.panel_position = Some(PanelPosition { x, y });
            }
            SettingsEdit::ResetStats => settings.character_stats = StatRecord::default(),
            SettingsEdit::ResetAll => *settings = Settings::default(),
        }
    }

    /// Whether applying this edit can change the stat record.
    pub fn touches_stats(&self) -> bool {
        matches!(
            self,
            SettingsEdit::SetStat(..)
                | SettingsEdit::SetLocation(_)
                | SettingsEdit::SetInventory(_)
                | SettingsEdit::ResetStats
                | SettingsEdit::ResetAll
        )
    }
}

/// Map an editor field name and raw value to an edit.
///
/// Field names: `enabled`, `frequency`, any stat key, `<key>Label`,
/// `location`, `inventory`, `prompt`, `panel` (`"x,y"`), `reset`
/// (`stats` or `all`).
pub fn parse_edit(field: &str, value: &str) -> Option<SettingsEdit> {
    let field = field.trim();
    match field {
        "enabled" => parse_bool(value).map(SettingsEdit::SetEnabled),
        "frequency" | "checkFrequency" => Some(SettingsEdit::SetCheckFrequency(value.to_string())),
        "location" => Some(SettingsEdit::SetLocation(value.to_string())),
        "inventory" => Some(SettingsEdit::SetInventory(value.to_string())),
        "prompt" | "updatePrompt" => Some(SettingsEdit::SetUpdatePrompt(value.to_string())),
        "panel" => {
            let (x, y) = value.split_once(',')?;
            Some(SettingsEdit::MovePanel {
                x: x.trim().parse().ok()?,
                y: y.trim().parse().ok()?,
            })
        }
        "reset" => match value.trim() {
            "stats" => Some(SettingsEdit::ResetStats),
            "all" => Some(SettingsEdit::ResetAll),
            _ => None,
        },
        _ => {
            if let Some(key) = field.strip_suffix("Label").and_then(StatKey::parse) {
                Some(SettingsEdit::SetLabel(key, value.to_string()))
            } else {
                StatKey::parse(field).map(|key| SettingsEdit::SetStat(key, value.to_string()))
            }
        }
    }
}

fn parse_frequency(text: &str, current: u32) -> u32 {
    match parse_int_text(text) {
        Some(n) if n < 1 => 1,
        Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
        None => current.max(1),
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.enabled);
        assert_eq!(settings.check_frequency, 3);
        assert_eq!(settings.update_prompt, DEFAULT_UPDATE_PROMPT);
        assert!(settings.panel_position.is_none());
    }

    #[test]
    fn test_persisted_schema_is_camel_case() {
        let mut settings = Settings::default();
        settings.panel_position = Some(PanelPosition { x: 10, y: 20 });
        let json = serde_json::to_value(&settings).unwrap();

        for field in [
            "enabled",
            "checkFrequency",
            "characterStats",
            "statLabels",
            "updatePrompt",
            "panelPosition",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["characterStats"]["maxHealth"], 100);
        assert_eq!(json["statLabels"]["maxHealth"], "Max Health");
        assert_eq!(json["panelPosition"], json!({"x": 10, "y": 20}));
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: Settings = serde_json::from_value(json!({
            "checkFrequency": 5,
            "characterStats": {"level": 7},
            "someOldField": true
        }))
        .unwrap();

        assert_eq!(settings.check_frequency, 5);
        assert_eq!(settings.character_stats.level, 7);
        assert_eq!(settings.character_stats.health, 0);
        assert!(settings.enabled);

        let settings: Settings = serde_json::from_value(json!({"enabled": false})).unwrap();
        assert_eq!(settings.character_stats, StatRecord::default());
        assert_eq!(settings.stat_labels, StatLabels::default());
    }

    #[test]
    fn test_normalized_repairs_values() {
        let settings = Settings {
            check_frequency: 0,
            update_prompt: "  ".to_string(),
            ..Settings::default()
        }
        .normalized();
        assert_eq!(settings.check_frequency, 1);
        assert_eq!(settings.update_prompt, DEFAULT_UPDATE_PROMPT);
    }

    #[test]
    fn test_stat_edit_coerces_bad_input() {
        let mut settings = Settings::default();
        SettingsEdit::SetStat(StatKey::Health, "abc".to_string()).apply(&mut settings);
        assert_eq!(settings.character_stats.health, 100);

        SettingsEdit::SetStat(StatKey::Health, " 42 ".to_string()).apply(&mut settings);
        assert_eq!(settings.character_stats.health, 42);
    }

    #[test]
    fn test_frequency_edit_coercion() {
        let mut settings = Settings::default();
        SettingsEdit::SetCheckFrequency("7".to_string()).apply(&mut settings);
        assert_eq!(settings.check_frequency, 7);
        SettingsEdit::SetCheckFrequency("often".to_string()).apply(&mut settings);
        assert_eq!(settings.check_frequency, 7);
        SettingsEdit::SetCheckFrequency("-2".to_string()).apply(&mut settings);
        assert_eq!(settings.check_frequency, 1);
    }

    #[test]
    fn test_inventory_edit_splits_text() {
        let mut settings = Settings::default();
        SettingsEdit::SetInventory("map, lantern, map".to_string()).apply(&mut settings);
        assert_eq!(
            settings.character_stats.inventory,
            vec!["map", "lantern", "map"]
        );
    }

    #[test]
    fn test_reset_edits() {
        let mut settings = Settings::default();
        SettingsEdit::SetStat(StatKey::Level, "9".to_string()).apply(&mut settings);
        SettingsEdit::SetLabel(StatKey::Level, "Rank".to_string()).apply(&mut settings);

        SettingsEdit::ResetStats.apply(&mut settings);
        assert_eq!(settings.character_stats.level, 1);
        assert_eq!(settings.stat_labels.level, "Rank");

        SettingsEdit::ResetAll.apply(&mut settings);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_edit_fields() {
        assert_eq!(parse_edit("enabled", "off"), Some(SettingsEdit::SetEnabled(false)));
        assert_eq!(parse_edit("enabled", "maybe"), None);
        assert_eq!(
            parse_edit("maxHealth", "120"),
            Some(SettingsEdit::SetStat(StatKey::MaxHealth, "120".to_string()))
        );
        assert_eq!(
            parse_edit("healthLabel", "HP"),
            Some(SettingsEdit::SetLabel(StatKey::Health, "HP".to_string()))
        );
        assert_eq!(
            parse_edit("panel", "12, -4"),
            Some(SettingsEdit::MovePanel { x: 12, y: -4 })
        );
        assert_eq!(parse_edit("panel", "12"), None);
        assert_eq!(parse_edit("reset", "stats"), Some(SettingsEdit::ResetStats));
        assert_eq!(parse_edit("mana", "3"), None);
    }
}
