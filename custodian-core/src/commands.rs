//! Slash commands and the stat panel they display.

use crate::stats::{StatKey, StatLabels, StatRecord};
use crate::tracker::StatTracker;
use std::collections::BTreeMap;
use std::fmt::Write;

type CommandAction = Box<dyn Fn(&StatTracker) -> String + Send + Sync>;

struct Command {
    help: String,
    action: CommandAction,
}

/// Named zero-argument display actions.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a command name. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, help: impl Into<String>, action: F)
    where
        F: Fn(&StatTracker) -> String + Send + Sync + 'static,
    {
        let name = normalize(&name.into());
        self.commands.insert(
            name,
            Command {
                help: help.into(),
                action: Box::new(action),
            },
        );
    }

    /// Run a command. Leading `/` and surrounding whitespace are ignored.
    pub fn invoke(&self, name: &str, tracker: &StatTracker) -> Option<String> {
        self.commands
            .get(&normalize(name))
            .map(|command| (command.action)(tracker))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(&normalize(name))
    }

    /// One `/name - help` line per command, sorted by name.
    pub fn help(&self) -> String {
        self.commands
            .iter()
            .map(|(name, command)| format!("/{name} - {}", command.help))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn normalize(name: &str) -> String {
    name.trim().trim_start_matches('/').to_ascii_lowercase()
}

/// Render the text stat panel.
pub fn render_panel(record: &StatRecord, labels: &StatLabels) -> String {
    let width = StatKey::ALL
        .iter()
        .map(|&key| labels.get(key).chars().count())
        .chain(["Location".len(), "Inventory".len()])
        .max()
        .unwrap_or(0);

    let mut panel = String::from("== Character Stats ==\n");
    for key in StatKey::ALL {
        let _ = writeln!(panel, "{:<width$}  {}", labels.get(key), record.get(key));
    }
    let _ = writeln!(panel, "{:<width$}  {}", "Location", record.location);
    let inventory = if record.inventory.is_empty() {
        "(empty)".to_string()
    } else {
        record.inventory_text()
    };
    let _ = write!(panel, "{:<width$}  {}", "Inventory", inventory);
    panel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn test_register_and_invoke() {
        let tracker = StatTracker::new(Settings::default());
        let mut registry = CommandRegistry::new();
        registry.register("stats", "Show the stat panel", |t: &StatTracker| t.panel());

        assert!(registry.contains("/stats"));
        let output = registry.invoke("/Stats ", &tracker).expect("command should run");
        assert!(output.contains("Health"));
        assert!(registry.invoke("inventory", &tracker).is_none());
    }

    #[test]
    fn test_later_registration_replaces() {
        let tracker = StatTracker::new(Settings::default());
        let mut registry = CommandRegistry::new();
        registry.register("stats", "first", |_: &StatTracker| "one".to_string());
        registry.register("stats", "second", |_: &StatTracker| "two".to_string());

        assert_eq!(registry.invoke("stats", &tracker).as_deref(), Some("two"));
        assert_eq!(registry.help(), "/stats - second");
    }

    #[test]
    fn test_panel_layout() {
        let record = StatRecord {
            inventory: vec!["rope".to_string(), "rope".to_string()],
            ..StatRecord::default()
        };
        let panel = render_panel(&record, &StatLabels::default());
        let lines: Vec<_> = panel.lines().collect();

        assert_eq!(lines[0], "== Character Stats ==");
        assert_eq!(lines[1], "Level       1");
        assert_eq!(lines[4], "Max Health  100");
        assert_eq!(lines[5], "Location    Unknown");
        assert_eq!(lines[6], "Inventory   rope, rope");
    }

    #[test]
    fn test_panel_empty_inventory() {
        let panel = render_panel(&StatRecord::default(), &StatLabels::default());
        assert!(panel.ends_with("(empty)"));
    }
}
