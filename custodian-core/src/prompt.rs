//! Update prompt rendering.

use crate::stats::{StatKey, StatLabels, StatRecord};

/// Built-in stat check prompt.
pub const DEFAULT_UPDATE_PROMPT: &str = "\
Review the latest story events and report any changes to the player character.

Current state:
- {{levelLabel}}: {{level}}
- {{experienceLabel}}: {{experience}}
- {{healthLabel}}: {{health}} / {{maxHealthLabel}}: {{maxHealth}}
- Location: {{location}}
- Inventory: {{inventory}}

Only report fields that changed. Inventory must be the complete new list.";

/// Substitute `{{token}}` placeholders in one pass.
///
/// Stat keys render their value, `<key>Label` renders the label,
/// `location` and `inventory` render the text fields. Unknown tokens and an
/// unterminated `{{` are kept as written.
pub fn render_prompt(template: &str, record: &StatRecord, labels: &StatLabels) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        match resolve(after[..end].trim(), record, labels) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn resolve(token: &str, record: &StatRecord, labels: &StatLabels) -> Option<String> {
    match token {
        "location" => return Some(record.location.clone()),
        "inventory" => return Some(record.inventory_text()),
        _ => {}
    }

    if let Some(key) = token.strip_suffix("Label").and_then(StatKey::parse) {
        return Some(labels.get(key).to_string());
    }

    StatKey::parse(token).map(|key| record.get(key).to_string())
}
