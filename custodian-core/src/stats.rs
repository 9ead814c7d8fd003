//! Character stat record, display labels and partial updates.
//!
//! The stat set is fixed: every [`StatKey`] always has a value in a
//! [`StatRecord`], so a patch can change values but never add or drop keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The fixed set of numeric stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatKey {
    Level,
    Experience,
    Health,
    MaxHealth,
}

impl StatKey {
    /// All keys in display order.
    pub const ALL: [StatKey; 4] = [
        StatKey::Level,
        StatKey::Experience,
        StatKey::Health,
        StatKey::MaxHealth,
    ];

    /// Key as it appears in settings JSON and prompt tokens.
    pub fn as_str(self) -> &'static str {
        match self {
            StatKey::Level => "level",
            StatKey::Experience => "experience",
            StatKey::Health => "health",
            StatKey::MaxHealth => "maxHealth",
        }
    }

    /// Parse a key, accepting the snake_case spelling of `maxHealth`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "level" => Some(StatKey::Level),
            "experience" => Some(StatKey::Experience),
            "health" => Some(StatKey::Health),
            "maxHealth" | "max_health" => Some(StatKey::MaxHealth),
            _ => None,
        }
    }

    /// Built-in display label.
    pub fn default_label(self) -> &'static str {
        match self {
            StatKey::Level => "Level",
            StatKey::Experience => "Experience",
            StatKey::Health => "Health",
            StatKey::MaxHealth => "Max Health",
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The live character state.
///
/// [`Default`] seeds a fresh character. When reading stored JSON, a missing
/// stat reads as 0 instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatRecord {
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub experience: i64,
    #[serde(default)]
    pub health: i64,
    #[serde(default, alias = "max_health")]
    pub max_health: i64,

    /// Free-form current location.
    #[serde(default = "unknown_location")]
    pub location: String,

    /// Items in display order. Duplicates are allowed.
    #[serde(default)]
    pub inventory: Vec<String>,
}

fn unknown_location() -> String {
    "Unknown".to_string()
}

impl Default for StatRecord {
    fn default() -> Self {
        Self {
            level: 1,
            experience: 0,
            health: 100,
            max_health: 100,
            location: unknown_location(),
            inventory: Vec::new(),
        }
    }
}

impl StatRecord {
    /// Read a stat value.
    pub fn get(&self, key: StatKey) -> i64 {
        match key {
            StatKey::Level => self.level,
            StatKey::Experience => self.experience,
            StatKey::Health => self.health,
            StatKey::MaxHealth => self.max_health,
        }
    }

    /// Overwrite a stat value.
    pub fn set(&mut self, key: StatKey, value: i64) {
        match key {
            StatKey::Level => self.level = value,
            StatKey::Experience => self.experience = value,
            StatKey::Health => self.health = value,
            StatKey::MaxHealth => self.max_health = value,
        }
    }

    /// Inventory joined for display and prompts.
    pub fn inventory_text(&self) -> String {
        self.inventory.join(", ")
    }
}

/// Display labels for each stat key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatLabels {
    pub level: String,
    pub experience: String,
    pub health: String,
    #[serde(alias = "max_health")]
    pub max_health: String,
}

impl Default for StatLabels {
    fn default() -> Self {
        Self {
            level: StatKey::Level.default_label().to_string(),
            experience: StatKey::Experience.default_label().to_string(),
            health: StatKey::Health.default_label().to_string(),
            max_health: StatKey::MaxHealth.default_label().to_string(),
        }
    }
}

impl StatLabels {
    pub fn get(&self, key: StatKey) -> &str {
        match key {
            StatKey::Level => &self.level,
            StatKey::Experience => &self.experience,
            StatKey::Health => &self.health,
            StatKey::MaxHealth => &self.max_health,
        }
    }

    /// Set a label. Blank text restores the built-in label.
    pub fn set(&mut self, key: StatKey, label: impl Into<String>) {
        let label = label.into();
        let label = if label.trim().is_empty() {
            key.default_label().to_string()
        } else {
            label.trim().to_string()
        };
        match key {
            StatKey::Level => self.level = label,
            StatKey::Experience => self.experience = label,
            StatKey::Health => self.health = label,
            StatKey::MaxHealth => self.max_health = label,
        }
    }
}

/// A partial update to a [`StatRecord`].
///
/// Values are kept as raw JSON so numeric coercion can fall back to the
/// current value instead of failing the whole patch. Unknown keys in the
/// source JSON are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_health: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Value>,
}

impl StatPatch {
    /// Build a patch from any JSON value. Non-objects yield an empty patch.
    ///
    /// Keys are read one at a time, so a bad or repeated key never discards
    /// the others. `null` counts as absent. When both `maxHealth` and
    /// `max_health` appear, `maxHealth` wins.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };

        let mut patch = Self::default();
        for (name, value) in map {
            if value.is_null() {
                continue;
            }
            match name.as_str() {
                "location" => patch.location = Some(value),
                "inventory" => patch.inventory = Some(value),
                _ => {
                    let Some(key) = StatKey::parse(&name) else {
                        continue;
                    };
                    if name == key.as_str() || patch.stat(key).is_none() {
                        patch = patch.with_stat(key, value);
                    }
                }
            }
        }
        patch
    }

    /// Raw value for a stat key, if present.
    pub fn stat(&self, key: StatKey) -> Option<&Value> {
        match key {
            StatKey::Level => self.level.as_ref(),
            StatKey::Experience => self.experience.as_ref(),
            StatKey::Health => self.health.as_ref(),
            StatKey::MaxHealth => self.max_health.as_ref(),
        }
    }

    /// Set a raw stat value.
    pub fn with_stat(mut self, key: StatKey, value: impl Into<Value>) -> Self {
        let slot = match key {
            StatKey::Level => &mut self.level,
            StatKey::Experience => &mut self.experience,
            StatKey::Health => &mut self.health,
            StatKey::MaxHealth => &mut self.max_health,
        };
        *slot = Some(value.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(Value::String(location.into()));
        self
    }

    pub fn with_inventory<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inventory = Some(Value::Array(
            items.into_iter().map(|s| Value::String(s.into())).collect(),
        ));
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Merge a patch into a record and return the result.
///
/// Only fields present in the patch change. `location` and `inventory`
/// replace wholesale. Numeric values that cannot be coerced keep the
/// current value.
pub fn apply_patch(current: &StatRecord, patch: &StatPatch) -> StatRecord {
    let mut next = current.clone();

    for key in StatKey::ALL {
        if let Some(raw) = patch.stat(key) {
            next.set(key, coerce_int(raw, current.get(key)));
        }
    }

    if let Some(location) = patch.location.as_ref().and_then(coerce_text) {
        next.location = location;
    }

    if let Some(inventory) = patch.inventory.as_ref().and_then(coerce_items) {
        next.inventory = inventory;
    }

    next
}

/// Coerce a JSON value to an integer, or return `fallback`.
pub fn coerce_int(value: &Value, fallback: i64) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(truncate_float))
            .unwrap_or(fallback),
        Value::String(s) => parse_int_text(s).unwrap_or(fallback),
        _ => fallback,
    }
}

/// Parse editor text as an integer: plain integers, or finite decimals
/// truncated toward zero. Trailing garbage is rejected.
pub fn parse_int_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(truncate_float))
}

fn truncate_float(f: f64) -> Option<i64> {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_items(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        Value::String(s) => Some(split_items(s)),
        _ => None,
    }
}

/// Split comma-joined inventory text into items.
pub fn split_items(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
