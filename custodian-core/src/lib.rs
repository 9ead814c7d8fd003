//! Stat tracking and Game Master bootstrap for chat roleplay hosts.
//!
//! This crate provides:
//! - A player character stat record with lenient patch merging
//! - A message-count cadence that decides when to ask a model for changes
//! - Debounced settings persistence
//! - Game Master persona creation against the host's character repository
//!
//! # Quick Start
//!
//! ```ignore
//! use custodian_core::{Capabilities, EventBus, Extension, ExtensionConfig, HostEvent};
//! use custodian_core::DEFAULT_EVENT_CAPACITY;
//! use custodian_core::{DisabledChecker, JsonFileStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let caps = Capabilities {
//!         store: Arc::new(JsonFileStore::new("settings.json")),
//!         personas: None,
//!         checker: Arc::new(DisabledChecker),
//!     };
//!     let (extension, mut outputs) = Extension::start(caps, ExtensionConfig::default()).await;
//!
//!     let (bus, events) = EventBus::channel(DEFAULT_EVENT_CAPACITY);
//!     let task = tokio::spawn(extension.run(events));
//!
//!     bus.emit(HostEvent::CommandInvoked { name: "stats".into() }).await;
//!     println!("{:?}", outputs.recv().await);
//!
//!     bus.emit(HostEvent::Shutdown).await;
//!     task.await.ok();
//! }
//! ```

pub mod cadence;
pub mod checker;
pub mod commands;
pub mod debounce;
pub mod events;
pub mod extension;
pub mod persist;
pub mod persona;
pub mod prompt;
pub mod settings;
pub mod stats;
pub mod testing;
pub mod tracker;

// Re-export for convenience
pub use custodian_macros::Tool;

// Primary public API
pub use checker::{CheckError, CheckerConfig, ClaudeStatChecker, DisabledChecker, StatChecker};
pub use events::{EventBus, EventReceiver, ExtensionOutput, HostEvent, DEFAULT_EVENT_CAPACITY};
pub use extension::{Capabilities, Extension, ExtensionConfig};
pub use persist::{JsonFileStore, PersistError, SettingsStore};
pub use persona::{HttpPersonaRepository, PersonaError, PersonaRepository, PersonaTemplate};
pub use settings::{parse_edit, Settings, SettingsEdit};
pub use stats::{StatKey, StatLabels, StatPatch, StatRecord};
pub use testing::{MemoryStore, MockChecker, MockPersonaRepository};
pub use tracker::StatTracker;

#[cfg(test)]
mod tests {
    use super::*;

    /// Move the party to a new place
    #[derive(Tool)]
    #[tool(name = "travel")]
    #[allow(dead_code)]
    struct Travel {
        /// Where the party goes
        destination: String,
        /// Days on the road
        #[tool(optional)]
        days: u32,
        /// Companions along for the trip
        companions: Option<Vec<String>>,
    }

    #[test]
    fn test_tool_derive() {
        assert_eq!(Travel::tool_name(), "travel");
        assert_eq!(Travel::tool_description(), "Move the party to a new place");
    }

    #[test]
    fn test_tool_schema() {
        let schema = Travel::input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["destination"]["type"], "string");
        assert_eq!(schema["properties"]["days"]["type"], "integer");
        assert_eq!(schema["properties"]["companions"]["type"], "array");

        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "destination");
    }

    #[test]
    fn test_as_tool() {
        let tool = Travel::as_tool();
        assert_eq!(tool.name, "travel");
        assert_eq!(tool.input_schema["properties"]["days"]["description"], "Days on the road");
    }
}
