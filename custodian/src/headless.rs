//! Headless line protocol.
//!
//! - `/stats` prints the stat panel
//! - `/gm` switches to the Game Master
//! - `/set <field> <value>` edits a setting
//! - `/help` and `/quit`
//! - Any other line is a chat message

use custodian_core::{
    parse_edit, Capabilities, EventBus, Extension, ExtensionConfig, ExtensionOutput, HostEvent,
    StatKey, DEFAULT_EVENT_CAPACITY,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
  /stats               - Show the stat panel
  /gm                  - Switch to the Game Master
  /set <field> <value> - Edit a setting (enabled, frequency, level, health,
                         maxHealth, experience, <stat>Label, location,
                         inventory, prompt, panel x,y, reset stats|all)
  /help                - Show this help
  /quit                - Save and exit
  (anything else counts as a chat message)";

/// One parsed input line.
#[derive(Debug, PartialEq)]
pub enum Input {
    Event(HostEvent),
    Help,
    Quit,
    Invalid(String),
    Empty,
}

/// Parse one line of the protocol.
pub fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Event(HostEvent::MessageReceived);
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((command, ""));

    match name {
        "quit" | "exit" => Input::Quit,
        "help" => Input::Help,
        "gm" => Input::Event(HostEvent::SwitchToGameMaster),
        "set" => {
            let (field, value) = rest
                .split_once(char::is_whitespace)
                .map(|(field, value)| (field, value.trim()))
                .unwrap_or((rest, ""));
            match parse_edit(field, value) {
                Some(edit) => Input::Event(HostEvent::SettingsEdited(edit)),
                None => Input::Invalid(format!("Cannot set '{field}' to '{value}'")),
            }
        }
        _ => Input::Event(HostEvent::CommandInvoked {
            name: name.to_string(),
        }),
    }
}

/// Render one extension output for stdout.
pub fn format_output(output: &ExtensionOutput) -> String {
    match output {
        ExtensionOutput::Panel(panel) => format!("[PANEL]\n{}", panel.trim_end()),
        ExtensionOutput::StatsChanged { record, labels } => {
            let stats = StatKey::ALL
                .iter()
                .map(|&key| format!("{} {}", labels.get(key), record.get(key)))
                .collect::<Vec<_>>()
                .join(" | ");
            let inventory = if record.inventory.is_empty() {
                "(empty)".to_string()
            } else {
                record.inventory_text()
            };
            format!("[STATS] {stats} | {} | {inventory}", record.location)
        }
        ExtensionOutput::Notice(text) => format!("[NOTICE] {text}"),
    }
}

/// Run the extension against stdin until `/quit` or end of input.
pub async fn run_headless(
    caps: Capabilities,
    config: ExtensionConfig,
) -> Result<(), std::io::Error> {
    let (extension, mut outputs) = Extension::start(caps, config).await;

    let (bus, events) = EventBus::channel(DEFAULT_EVENT_CAPACITY);
    let runner = tokio::spawn(extension.run(events));

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(output) = outputs.recv().await {
            println!("{}", format_output(&output));
            stdout.flush().ok();
        }
    });

    println!("=== RPG Custodian ===");
    println!("{HELP}");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Help => println!("[HELP]\n{HELP}"),
            Input::Invalid(message) => println!("[NOTICE] {message}"),
            Input::Event(event) => {
                bus.emit(event).await;
            }
        }
    }

    bus.emit(HostEvent::Shutdown).await;
    if let Err(e) = runner.await {
        eprintln!("Extension task failed: {e}");
    }
    printer.await.ok();
    println!("Goodbye!");
    Ok(())
}
