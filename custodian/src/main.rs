//! RPG custodian headless driver.
//!
//! Stands in for the chat host: reads chat messages and commands from
//! stdin, feeds them to the extension and prints what it shows.
//!
//! ```bash
//! cargo run -p custodian -- --server http://127.0.0.1:8000 --settings ./settings.json
//! ```

mod headless;

use clap::Parser;
use custodian_core::checker::CheckerConfig;
use custodian_core::persist::default_settings_path;
use custodian_core::{
    Capabilities, ClaudeStatChecker, DisabledChecker, ExtensionConfig, HttpPersonaRepository,
    JsonFileStore, PersonaRepository, StatChecker,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "custodian")]
#[command(author, version, about = "Track roleplay character stats and keep a Game Master persona around")]
struct Args {
    /// Settings file
    #[arg(long, env = "CUSTODIAN_SETTINGS")]
    settings: Option<PathBuf>,

    /// Base URL of the SillyTavern server (persona features are off without it)
    #[arg(long, env = "SILLYTAVERN_URL")]
    server: Option<String>,

    /// CSRF token sent with SillyTavern requests
    #[arg(long, env = "SILLYTAVERN_CSRF")]
    csrf_token: Option<String>,

    /// Game Master character card to use instead of the bundled one
    #[arg(long)]
    template: Option<PathBuf>,

    /// Model used for stat checks
    #[arg(long)]
    model: Option<String>,

    /// Quiet time in milliseconds before settings are written
    #[arg(long, default_value_t = 1000)]
    save_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays the line protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    info!(path = %settings_path.display(), "using settings file");

    let personas = args.server.as_ref().map(|server| {
        let mut repo = HttpPersonaRepository::new(server.as_str());
        if let Some(token) = &args.csrf_token {
            repo = repo.with_csrf_token(token.as_str());
        }
        Arc::new(repo) as Arc<dyn PersonaRepository>
    });
    if personas.is_none() {
        warn!("no SillyTavern server configured; Game Master features disabled");
    }

    let caps = Capabilities {
        store: Arc::new(JsonFileStore::new(settings_path)),
        personas,
        checker: build_checker(args.model.as_deref()),
    };

    let mut config =
        ExtensionConfig::default().with_save_delay(Duration::from_millis(args.save_delay_ms));
    if let Some(template) = args.template {
        config = config.with_template_path(template);
    }

    headless::run_headless(caps, config).await?;
    Ok(())
}

fn build_checker(model: Option<&str>) -> Arc<dyn StatChecker> {
    match ClaudeStatChecker::from_env() {
        Ok(checker) => {
            let mut config = CheckerConfig::default();
            if let Some(model) = model {
                config = config.with_model(model);
            }
            Arc::new(checker.with_config(config))
        }
        Err(e) => {
            warn!(error = %e, "stat checks disabled");
            Arc::new(DisabledChecker)
        }
    }
}
