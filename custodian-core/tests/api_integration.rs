//! Integration tests that call the real Claude API.
//!
//! These tests require ANTHROPIC_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p custodian-core --test api_integration -- --ignored`

use custodian_core::{CheckerConfig, ClaudeStatChecker, StatChecker, StatKey, StatRecord};
use custodian_core::stats::apply_patch;

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_checker_reports_damage_and_travel() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let checker = ClaudeStatChecker::from_env()
        .expect("Failed to create checker")
        .with_config(CheckerConfig::default().with_max_tokens(256));

    let prompt = "\
Story so far: The goblin's arrow strikes you for 15 damage. Wounded, you \
limp out of the Whispering Woods and into the village of Brookhollow, \
where you sell your old shield.

Current state:
- Level: 2
- Experience: 40
- Health: 50 / Max Health: 50
- Location: Whispering Woods
- Inventory: sword, shield, rations

Only report fields that changed. Inventory must be the complete new list.";

    let patch = checker.check(prompt).await.expect("Check failed");
    println!("Patch: {patch:?}");

    let before = StatRecord {
        level: 2,
        experience: 40,
        health: 50,
        max_health: 50,
        location: "Whispering Woods".to_string(),
        inventory: vec!["sword".into(), "shield".into(), "rations".into()],
    };
    let after = apply_patch(&before, &patch);

    assert_eq!(after.get(StatKey::Health), 35, "health should drop by 15");
    assert!(after.location.contains("Brookhollow"));
    assert!(!after.inventory.iter().any(|item| item.to_lowercase().contains("shield")));
}
