// This is the entry point of the moderation pipeline.
//
// **Architecture Overview:**
// - `core/` = Business logic (store- and transport-agnostic)
// - `infra/` = Implementations of core traits (SQLite store, webhook topic)
//
// One process run = one pipeline invocation: read a trigger payload (file
// argument or stdin), route it through the orchestrator, and print the
// structured run result as JSON. The external scheduler decides how often
// and with which triggers to invoke us; we hold no state between runs.

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with a pile of mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::{ModerationService, PipelineConfig, PolicyEvaluator};
use crate::infra::dispatch::WebhookDispatcher;
use crate::infra::store::SqliteRecordStore;
use anyhow::Context;
use std::io::Read;
use std::time::Duration;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Trigger payload comes from a file path argument, or stdin when invoked
/// without one (handy for piping test payloads).
fn read_trigger() -> anyhow::Result<serde_json::Value> {
    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read trigger file {path}"))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read trigger from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("trigger payload is not valid JSON")
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let topic = std::env::var("NOTIFICATION_TOPIC")
        .expect("Missing NOTIFICATION_TOPIC environment variable!");
    let table = std::env::var("STORE_TABLE_NAME")
        .expect("Missing STORE_TABLE_NAME environment variable!");
    let database_url = std::env::var("STORE_DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://data/records.db?mode=rwc".to_string());
    let severity_threshold = env_u64(
        "POLICY_SEVERITY_THRESHOLD",
        crate::core::moderation::DEFAULT_SEVERITY_THRESHOLD as u64,
    ) as u32;

    let config = PipelineConfig {
        max_pages_per_run: env_u64("MODERATION_MAX_PAGES_PER_RUN", 10) as usize,
        call_timeout: Duration::from_secs(env_u64("MODERATION_CALL_TIMEOUT_SECS", 10)),
        run_deadline: Duration::from_secs(env_u64("MODERATION_RUN_DEADLINE_SECS", 60)),
        ..PipelineConfig::default()
    };

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Wire the concrete store and dispatcher into the orchestrator here, at
    // the composition root. Nothing below main reads the environment.

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&database_url)
        .await
        .expect("Failed to connect to the record store");
    let store = SqliteRecordStore::new(pool, &table).expect("Invalid STORE_TABLE_NAME");
    // Idempotent create-if-missing so a fresh local environment starts clean.
    store
        .migrate()
        .await
        .expect("Failed to prepare the record store");

    let dispatcher = WebhookDispatcher::new(topic);
    let policy = PolicyEvaluator::with_default_rules(severity_threshold);
    let service = ModerationService::new(store, dispatcher, policy, config);

    let trigger = match read_trigger() {
        Ok(trigger) => trigger,
        Err(err) => {
            tracing::error!("rejected invocation: {err:#}");
            std::process::exit(1);
        }
    };

    match service.handle(&trigger).await {
        Ok(result) => {
            let json = serde_json::to_string_pretty(&result)
                .expect("Failed to serialize run result");
            println!("{json}");
            if result.degraded {
                tracing::warn!("run degraded: every alert publish failed permanently");
            }
        }
        Err(err) => {
            // InvalidTrigger is the only condition with no partial result.
            tracing::error!("rejected invocation: {err}");
            std::process::exit(1);
        }
    }
}
