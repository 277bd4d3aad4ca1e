use anyhow::Result;
use log;

use counsel_chat::config;
use counsel_chat::initialization::initialize;
use counsel_chat::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Basic Setup First ---
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
    log::info!("counsel-chat starting.");

    // --- Load Configuration ---
    let config = config::load_config()?;
    log::info!(
        "Configuration loaded: model {}, collection '{}', parser {:?}, ingest mode {:?}",
        config.llm.model,
        config.store.collection,
        config.parser.kind,
        config.knowledge.ingest_mode
    );

    // --- Build the application context (ingestion included) ---
    let context = initialize(config).await.inspect_err(|e| {
        log::error!("Startup failed: {:#}", e);
    })?;

    // --- Serve ---
    let config = context.config.clone();
    server::serve(AppState::from(&context), &config.server).await?;
    Ok(())
}
