//! Loads the configured knowledge source into the vector store without
//! starting the HTTP server.
//!
//! Usage: `ingest [--refresh]`. Without `--refresh` the configured ingest
//! mode applies.

use anyhow::Result;
use std::env;

use counsel_chat::config::{load_config, validate_config, IngestMode};
use counsel_chat::initialization::{build_embedder, build_store, ingest_knowledge};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let refresh = match args.as_slice() {
        [] => false,
        [flag] if flag == "--refresh" => true,
        _ => {
            eprintln!("Usage: ingest [--refresh]");
            std::process::exit(2);
        }
    };

    let config = load_config()?;
    validate_config(&config)?;
    let mode = if refresh { IngestMode::Refresh } else { config.knowledge.ingest_mode };

    let embedder = build_embedder(&config).await?;
    let store = build_store(&config)?;
    let report = ingest_knowledge(&config, embedder, store, mode).await?;

    if report.skipped {
        println!("Collection '{}' already populated; pass --refresh to re-ingest.", config.store.collection);
    } else {
        println!(
            "Ingested {} chunks from {} documents into '{}'.",
            report.chunks, report.documents, config.store.collection
        );
    }
    Ok(())
}
