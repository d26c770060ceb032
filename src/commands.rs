use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::assistant::CourseAssistant;
use crate::catalog::{load_catalog, load_course_records};
use crate::chunking::build_chunks;
use crate::config::Config;
use crate::database::{CourseIndex, InsertOutcome};
use crate::provider::{ChatModel, Embedder, ProviderClient};
use crate::stats::CatalogStats;
use crate::stdio::Reply;

/// Read `config.toml` and overlay the environment, without validating.
///
/// Commands that talk to the provider validate afterwards; the offline ones
/// (`stats`, `courses`, `config`) work without credentials.
#[inline]
pub fn load_config(config_dir: Option<&Path>) -> Result<Config> {
    match config_dir {
        Some(dir) => Config::load(dir),
        None => Config::load(Config::config_dir()?),
    }
}

fn provider_clients(config: &Config) -> Result<(Arc<dyn Embedder>, Arc<dyn ChatModel>)> {
    config
        .validate()
        .context("Configuration validation failed")?;

    let client = Arc::new(ProviderClient::new(&config.provider)?);
    let embedder = Arc::clone(&client) as Arc<dyn Embedder>;
    let chat: Arc<dyn ChatModel> = client;
    Ok((embedder, chat))
}

/// Run the HTTP server until it stops or startup fails.
#[inline]
pub async fn serve_http(mut config: Config, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    let (embedder, chat) = provider_clients(&config)?;

    crate::server::serve(&config, embedder, chat).await?;
    Ok(())
}

/// Answer JSON lines from stdin until EOF.
#[inline]
pub async fn serve_stdio(config: &Config) -> Result<()> {
    let (embedder, chat) = provider_clients(config)?;
    crate::stdio::serve_stdio(config, embedder, chat).await?;
    Ok(())
}

/// Answer one question and print the reply as a JSON line.
#[inline]
pub async fn ask(config: &Config, question: &str) -> Result<()> {
    let (embedder, chat) = provider_clients(config)?;
    let assistant = CourseAssistant::initialize(config, embedder, chat).await?;

    let reply = Reply::from(assistant.query(question).await);
    println!("{}", serde_json::to_string(&reply)?);
    Ok(())
}

/// Ingest the catalog into the vector index, optionally starting from empty.
#[inline]
pub async fn build_index(config: &Config, rebuild: bool) -> Result<()> {
    let (embedder, _chat) = provider_clients(config)?;

    let records = load_course_records(config.catalog_path())?;
    let chunks = build_chunks(&records);

    let mut index = CourseIndex::open_or_create(config, embedder).await?;
    if rebuild {
        info!("Dropping existing index before ingestion");
        index.rebuild().await?;
    }

    match index.insert_if_empty(&chunks).await? {
        InsertOutcome::Inserted(n) => println!("Indexed {} courses", n),
        InsertOutcome::Skipped(n) => {
            println!("Index already holds {} entries, nothing to do", n);
            println!("Run with --rebuild to re-embed the catalog");
        }
    }
    println!("Collection: {}", index.table_name());
    println!("Location: {}", index.path().display());
    Ok(())
}

/// Print the catalog overview block.
#[inline]
pub fn show_stats(config: &Config) -> Result<()> {
    let records = load_course_records(config.catalog_path())?;
    let stats = CatalogStats::from_chunks(&build_chunks(&records));
    print!("{}", stats);
    Ok(())
}

/// Print every catalog row as JSON.
#[inline]
pub fn list_courses(config: &Config) -> Result<()> {
    let rows = load_catalog(config.catalog_path())?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

/// Print the effective configuration with the API key masked.
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    println!("Configuration file: {}", config.config_file_path().display());
    println!();
    print!("{}", config.redacted()?);
    Ok(())
}
