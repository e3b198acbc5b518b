//! Command-line interface for recap.
//!
//! Provides commands for playing reminder categories, fetching and ingesting
//! catalogs, and inspecting stored items and playback progress.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::feed;
use crate::progress::ProgressLedger;
use crate::scheduler::{ConsoleSink, Scheduler, StartOutcome};
use crate::store::Store;

/// recap - persistent reminder playback engine
#[derive(Parser, Debug)]
#[command(name = "recap")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resume stored playback and run until interrupted
    Play {
        /// Also start this category
        category: Option<String>,

        /// Show the first item immediately instead of after one interval
        #[arg(long)]
        immediate: bool,

        /// Override the interval between items (seconds)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Fetch a catalog from an HTTP feed and ingest it
    Fetch {
        /// Feed URL (falls back to the configured feed_url)
        url: Option<String>,
    },

    /// Ingest a catalog from a local JSON file
    Ingest {
        /// Path to a feed-format JSON file
        file: PathBuf,
    },

    /// List ingested categories
    Categories,

    /// List the items of a category in playback order
    Items {
        /// Category name
        category: String,
    },

    /// Show recorded playback progress per category
    Progress,

    /// Cancel a category's playback progress so it starts over
    Reset {
        /// Category name
        category: String,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = Config::load()?;

        match self.command {
            Commands::Play {
                category,
                immediate,
                interval_secs,
            } => play(&config, category, immediate, interval_secs).await,
            Commands::Fetch { url } => fetch(&config, url).await,
            Commands::Ingest { file } => ingest_file(&config, &file).await,
            Commands::Categories => list_categories(&config),
            Commands::Items { category } => list_items(&config, &category),
            Commands::Progress => show_progress(&config),
            Commands::Reset { category } => reset(&config, &category).await,
            Commands::Config => show_config(&config),
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<Store>> {
    config.ensure_home()?;
    let store = Store::open(&config.db_path)
        .with_context(|| format!("failed to open database: {}", config.db_path.display()))?;
    Ok(Arc::new(store))
}

async fn play(
    config: &Config,
    category: Option<String>,
    immediate: bool,
    interval_secs: Option<u64>,
) -> Result<()> {
    let store = open_store(config)?;
    let interval = interval_secs
        .map(Duration::from_secs)
        .unwrap_or(config.interval);

    let scheduler = Scheduler::new(
        Catalog::new(Arc::clone(&store)),
        ProgressLedger::new(Arc::clone(&store)),
        Arc::new(ConsoleSink),
        interval,
    );

    let resumed = scheduler.resume_all().await?;
    if !resumed.is_empty() {
        info!(categories = ?resumed, "resumed in-progress playback");
    }

    if let Some(category) = category {
        match scheduler.start(&category, immediate).await? {
            StartOutcome::Started { remaining } => {
                info!(%category, remaining, "started playback");
            }
            StartOutcome::AlreadyRunning => println!("{category} is already playing"),
            StartOutcome::NoItems => println!("{category} has no items"),
            StartOutcome::Finished => {
                println!("{category} has already been played; run `recap reset {category}` to replay")
            }
        }
    }

    if scheduler.active_categories().await.is_empty() {
        println!("nothing to play");
        return Ok(());
    }

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for interrupt signal")?;
                info!("shutting down, progress is preserved");
                scheduler.shutdown().await;
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if scheduler.active_categories().await.is_empty() {
                    info!("all categories played");
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn fetch(config: &Config, url: Option<String>) -> Result<()> {
    let url = match url.or_else(|| config.feed_url.clone()) {
        Some(url) => url,
        None => bail!("no feed URL given and none configured"),
    };

    let categories = feed::fetch_catalog(&url)
        .await
        .with_context(|| format!("failed to fetch catalog from {url}"))?;

    let store = open_store(config)?;
    let report = Catalog::new(store).ingest(&categories)?;

    println!(
        "ingested {} items across {} categories",
        report.items, report.categories
    );
    for failed in &report.failed {
        println!("failed to ingest category: {failed}");
    }
    Ok(())
}

async fn ingest_file(config: &Config, file: &PathBuf) -> Result<()> {
    let categories = feed::read_catalog_file(file)
        .await
        .with_context(|| format!("failed to read catalog file: {}", file.display()))?;

    let store = open_store(config)?;
    let report = Catalog::new(store).ingest(&categories)?;

    println!(
        "ingested {} items across {} categories",
        report.items, report.categories
    );
    for failed in &report.failed {
        println!("failed to ingest category: {failed}");
    }
    Ok(())
}

fn list_categories(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let catalog = Catalog::new(store);

    let categories = catalog.list_categories()?;
    if categories.is_empty() {
        println!("no categories ingested yet");
        return Ok(());
    }
    for name in categories {
        let count = catalog.items_of(&name).map(|items| items.len()).unwrap_or(0);
        println!("{name} ({count} items)");
    }
    Ok(())
}

fn list_items(config: &Config, category: &str) -> Result<()> {
    let store = open_store(config)?;
    let items = Catalog::new(store).items_of(category)?;

    for (index, item) in items.iter().enumerate() {
        println!("{index}: {} [{}] ({} bytes)", item.name, item.kind, item.content.len());
    }
    Ok(())
}

fn show_progress(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let progress = ProgressLedger::new(store).all()?;

    if progress.is_empty() {
        println!("no playback progress recorded");
        return Ok(());
    }
    let mut entries: Vec<(String, u32)> = progress.into_iter().collect();
    entries.sort();
    for (category, index) in entries {
        println!("{category}: last played index {index}");
    }
    Ok(())
}

async fn reset(config: &Config, category: &str) -> Result<()> {
    let store = open_store(config)?;
    let scheduler = Scheduler::new(
        Catalog::new(Arc::clone(&store)),
        ProgressLedger::new(store),
        Arc::new(ConsoleSink),
        config.interval,
    );

    scheduler.cancel(category).await?;
    println!("progress cleared for {category}");
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    println!("home:      {}", config.home.display());
    println!("database:  {}", config.db_path.display());
    println!("interval:  {}s", config.interval.as_secs());
    match &config.feed_url {
        Some(url) => println!("feed_url:  {url}"),
        None => println!("feed_url:  (not set)"),
    }
    Ok(())
}
