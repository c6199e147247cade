use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use cagecard_core::DiscoveryMode;
use cagecard_storage::{EventStore, JsonEventStore};
use cagecard_sync::{ScrapeConfig, ScrapeRequest, SourceRegistry};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cagecard-cli")]
#[command(about = "UFC event card scraper")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Discover, extract and store events.
    Scrape(ScrapeArgs),
    /// Build the fighter registry snapshot, or rebuild it with --refresh.
    Fighters {
        #[arg(long)]
        refresh: bool,
    },
    /// List stored events, newest first.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Print a stored event document.
    Show { event_id: String },
}

#[derive(Debug, Default, Args)]
struct ScrapeArgs {
    /// full, future or historical
    #[arg(long, default_value = "full")]
    mode: DiscoveryMode,
    /// Skip events before this date (YYYY-MM-DD).
    #[arg(long)]
    since: Option<NaiveDate>,
    /// Scrape one event by source id instead of running discovery.
    #[arg(long)]
    event_id: Option<String>,
    /// Requests per second.
    #[arg(long)]
    rate_limit: Option<f64>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl ScrapeArgs {
    /// Layers command-line flags over the environment so derived paths follow `--output-dir`.
    fn config(&self) -> ScrapeConfig {
        let mut overrides = HashMap::new();
        if let Some(rate) = self.rate_limit {
            overrides.insert("CAGECARD_RATE_LIMIT", rate.to_string());
        }
        if let Some(dir) = &self.output_dir {
            overrides.insert("CAGECARD_OUTPUT_DIR", dir.display().to_string());
        }
        ScrapeConfig::from_lookup(|key| {
            overrides
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        })
    }

    fn request(&self) -> ScrapeRequest {
        ScrapeRequest {
            mode: self.mode,
            since: self.since,
            event_id: self.event_id.clone(),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(
                std::env::var("CAGECARD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            )
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Scrape(ScrapeArgs::default())) {
        Commands::Scrape(args) => {
            let config = args.config();
            debug!(?config, "scrape configuration");
            let pipeline = cagecard_sync::pipeline_from_config(config).await?;
            let summary = pipeline.run_once(&args.request()).await?;
            println!(
                "scrape complete: run_id={} sources={} candidates={} stored={} failures={} reports={}",
                summary.run_id,
                summary.sources_consulted.len(),
                summary.candidates,
                summary.events_stored.len(),
                summary.failures.len(),
                summary.reports_dir
            );
        }
        Commands::Fighters { refresh } => {
            let config = ScrapeConfig::from_env();
            config.validate()?;
            let registry = SourceRegistry::load(&config.sources_path()).await?;
            let fetcher = cagecard_sync::http_fetcher(&config)?;
            let fighters = cagecard_sync::load_fighters(&config, &registry, &fetcher, refresh).await?;
            println!(
                "fighter registry: {} fighters in {}",
                fighters.len(),
                config.fighter_snapshot.display()
            );
        }
        Commands::List { limit, offset } => {
            let config = ScrapeConfig::from_env();
            let store = JsonEventStore::new(config.events_dir());
            let events = store.list(limit, offset).await?;
            if events.is_empty() {
                println!("no stored events in {}", store.root().display());
            }
            for event in events {
                println!(
                    "{}  {:<32}  {}  [{} fights, {:?}]",
                    event.event_date,
                    event.event_id,
                    event.event_name,
                    event.fight_count,
                    event.status
                );
            }
        }
        Commands::Show { event_id } => {
            let config = ScrapeConfig::from_env();
            let store = JsonEventStore::new(config.events_dir());
            let event = store
                .get(&event_id)
                .await?
                .with_context(|| format!("event {event_id} is not stored"))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&event).context("serializing event")?
            );
        }
    }

    Ok(())
}
