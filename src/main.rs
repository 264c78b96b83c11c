use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use recado::capture::{CaptureStore, MediaRecord, MessageRecord};
use recado::cli::{clean, ingest, process, stats, zone};
use recado::collab::{ChatExtractor, CopyUploader, JsonlRowStore};
use recado::config::Config;
use recado::processor::PhasedProcessor;
use recado::strategy::{media_strategy, Dispatcher};
use recado::zones::ZoneRegistry;

#[derive(Parser)]
#[command(name = "recado")]
#[command(about = "Group message capture and phased processing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "recado.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show capture statistics and zone state
    Stats,

    /// Run the processing pipeline over pending records
    Process {
        /// Process only the N oldest pending messages instead of full phases
        #[arg(long)]
        batch: Option<usize>,

        /// Run a single phase (zone-config, schedule, zone-data, media)
        #[arg(long)]
        only: Option<String>,
    },

    /// Append captured events from a JSON file
    Ingest {
        /// Path to a JSON array of events
        file: String,
    },

    /// Show the effective settings and zone configuration state
    Config,

    /// Zone management
    Zone {
        #[command(subcommand)]
        command: ZoneCommands,
    },

    /// Wipe all captured data and zone configuration (backups are taken)
    Clean {
        /// Must be the literal word CONFIRM
        confirmation: String,
    },
}

#[derive(Subcommand)]
enum ZoneCommands {
    /// Show all zone slots
    Show,
    /// Configure a zone slot (1-3) with a name
    Set {
        slot: u8,
        name: String,
    },
    /// Deactivate all zones
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recado=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).unwrap_or_default();

    let messages: CaptureStore<MessageRecord> =
        CaptureStore::new(config.messages_path(), config.backup_dir());
    let media: CaptureStore<MediaRecord> =
        CaptureStore::new(config.media_path(), config.backup_dir());
    let registry = ZoneRegistry::new(config.zones_path());

    match cli.command {
        Commands::Stats => {
            stats::run(&messages, &media, &registry)?;
        }
        Commands::Process { batch, only } => {
            let phase = only.as_deref().map(process::parse_phase).transpose()?;
            let processor = build_processor(&config, messages, media, registry)?;
            process::run(&processor, batch, phase).await?;
        }
        Commands::Ingest { file } => {
            ingest::run(&messages, &media, std::path::Path::new(&file))?;
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
            println!();
            zone::show(&registry)?;
        }
        Commands::Zone { command } => match command {
            ZoneCommands::Show => zone::show(&registry)?,
            ZoneCommands::Set { slot, name } => zone::set(&registry, slot, &name)?,
            ZoneCommands::Reset => zone::reset(&registry)?,
        },
        Commands::Clean { confirmation } => {
            clean::run(
                &confirmation,
                &messages,
                &media,
                &registry,
                &config.media_dir(),
                &config.backup_dir(),
            )?;
        }
    }

    Ok(())
}

/// The extractor needs an API key, so it is only built for `process`.
fn build_processor(
    config: &Config,
    messages: CaptureStore<MessageRecord>,
    media: CaptureStore<MediaRecord>,
    registry: ZoneRegistry,
) -> Result<PhasedProcessor> {
    let key_env = &config.extractor.api_key_env;
    let Ok(api_key) = std::env::var(key_env) else {
        bail!("environment variable {key_env} is not set; the extraction service needs it");
    };

    let extractor = Arc::new(ChatExtractor::new(config.extractor_settings(api_key))?);
    let rows = Arc::new(JsonlRowStore::new(config.rows_dir()));
    let uploader = Arc::new(CopyUploader::new(config.uploads_dir()));

    let dispatcher = Dispatcher::new(registry.clone(), extractor, rows);
    Ok(PhasedProcessor::new(
        messages,
        media,
        registry.clone(),
        dispatcher,
        media_strategy(registry, uploader),
        config.delays(),
        config.processing.batch_size,
    ))
}
