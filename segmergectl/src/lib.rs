use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;
use thiserror::Error;

use segmerge_core::{load_segmerge_config, SegmergeConfig};

mod commands;

pub use commands::cache::{CacheCommands, CacheListing};
pub use commands::fetch::{FetchArgs, FetchReport};
pub use commands::health::{CheckStatus, HealthEntry};
pub use commands::merge::{EngineChoice, MergeArgs, MergeReport, ProfileChoice};
pub use commands::plan::{PlanCommands, PlanPreview, PlanShowArgs};

const TOKEN_ENV: &str = "SEGMERGE_TOKEN";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] segmerge_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("plan error: {0}")]
    Plan(#[from] segmerge_core::PlanError),
    #[error("loader error: {0}")]
    Loader(#[from] segmerge_core::LoaderError),
    #[error("merge failed [{}]: {}", .0.code(), .0)]
    Merge(#[from] segmerge_core::MergeError),
    #[error("store error: {0}")]
    Store(#[from] segmerge_core::StoreError),
    #[error("media error: {0}")]
    Media(#[from] segmerge_core::MediaError),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Asana video segment merge control interface", long_about = None)]
pub struct Cli {
    /// Path to segmerge.toml
    #[arg(long, default_value = "configs/segmerge.toml")]
    pub config: PathBuf,
    /// Bearer token for the origin (falls back to SEGMERGE_TOKEN)
    #[arg(long)]
    pub token: Option<String>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Merge every segment of a practice plan into one video
    Merge(MergeArgs),
    /// Download one segment into the content store
    Fetch(FetchArgs),
    /// Inspect the content store
    #[command(subcommand)]
    Cache(CacheCommands),
    /// Inspect a practice plan without downloading anything
    #[command(subcommand)]
    Plan(PlanCommands),
    /// Check external tools and working directories
    Health,
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Resolved configuration shared by every subcommand.
#[derive(Debug)]
pub(crate) struct AppContext {
    pub(crate) config: SegmergeConfig,
    pub(crate) config_path: PathBuf,
    pub(crate) token: Option<String>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_segmerge_config(&cli.config)?;
        let token = cli
            .token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .filter(|token| !token.trim().is_empty());
        Ok(Self {
            config,
            config_path: cli.config.clone(),
            token,
        })
    }

    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        commands::print_completions(*shell);
        return Ok(());
    }

    let context = AppContext::new(&cli)?;
    match &cli.command {
        Commands::Merge(args) => {
            let report = runtime()?.block_on(commands::merge::execute(&context, args))?;
            render(&report, cli.format)?;
        }
        Commands::Fetch(args) => {
            let report = runtime()?.block_on(commands::fetch::execute(&context, args))?;
            render(&report, cli.format)?;
        }
        Commands::Cache(CacheCommands::List) => {
            let listing = commands::cache::list(&context)?;
            render(&listing, cli.format)?;
        }
        Commands::Plan(PlanCommands::Show(args)) => {
            let preview = commands::plan::show(&context, args)?;
            render(&preview, cli.format)?;
        }
        Commands::Health => {
            let report = commands::health::check(&context);
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more health checks failed".to_string(),
                ));
            }
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

pub(crate) trait DisplayFallback {
    fn display(&self) -> String;
}
