use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

use sitepilot::config::PipelineConfig;

#[derive(Parser)]
#[command(name = "sitepilot")]
#[command(version, about = "Pipeline client for AI-driven business website generation")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (default: ./sitepilot.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend REST base URL (overrides config and environment)
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Backend WebSocket base URL (overrides config and environment)
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow an existing pipeline for a business
    Watch {
        /// Business entity id
        business_id: String,
    },
    /// Start the research phase and follow its progress
    Research {
        /// Business entity id
        business_id: String,
    },
    /// Generate a website once research is complete
    Generate {
        /// Business entity id
        business_id: String,
        /// Template id (minimal, modern, elegant, bold)
        #[arg(short, long)]
        template: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sitepilot=debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sitepilot=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from("sitepilot.toml"));
    let mut config = PipelineConfig::load(&config_path)?;
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    if let Some(url) = cli.ws_url {
        config.ws_url = url;
    }

    match cli.command {
        Commands::Watch { business_id } => cmd::cmd_watch(&config, &business_id).await,
        Commands::Research { business_id } => cmd::cmd_research(&config, &business_id).await,
        Commands::Generate {
            business_id,
            template,
        } => cmd::cmd_generate(&config, &business_id, &template).await,
    }
}
