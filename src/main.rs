mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use sparkmind::config::SparkConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sparkmind", version, about = "Semantic memory and contextual retrieval for personal thoughts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Overrides `server.transport` from the config file
        #[arg(long, value_enum)]
        transport: Option<Transport>,
    },
    /// Retrieve an owner's content related to a query
    Search {
        #[arg(long)]
        owner: String,
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// insight, collection, or principle
        #[arg(long = "type")]
        content_type: Option<String>,
    },
    /// Classify a thought
    Classify {
        text: String,
        #[arg(long)]
        json: bool,
    },
    /// Recompute and print an owner's profile
    Profile {
        #[arg(long)]
        owner: String,
    },
    /// Index content that is missing or stale in the vector store
    Backfill {
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
    /// Delete behavior events older than the retention window
    Prune {
        #[arg(long)]
        days: Option<i64>,
    },
    /// Check database health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SparkConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter =
        EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = match transport {
                Some(t) => t,
                None if config.server.transport == "http" => Transport::Http,
                None => Transport::Stdio,
            };
            match transport {
                Transport::Stdio => server::serve_stdio(config).await?,
                Transport::Http => server::serve_http(config).await?,
            }
        }
        Command::Search {
            owner,
            query,
            top_k,
            content_type,
        } => {
            cli::search::search(config, &owner, &query, top_k, content_type.as_deref()).await?;
        }
        Command::Classify { text, json } => {
            cli::classify::classify(config, &text, json).await?;
        }
        Command::Profile { owner } => {
            cli::profile::profile(config, &owner).await?;
        }
        Command::Backfill { limit } => {
            cli::maintenance::backfill(config, limit).await?;
        }
        Command::Prune { days } => {
            cli::maintenance::prune(config, days).await?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
    }

    Ok(())
}
