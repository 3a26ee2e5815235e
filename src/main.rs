use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use garx::config::{Settings, DEFAULT_CONFIG_FILE};
use garx::layers::completion::CompletionClient;
use garx::layers::discovery::ArxivClient;
use garx::shell::Shell;

#[derive(Parser)]
#[command(name = "garx", about = "Search arXiv and talk to papers from the terminal")]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session (default)
    Shell,
    /// Print search results and exit
    Search {
        query: Vec<String>,
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Polish a piece of text with the configured model
    Polish { text: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 0. Load Configuration
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Arc::new(Settings::load(&cli.config)?);
    tracing::debug!("Loaded settings: {:?}", settings);

    match cli.command.unwrap_or(Command::Shell) {
        Command::Shell => Shell::new(settings)?.run().await?,
        Command::Search { query, max_results } => {
            let client = ArxivClient::new(&settings.arxiv)?;
            let max = max_results.unwrap_or(settings.arxiv.max_results);
            let papers = client.search(&query.join(" "), max).await?;
            if papers.is_empty() {
                println!("No papers found.");
            }
            for (i, paper) in papers.iter().enumerate() {
                println!("[{}] {}", i + 1, paper.headline());
                println!("    PDF: {}", paper.pdf_url);
            }
        }
        Command::Polish { text } => {
            let client = CompletionClient::from_settings(&settings)?;
            println!("{}", client.polish(&text.join(" ")).await?);
        }
    }

    Ok(())
}
