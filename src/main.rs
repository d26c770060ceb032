use clap::{Parser, Subcommand};
use dandori_rag::Result;
use dandori_rag::commands::{
    ask, build_index, list_courses, load_config, serve_http, serve_stdio, show_config, show_stats,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dandori")]
#[command(about = "Question answering over the School of Dandori course catalog")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the vector index
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port to listen on, overriding config and $PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Answer JSON lines on stdin, one reply per line on stdout
    Stdio,
    /// Ask a single question
    Ask {
        /// The question, as one or more words
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
    /// Embed the catalog into the vector index
    Index {
        /// Drop the existing index first
        #[arg(long)]
        rebuild: bool,
    },
    /// Show catalog overview statistics
    Stats,
    /// Print the course catalog as JSON
    Courses,
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            serve_http(config, port).await?;
        }
        Commands::Stdio => {
            serve_stdio(&config).await?;
        }
        Commands::Ask { words } => {
            ask(&config, &words.join(" ")).await?;
        }
        Commands::Index { rebuild } => {
            build_index(&config, rebuild).await?;
        }
        Commands::Stats => {
            show_stats(&config)?;
        }
        Commands::Courses => {
            list_courses(&config)?;
        }
        Commands::Config => {
            show_config(&config)?;
        }
    }

    Ok(())
}
