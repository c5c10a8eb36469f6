use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use property_search::commands::{
    chat, configure, delete_collection, ingest, inspect_file, list_files, search, serve,
    show_status,
};
use property_search::config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "property-search")]
#[command(about = "Semantic search over real-estate listings backed by LanceDB")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedder, Ollama connection and collection
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest data files into the vector collection
    Ingest {
        /// File to ingest; repeat for several. Defaults to the configured property data file
        #[arg(long = "file", value_name = "FILE")]
        files: Vec<PathBuf>,
        /// Column holding the text to embed when ingesting files
        #[arg(long, default_value = "text")]
        text_column: String,
        /// Add to the existing collection instead of recreating it
        #[arg(long, requires = "files")]
        append: bool,
    },
    /// Search the collection for matching properties
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
        limit: u64,
    },
    /// Search and summarise the matches conversationally
    Chat {
        query: String,
        /// Maximum number of results to summarise
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
        limit: u64,
    },
    /// Show embedder, collection and data directory status
    Status,
    /// List data files in the data directory
    Files {
        /// Only show files whose name contains this pattern
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Show columns, types and the first rows of a data file
    Inspect {
        file: PathBuf,
        /// Number of rows to preview
        #[arg(long, default_value_t = 5)]
        rows: usize,
    },
    /// Delete the configured collection
    Delete {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Start the HTTP search API
    Serve {
        /// Address to listen on, overriding the configured one
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => configure(show)?,
        Commands::Ingest {
            files,
            text_column,
            append,
        } => ingest(Config::load_default()?, &files, &text_column, append).await?,
        Commands::Search { query, limit } => {
            search(Config::load_default()?, &query, limit as usize).await?;
        }
        Commands::Chat { query, limit } => {
            chat(Config::load_default()?, &query, limit as usize).await?;
        }
        Commands::Status => show_status(&Config::load_default()?).await?,
        Commands::Files { pattern } => list_files(&Config::load_default()?, pattern.as_deref())?,
        Commands::Inspect { file, rows } => inspect_file(&Config::load_default()?, &file, rows)?,
        Commands::Delete { yes } => delete_collection(&Config::load_default()?, yes).await?,
        Commands::Serve { bind } => serve(Config::load_default()?, bind).await?,
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to initialize tracing subscriber: {error}");
    }
}
