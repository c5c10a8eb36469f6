use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::Confirm;
use tracing::{info, warn};

use crate::chat::ConversationalAgent;
use crate::config::{Config, EmbeddingStrategy, run_interactive_config, show_config};
use crate::data::{DataLoader, TEXT_CONTENT_COLUMN, file_info, validate_processed_data};
use crate::database::{SearchResult, StoreOutcome, VectorStore};
use crate::embeddings::{Embedder, OllamaClient, TfIdfVectorizer};
use crate::ingestion::{IngestionReport, Ingestor};

/// Show or interactively edit the configuration
#[inline]
pub fn configure(show: bool) -> Result<()> {
    if show {
        let config = Config::load_default()?;
        show_config(&config);
        Ok(())
    } else {
        run_interactive_config(&Config::default_base_dir()?)
    }
}

/// Ingest the given files, or the configured property data file when none are given
#[inline]
pub async fn ingest(
    config: Config,
    files: &[PathBuf],
    text_column: &str,
    append: bool,
) -> Result<()> {
    let mut ingestor = Ingestor::from_config(config)?;

    let report = if files.is_empty() {
        println!(
            "📂 Processing property data from {}",
            style(ingestor.config().property_data_path().display()).cyan()
        );
        ingestor
            .ingest_property_data()
            .await
            .context("Property data ingestion failed")?
    } else {
        let paths = files
            .iter()
            .map(|file| resolve_data_file(ingestor.config(), file))
            .collect::<Vec<_>>();
        for path in &paths {
            println!("📂 Loading {}", style(path.display()).cyan());
        }
        ingestor
            .ingest_files(&paths, text_column, !append)
            .await
            .context("File ingestion failed")?
    };

    print_ingestion_report(&report);

    let expected = report.first_id as usize + report.documents;
    let validation = ingestor.validate(expected).await?;
    match validation.actual {
        Some(actual) if validation.matched => {
            println!("   ✅ Validation: {} documents in collection", actual);
        }
        Some(actual) => {
            println!(
                "   ⚠️  Validation: expected {} documents, collection holds {}",
                expected, actual
            );
        }
        None => println!("   ⚠️  Validation: could not count documents"),
    }

    Ok(())
}

/// Semantic search from the command line
#[inline]
pub async fn search(config: Config, query: &str, limit: usize) -> Result<()> {
    let results = run_search(config, query, limit).await?;

    if results.is_empty() {
        println!("No matching properties found for \"{}\".", query);
        return Ok(());
    }

    println!(
        "{}",
        style(format!("🔍 {} results for \"{}\"", results.len(), query)).bold()
    );
    println!();
    for (rank, result) in results.iter().enumerate() {
        print_result(rank + 1, result);
    }

    Ok(())
}

/// Search, then have the LLM summarise the matches conversationally
#[inline]
pub async fn chat(config: Config, query: &str, limit: usize) -> Result<()> {
    let agent = ConversationalAgent::new(&config.llm);
    let results = run_search(config, query, limit).await?;
    let total = results.len();

    let prompt_query = query.to_string();
    let response =
        tokio::task::spawn_blocking(move || agent.make_conversational(&prompt_query, &results))
            .await
            .context("Conversational summary task failed")?;

    println!("{}", response);
    println!();
    println!(
        "{}",
        style(format!("Based on {} matching properties", total)).dim()
    );
    Ok(())
}

/// Show detailed status of the embedder and the collection
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Property Search Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Embedder Status:");
    match config.embedding.strategy {
        EmbeddingStrategy::Pretrained => match OllamaClient::new(config) {
            Ok(client) => match client.health_check() {
                Ok(()) => {
                    println!(
                        "   ✅ Ollama: Connected ({}:{})",
                        config.ollama.host, config.ollama.port
                    );
                    println!("   📋 Model: {}", config.ollama.model);
                    println!("   🔢 Batch Size: {}", config.ollama.batch_size);
                }
                Err(e) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
            },
            Err(e) => println!("   ❌ Ollama: Invalid configuration - {:#}", e),
        },
        EmbeddingStrategy::Fitted => {
            let state_path = config.vectorizer_state_path();
            match TfIdfVectorizer::load(&state_path) {
                Ok(vectorizer) => {
                    let terms = vectorizer.vocabulary().map_or(0, <[String]>::len);
                    println!("   ✅ TF-IDF: Fitted ({} terms)", terms);
                    println!("   📄 State: {}", state_path.display());
                }
                Err(e) => println!("   ⚠️  TF-IDF: Not fitted yet - {}", e),
            }
        }
    }

    println!();
    println!("🔍 Vector Database Status:");
    let embedder = Embedder::from_config(config)?;
    match VectorStore::open(config, Arc::new(embedder)).await {
        Ok(store) => {
            println!("   ✅ LanceDB: Connected ({})", config.vector_database_uri());
            match store.collection_info().await {
                StoreOutcome::Success(info) => {
                    println!("   📚 Collection: {}", info.name);
                    println!("   📊 Documents: {}", info.points_count);
                    println!("   🔢 Dimension: {}", info.dimension);
                    println!("   🏷️  Version: {}", info.version);
                }
                StoreOutcome::Failure(message) => {
                    println!(
                        "   📭 Collection '{}' unavailable: {}",
                        config.database.collection, message
                    );
                }
            }
        }
        Err(e) => println!("   ❌ LanceDB: Failed to connect - {}", e),
    }

    println!();
    println!("📂 Data Files:");
    let loader = DataLoader::new(&config.data.data_dir);
    match loader.list_data_files() {
        Ok(files) if files.is_empty() => {
            println!("   📭 No data files in {}", config.data.data_dir.display())
        }
        Ok(files) => println!("   📄 {} files in {}", files.len(), loader.data_dir().display()),
        Err(e) => println!("   ❌ Failed to list data files: {}", e),
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'property-search ingest' to load the property data file");
    println!("   • Use 'property-search search <query>' to find matching properties");
    println!("   • Use 'property-search serve' to start the HTTP API");

    Ok(())
}

/// List supported data files, optionally filtered by a name pattern
#[inline]
pub fn list_files(config: &Config, pattern: Option<&str>) -> Result<()> {
    let loader = DataLoader::new(&config.data.data_dir);
    let files = match pattern {
        Some(pattern) => loader.search_files_by_pattern(pattern)?,
        None => loader.list_data_files()?,
    };

    if files.is_empty() {
        println!(
            "No data files found in {}.",
            config.data.data_dir.display()
        );
        return Ok(());
    }

    println!("Data Files ({} total):", files.len());
    for path in &files {
        match file_info(path) {
            Ok(info) => println!(
                "  📄 {} ({:.2} MB, {} records, {} columns)",
                path.display(),
                info.size_mb,
                info.total_records,
                info.total_columns
            ),
            Err(e) => println!("  ⚠️  {} ({})", path.display(), e),
        }
    }

    Ok(())
}

/// Summarise a data file: shape, column kinds, null counts and the first rows
#[inline]
pub fn inspect_file(config: &Config, file: &Path, rows: usize) -> Result<()> {
    let path = resolve_data_file(config, file);
    let info = file_info(&path)?;

    println!("{}", style(format!("📄 {}", path.display())).bold());
    println!("   Size: {:.2} MB", info.size_mb);
    println!("   Records: {}", info.total_records);
    println!("   Columns: {}", info.total_columns);
    println!();

    println!("{}", style("Columns:").bold().yellow());
    for column in &info.columns {
        let kind = info
            .column_kinds
            .get(column)
            .map(|kind| format!("{:?}", kind).to_lowercase())
            .unwrap_or_default();
        let nulls = info.null_counts.get(column).copied().unwrap_or(0);
        println!("  {} ({}, {} null)", style(column).cyan(), kind, nulls);
    }

    println!();
    println!("{}", style(format!("First {} rows:", rows)).bold().yellow());
    let preview = DataLoader::new(&config.data.data_dir).preview(&path, rows)?;
    for record in preview.records() {
        let line = record
            .iter()
            .map(|(column, value)| format!("{}={}", column, value.to_text()))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {}", line);
    }

    if info.columns.iter().any(|c| c == TEXT_CONTENT_COLUMN) {
        let report = validate_processed_data(&path)?;
        println!();
        println!("{}", style("Processed text:").bold().yellow());
        println!("  Empty text records: {}", report.empty_text_records);
        if let Some(sample) = report.sample_text {
            println!("  Sample: {}", sample);
        }
    }

    Ok(())
}

/// Drop the configured collection
#[inline]
pub async fn delete_collection(config: &Config, skip_confirmation: bool) -> Result<()> {
    let collection = config.database.collection.clone();

    if !skip_confirmation {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete collection '{}' and all its documents?",
                collection
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    let embedder = Embedder::from_config(config)?;
    let store = VectorStore::open(config, Arc::new(embedder)).await?;
    match store.delete_collection().await {
        StoreOutcome::Success(()) => {
            info!("Deleted collection '{}'", collection);
            println!("🗑️  Deleted collection '{}'", collection);
            Ok(())
        }
        StoreOutcome::Failure(message) => {
            bail!("Failed to delete collection '{}': {}", collection, message)
        }
    }
}

/// Start the HTTP API
#[inline]
pub async fn serve(config: Config, bind: Option<String>) -> Result<()> {
    let bind: SocketAddr = match bind {
        Some(bind) => bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", bind))?,
        None => config.server_bind_addr()?,
    };

    println!("🚀 Serving property search on http://{}", bind);
    crate::server::serve(config, bind).await
}

/// Paths that do not exist as given are looked up in the data directory
#[inline]
pub fn resolve_data_file(config: &Config, file: &Path) -> PathBuf {
    if file.is_relative() && !file.exists() {
        let candidate = config.data.data_dir.join(file);
        if candidate.exists() {
            return candidate;
        }
    }
    file.to_path_buf()
}

async fn run_search(config: Config, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() {
        bail!("Query cannot be empty");
    }

    let ingestor = Ingestor::from_config(config)?;
    match ingestor.search(query.trim(), limit).await? {
        StoreOutcome::Success(results) => Ok(results),
        StoreOutcome::Failure(message) => {
            warn!("Search failed: {}", message);
            bail!(
                "Search failed: {} (has the collection been ingested?)",
                message
            )
        }
    }
}

fn print_ingestion_report(report: &IngestionReport) {
    println!();
    println!(
        "{}",
        style(format!(
            "✅ Ingested {} documents into '{}'",
            report.documents, report.collection
        ))
        .green()
        .bold()
    );
    println!("   Batches: {}", report.batches);
    println!("   First Id: {}", report.first_id);
    println!(
        "   Finished: {}",
        report.finished_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_result(rank: usize, result: &SearchResult) {
    println!(
        "{}. {} {}",
        rank,
        style(format!("[{:.3}]", result.score)).green(),
        result.data.text
    );
    for (column, value) in &result.data.metadata {
        println!("     {}: {}", style(column).dim(), value.to_text());
    }
    if let Some(source) = &result.data.source_file {
        println!("     {}: {}", style("source").dim(), source);
    }
    println!();
}
