#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, DatabaseConfig, EmbeddingStrategy, OllamaConfig};

#[inline]
pub fn run_interactive_config(base_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Property Search Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(base_dir);

    eprintln!("{}", style("Embedding Strategy").bold().yellow());
    configure_strategy(&mut config)?;
    eprintln!();

    if config.embedding.strategy == EmbeddingStrategy::Pretrained {
        eprintln!("{}", style("Ollama Configuration").bold().yellow());
        eprintln!("Configure your local Ollama instance for embedding generation.");
        eprintln!();

        configure_ollama(&mut config.ollama)?;

        eprintln!();
        eprintln!("{}", style("Testing configuration...").yellow());

        if test_ollama_connection(&config.ollama) {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before ingesting.");
        }
        eprintln!();
    }

    eprintln!("{}", style("Vector Database").bold().yellow());
    configure_database(&mut config.database)?;
    eprintln!();

    eprintln!("{}", style("Data Files").bold().yellow());
    configure_data(&mut config)?;
    eprintln!();

    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

/// Print the effective settings, leaving out secrets
#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Settings:").bold().yellow());
    let strategy = match config.embedding.strategy {
        EmbeddingStrategy::Pretrained => "pretrained (Ollama)",
        EmbeddingStrategy::Fitted => "fitted (TF-IDF)",
    };
    eprintln!("  Strategy: {}", style(strategy).cyan());
    match config.embedding.strategy {
        EmbeddingStrategy::Pretrained => {
            eprintln!("  Model: {}", style(&config.ollama.model).cyan());
            eprintln!("  Vector Size: {}", style(config.embedding.vector_size).cyan());
            match config.ollama_url() {
                Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
                Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
            }
            eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
        }
        EmbeddingStrategy::Fitted => {
            eprintln!("  Max Features: {}", style(config.embedding.max_features).cyan());
            eprintln!(
                "  Vectorizer State: {}",
                style(config.vectorizer_state_path().display()).cyan()
            );
        }
    }

    eprintln!();
    eprintln!("{}", style("Vector Database:").bold().yellow());
    eprintln!("  URI: {}", style(config.vector_database_uri()).cyan());
    eprintln!("  Collection: {}", style(&config.database.collection).cyan());
    eprintln!("  Upsert Batch Size: {}", style(config.database.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Data:").bold().yellow());
    eprintln!("  Data Directory: {}", style(config.data.data_dir.display()).cyan());
    eprintln!(
        "  Property Data File: {}",
        style(config.property_data_path().display()).cyan()
    );
    eprintln!("  Max Rows: {}", style(config.data.max_rows).cyan());

    eprintln!();
    eprintln!("{}", style("Conversational Summaries:").bold().yellow());
    eprintln!("  LLM Endpoint: {}", style(&config.llm.base_url).cyan());
    eprintln!("  LLM Model: {}", style(&config.llm.model).cyan());
    let key_state = if config.llm.api_key.is_some() {
        style("set").green()
    } else {
        style("not set (GROQ_API_KEY)").red()
    };
    eprintln!("  API Key: {}", key_state);

    eprintln!();
    eprintln!("  Server Bind: {}", style(&config.server.bind).cyan());
    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(base_dir: &Path) -> Config {
    Config::load_file(base_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: base_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_strategy(config: &mut Config) -> Result<()> {
    let strategies = &["pretrained (Ollama model)", "fitted (TF-IDF on your data)"];
    let default_index = match config.embedding.strategy {
        EmbeddingStrategy::Pretrained => 0,
        EmbeddingStrategy::Fitted => 1,
    };

    let index = Select::new()
        .with_prompt("How should text be embedded?")
        .default(default_index)
        .items(strategies)
        .interact()?;

    config.embedding.strategy = if index == 0 {
        EmbeddingStrategy::Pretrained
    } else {
        let max_features: usize = Input::new()
            .with_prompt("Maximum vocabulary size")
            .default(config.embedding.max_features)
            .validate_with(|input: &usize| -> Result<(), &str> {
                if *input == 0 {
                    Err("Vocabulary size must be greater than 0")
                } else {
                    Ok(())
                }
            })
            .interact_text()?;
        config.embedding.max_features = max_features;
        EmbeddingStrategy::Fitted
    };

    Ok(())
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_database(database: &mut DatabaseConfig) -> Result<()> {
    let collection: String = Input::new()
        .with_prompt("Collection name")
        .default(database.collection.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            DatabaseConfig::default().set_collection(input.clone())
        })
        .interact_text()?;

    let uri: String = Input::new()
        .with_prompt("LanceDB URI (leave empty for the default location)")
        .default(database.uri.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    database.set_collection(collection)?;
    database.uri = if uri.trim().is_empty() {
        None
    } else {
        Some(uri.trim().to_string())
    };

    Ok(())
}

fn configure_data(config: &mut Config) -> Result<()> {
    let data_dir: String = Input::new()
        .with_prompt("Data directory")
        .default(config.data.data_dir.display().to_string())
        .interact_text()?;

    let property_file: String = Input::new()
        .with_prompt("Property data file")
        .default(config.data.property_file.display().to_string())
        .interact_text()?;

    config.data.data_dir = PathBuf::from(data_dir);
    config.data.property_file = PathBuf::from(property_file);

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
