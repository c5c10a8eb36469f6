// Configuration management module
// TOML settings file plus environment overrides, and the interactive editor

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, DataConfig, DatabaseConfig, EmbeddingConfig, EmbeddingStrategy,
    LlmConfig, OllamaConfig, ServerConfig,
};
