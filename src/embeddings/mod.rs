// Embeddings module
// Turns text into fixed-length vectors, either with an Ollama-served model or a fitted TF-IDF vectorizer


pub mod ollama;
pub mod tfidf;

pub use ollama::OllamaClient;
pub use tfidf::{TfIdfVectorizer, VectorizerState};

use tracing::{debug, info};

use crate::config::{Config, EmbeddingStrategy};
use crate::{Result, SearchError};

/// Anything that maps text to vectors of a fixed dimension
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> Result<usize>;

    fn name(&self) -> &str;
}

/// The embedding strategy selected by configuration
#[derive(Debug, Clone)]
pub enum Embedder {
    Pretrained(OllamaClient),
    Fitted(TfIdfVectorizer),
}

impl Embedder {
    /// Build the configured embedder, reusing a persisted vectorizer when one exists
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.embedding.strategy {
            EmbeddingStrategy::Pretrained => {
                let client = OllamaClient::new(config)
                    .map_err(|e| SearchError::Config(format!("{:#}", e)))?;
                Ok(Self::Pretrained(client))
            }
            EmbeddingStrategy::Fitted => {
                let state_path = config.vectorizer_state_path();
                if state_path.exists() {
                    info!("Using fitted vectorizer from {}", state_path.display());
                    Ok(Self::Fitted(TfIdfVectorizer::load(&state_path)?))
                } else {
                    debug!(
                        "No vectorizer state at {}; starting unfitted",
                        state_path.display()
                    );
                    Ok(Self::Fitted(TfIdfVectorizer::new(
                        config.embedding.max_features,
                    )))
                }
            }
        }
    }

    /// Fit on the ingestion corpus; pretrained models need no fitting
    #[inline]
    pub fn fit_corpus(&mut self, corpus: &[String]) -> Result<()> {
        match self {
            Self::Pretrained(_) => Ok(()),
            Self::Fitted(vectorizer) => vectorizer.fit(corpus),
        }
    }

    /// Write fitted state next to the configuration so later queries share it
    #[inline]
    pub fn persist(&self, config: &Config) -> Result<()> {
        match self {
            Self::Pretrained(_) => Ok(()),
            Self::Fitted(vectorizer) => vectorizer.save(&config.vectorizer_state_path()),
        }
    }

    /// True for a vectorizer that has no vocabulary yet
    #[inline]
    pub fn needs_fit(&self) -> bool {
        match self {
            Self::Pretrained(_) => false,
            Self::Fitted(vectorizer) => !vectorizer.is_fitted(),
        }
    }

    #[inline]
    pub fn strategy(&self) -> EmbeddingStrategy {
        match self {
            Self::Pretrained(_) => EmbeddingStrategy::Pretrained,
            Self::Fitted(_) => EmbeddingStrategy::Fitted,
        }
    }

    fn inner(&self) -> &dyn TextEmbedder {
        match self {
            Self::Pretrained(client) => client,
            Self::Fitted(vectorizer) => vectorizer,
        }
    }
}

impl TextEmbedder for Embedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner().embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner().embed_batch(texts)
    }

    fn dimension(&self) -> Result<usize> {
        self.inner().dimension()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}
