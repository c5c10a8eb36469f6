
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::TextEmbedder;
use crate::{Result, SearchError};

pub const DEFAULT_MAX_FEATURES: usize = 100;

static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));

/// Lifecycle of a vectorizer: no vocabulary until fitted on a corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum VectorizerState {
    Unfitted,
    Fitted {
        /// Vocabulary in alphabetical order; position is the vector index
        terms: Vec<String>,
        idf: Vec<f32>,
        documents: usize,
    },
}

/// Term-frequency / inverse-document-frequency vectorizer fitted on the ingested corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    max_features: usize,
    state: VectorizerState,
}

impl Default for TfIdfVectorizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FEATURES)
    }
}

impl TfIdfVectorizer {
    #[inline]
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            state: VectorizerState::Unfitted,
        }
    }

    #[inline]
    pub fn max_features(&self) -> usize {
        self.max_features
    }

    #[inline]
    pub fn state(&self) -> &VectorizerState {
        &self.state
    }

    #[inline]
    pub fn is_fitted(&self) -> bool {
        matches!(self.state, VectorizerState::Fitted { .. })
    }

    #[inline]
    pub fn vocabulary(&self) -> Option<&[String]> {
        match &self.state {
            VectorizerState::Unfitted => None,
            VectorizerState::Fitted { terms, .. } => Some(terms),
        }
    }

    /// Learn the vocabulary and idf weights; refitting replaces the previous state
    #[inline]
    pub fn fit(&mut self, corpus: &[String]) -> Result<()> {
        let tokenized: Vec<Vec<String>> = corpus.iter().map(|doc| tokenize(doc)).collect();

        let mut frequencies: HashMap<&str, usize> = HashMap::new();
        let mut document_frequencies: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            for token in tokens {
                *frequencies.entry(token.as_str()).or_default() += 1;
            }

            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for token in seen {
                *document_frequencies.entry(token).or_default() += 1;
            }
        }

        if frequencies.is_empty() {
            return Err(SearchError::Embedding(
                "Cannot fit vectorizer: the corpus contains no terms".to_string(),
            ));
        }

        let mut ranked: Vec<(&str, usize)> = frequencies.into_iter().collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        let mut terms: Vec<String> = ranked.into_iter().map(|(term, _)| term.to_string()).collect();
        terms.sort_unstable();

        let documents = corpus.len();
        let idf = terms
            .iter()
            .map(|term| {
                let df = document_frequencies.get(term.as_str()).copied().unwrap_or(0);
                smooth_idf(documents, df)
            })
            .collect();

        info!(
            "Fitted TF-IDF vectorizer on {} documents ({} terms)",
            documents,
            terms.len()
        );

        self.state = VectorizerState::Fitted {
            terms,
            idf,
            documents,
        };
        Ok(())
    }

    /// tf*idf weights for `text`, L2-normalized; text with no known terms yields zeros
    #[inline]
    pub fn transform(&self, text: &str) -> Result<Vec<f32>> {
        let VectorizerState::Fitted { terms, idf, .. } = &self.state else {
            return Err(SearchError::NotFitted);
        };

        let mut vector = vec![0.0_f32; terms.len()];
        for token in tokenize(text) {
            if let Ok(index) = terms.binary_search(&token) {
                vector[index] += 1.0;
            }
        }

        for (weight, idf) in vector.iter_mut().zip(idf) {
            *weight *= idf;
        }

        let norm = vector.iter().map(|w| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for weight in &mut vector {
                *weight /= norm;
            }
        }

        Ok(vector)
    }

    #[inline]
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(self)
            .map_err(|e| SearchError::Embedding(format!("Failed to serialize vectorizer: {}", e)))?;
        fs::write(path, json)?;

        debug!("Saved vectorizer state to {}", path.display());
        Ok(())
    }

    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SearchError::NotFound(path.to_path_buf()));
        }

        let json = fs::read_to_string(path)?;
        let vectorizer: Self = serde_json::from_str(&json).map_err(|e| {
            SearchError::Embedding(format!(
                "Failed to parse vectorizer state {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!("Loaded vectorizer state from {}", path.display());
        Ok(vectorizer)
    }
}

impl TextEmbedder for TfIdfVectorizer {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.transform(text)
    }

    fn dimension(&self) -> Result<usize> {
        self.vocabulary()
            .map(<[String]>::len)
            .ok_or(SearchError::NotFitted)
    }

    fn name(&self) -> &str {
        "tfidf"
    }
}

/// Lowercased tokens of two or more word characters
#[inline]
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_REGEX
        .find_iter(&lowered)
        .filter_map(std::result::Result::ok)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn smooth_idf(documents: usize, document_frequency: usize) -> f32 {
    (((1 + documents) as f32) / ((1 + document_frequency) as f32)).ln() + 1.0
}
