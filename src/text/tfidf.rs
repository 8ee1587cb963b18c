//! TF-IDF vocabulary construction

use super::tokenizer::{AlphanumericTokenizer, Tokenizer};
use crate::error::{LedgerMlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Vocabulary builder with document-frequency pruning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    /// Tokens seen in fewer documents are dropped
    pub min_doc_freq: usize,
    /// Tokens seen in more than this fraction of documents are dropped
    pub max_df_ratio: f64,
    /// Keep at most this many tokens, most frequent first
    pub max_features: Option<usize>,
}

impl Default for TfIdfVectorizer {
    fn default() -> Self {
        Self {
            min_doc_freq: 5,
            max_df_ratio: 0.9,
            max_features: None,
        }
    }
}

impl TfIdfVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_doc_freq(mut self, min_doc_freq: usize) -> Self {
        self.min_doc_freq = min_doc_freq;
        self
    }

    pub fn with_max_df_ratio(mut self, ratio: f64) -> Self {
        self.max_df_ratio = ratio;
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Build the vocabulary and idf table from training documents
    pub fn fit<S: AsRef<str>>(&self, documents: &[S]) -> Result<Vocabulary> {
        if documents.is_empty() {
            return Err(LedgerMlError::EmptyDataset(
                "cannot build a vocabulary from zero documents".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_df_ratio) {
            return Err(LedgerMlError::invalid_parameter(
                "max_df_ratio",
                self.max_df_ratio,
                "must be within [0, 1]",
            ));
        }

        let tokenizer = AlphanumericTokenizer::new();
        let n_docs = documents.len();
        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            let unique: HashSet<String> = tokenizer.tokenize(doc.as_ref()).into_iter().collect();
            for token in unique {
                *doc_freq.entry(token).or_insert(0) += 1;
            }
        }

        let max_df = self.max_df_ratio * n_docs as f64;
        let mut kept: Vec<(String, usize)> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= self.min_doc_freq && (*df as f64) <= max_df)
            .collect();
        // BTreeMap iteration is token-ordered, so a stable sort keeps ties in token order
        kept.sort_by(|a, b| b.1.cmp(&a.1));
        if let Some(limit) = self.max_features {
            kept.truncate(limit);
        }

        let n = n_docs as f64;
        let idf = kept
            .iter()
            .map(|(_, df)| ((n + 1.0) / (*df as f64 + 1.0)).ln() + 1.0)
            .collect();
        let tokens: Vec<String> = kept.into_iter().map(|(token, _)| token).collect();
        let index = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| (token.clone(), i))
            .collect();

        debug!(n_docs, vocabulary_size = tokens.len(), "Built TF-IDF vocabulary");

        Ok(Vocabulary {
            tokens,
            index,
            idf,
            n_documents: n_docs,
        })
    }
}

/// Fitted token table with fixed indices and idf weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: BTreeMap<String, usize>,
    idf: Vec<f64>,
    n_documents: usize,
}

impl Vocabulary {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    pub fn n_documents(&self) -> usize {
        self.n_documents
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    /// Vocabulary index of every in-vocabulary token occurrence, in text order
    pub fn token_indices(&self, text: &str) -> Vec<usize> {
        AlphanumericTokenizer::new()
            .tokenize(text)
            .iter()
            .filter_map(|t| self.index_of(t))
            .collect()
    }
}
