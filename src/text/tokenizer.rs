//! Word tokenization for transaction descriptions

/// Splits text into tokens.
pub trait Tokenizer {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Lowercases, splits on anything that is not alphanumeric and drops short tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphanumericTokenizer {
    min_len: usize,
}

impl AlphanumericTokenizer {
    pub fn new() -> Self {
        Self { min_len: 2 }
    }

    /// Minimum token length in characters
    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }
}

impl Default for AlphanumericTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for AlphanumericTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= self.min_len)
            .map(str::to_lowercase)
            .collect()
    }
}

/// Tokenize with the default tokenizer
pub fn tokenize(text: &str) -> Vec<String> {
    AlphanumericTokenizer::new().tokenize(text)
}

/// Normalized text blob: the default tokens joined by single spaces.
///
/// Feature extractors store this on categorization samples.
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_and_lowercases() {
        assert_eq!(tokenize("AIRTIME Top-Up #4412"), vec!["airtime", "top", "up", "4412"]);
    }

    #[test]
    fn test_short_tokens_dropped() {
        assert_eq!(tokenize("a b cd e"), vec!["cd"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_min_len_configurable() {
        let tok = AlphanumericTokenizer::new().with_min_len(1);
        assert_eq!(tok.tokenize("a/b"), vec!["a", "b"]);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Shoprite***Lekki  "), "shoprite lekki");
    }
}
