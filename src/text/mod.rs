//! Text processing for transaction categorization
//!
//! Tokenization, TF-IDF vocabulary construction and the merchant keyword
//! rule table used by the Naive Bayes categorizer.

mod keywords;
mod tfidf;
mod tokenizer;

pub use keywords::{KeywordRules, KEYWORD_BOOST, MERCHANT_KEYWORDS};
pub use tfidf::{TfIdfVectorizer, Vocabulary};
pub use tokenizer::{normalize, tokenize, AlphanumericTokenizer, Tokenizer};
