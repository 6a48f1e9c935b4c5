//! Text normalization and tokenization shared by indexing, search, the
//! generator and the spell checker.
//!
//! The same [`Tokenizer`] must be used on both sides of a lookup: rows are
//! indexed with it and query text is split with it, so a query token and an
//! index token compare equal exactly when they came from equivalent text.

use std::collections::{BTreeSet, HashSet};

use serde::Deserialize;
use unicode_normalization::UnicodeNormalization;

/// English and Spanish function words never worth indexing.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    // en
    "the", "and", "for", "with", "this", "that", "from", "into", "between", "are", "was",
    "were", "been", "being", "have", "has", "had", "not", "but", "our", "their", "its",
    "these", "those", "which", "while", "where", "when", "who", "whom", "than", "then",
    "there", "also", "can", "may", "using", "used", "use", "via", "after", "before",
    "during", "under", "over", "both", "each", "such", "all", "any", "more", "most",
    "other", "some", "only", "well", "within", "without", "upon", "about", "they", "them",
    "will", "would", "could", "should", "here", "how", "what", "why",
    // es
    "sobre", "para", "como", "del", "las", "los", "una", "uno", "unos", "unas", "con",
    "por", "que", "entre", "desde", "hasta", "sin", "pero", "sus", "esta", "este", "estos",
    "estas", "ese", "esa", "esos", "esas", "son", "fue", "ser", "han", "hay", "mas", "muy",
    "tambien", "cuando", "donde", "durante", "tras", "segun",
];

/// Tokenizer tuning, the `[index]` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    #[serde(default)]
    pub extra_stopwords: Vec<String>,
}

fn default_min_token_len() -> usize {
    3
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            min_token_len: default_min_token_len(),
            extra_stopwords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    min_len: usize,
    stopwords: HashSet<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&IndexSettings::default())
    }
}

impl Tokenizer {
    pub fn new(settings: &IndexSettings) -> Self {
        let mut stopwords: HashSet<String> =
            DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect();
        for word in &settings.extra_stopwords {
            let normalized = normalize_text(word);
            if !normalized.is_empty() {
                stopwords.insert(normalized);
            }
        }
        Self {
            min_len: settings.min_token_len.max(1),
            stopwords,
        }
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Tokens in text order, duplicates kept.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        normalize_text(text)
            .split_whitespace()
            .filter(|t| t.chars().count() >= self.min_len && !self.is_stopword(t))
            .map(|t| t.to_string())
            .collect()
    }

    /// Distinct tokens, first-occurrence order.
    pub fn unique_tokens(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tokens(text)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }

    pub fn token_set(&self, text: &str) -> BTreeSet<String> {
        self.tokens(text).into_iter().collect()
    }
}

/// Lowercase, strip diacritics, turn punctuation into spaces and collapse
/// runs of whitespace.
pub fn normalize_text(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_mark(*c))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

/// Sentence split on terminal punctuation, trimmed, empties dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '\n') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_diacritics_and_punctuation() {
        assert_eq!(normalize_text("Raíz, crecimiento/ÁRBOL!"), "raiz crecimiento arbol");
        assert_eq!(normalize_text("  multi   space\tand\nlines "), "multi space and lines");
    }

    #[test]
    fn test_tokens_drop_short_and_stopwords() {
        let tok = Tokenizer::default();
        assert_eq!(
            tok.tokens("The root of Arabidopsis and la raíz para plantas"),
            vec!["root", "arabidopsis", "raiz", "plantas"]
        );
    }

    #[test]
    fn test_hyphenated_words_split() {
        let tok = Tokenizer::default();
        assert_eq!(tok.tokens("micro-gravity"), vec!["micro", "gravity"]);
    }

    #[test]
    fn test_extra_stopwords_and_min_len() {
        let tok = Tokenizer::new(&IndexSettings {
            min_token_len: 5,
            extra_stopwords: vec!["Study".to_string()],
        });
        assert_eq!(tok.tokens("study of mouse bones in orbit"), vec!["mouse", "bones", "orbit"]);
    }

    #[test]
    fn test_unique_tokens_keeps_first_order() {
        let tok = Tokenizer::default();
        assert_eq!(
            tok.unique_tokens("bone loss bone density loss"),
            vec!["bone", "loss", "density"]
        );
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("First one. Second one? Third\nFourth");
        assert_eq!(s, vec!["First one.", "Second one?", "Third", "Fourth"]);
    }
}
