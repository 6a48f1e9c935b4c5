//! Query spelling suggestions drawn from the catalog's own vocabulary.
//!
//! The vocabulary is every indexed token that appears in at least two rows.
//! Query tokens that look like keyboard noise are reported as ignored rather
//! than corrected.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::index::TokenIndex;
use crate::tokenize::{normalize_text, Tokenizer};

const MIN_DOC_FREQ: usize = 2;
const MIN_TOKEN_LEN: usize = 3;
const MAX_DISTANCE: usize = 2;
const MIN_SCORE: f64 = 0.35;
const MAX_SUGGESTIONS: usize = 5;
const KEYBOARD_ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub word: String,
    pub score: f64,
    pub frequency: usize,
    pub distance: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correction {
    pub original: String,
    pub best_correction: String,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpellCheckReport {
    pub original: String,
    pub has_errors: bool,
    pub corrected_query: String,
    pub corrections: Vec<Correction>,
    pub tokens_analyzed: usize,
    pub tokens_corrected: usize,
    pub tokens_ignored: usize,
    pub ignored_tokens: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SpellChecker {
    vocabulary: BTreeMap<String, usize>,
    by_len: HashMap<usize, Vec<String>>,
}

impl SpellChecker {
    pub fn build(index: &TokenIndex) -> Self {
        let mut vocabulary = BTreeMap::new();
        let mut by_len: HashMap<usize, Vec<String>> = HashMap::new();
        for (token, freq) in index.vocabulary() {
            let len = token.chars().count();
            if freq >= MIN_DOC_FREQ && len >= MIN_TOKEN_LEN {
                vocabulary.insert(token.to_string(), freq);
                by_len.entry(len).or_default().push(token.to_string());
            }
        }
        Self { vocabulary, by_len }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn frequency(&self, word: &str) -> usize {
        self.vocabulary.get(word).copied().unwrap_or(0)
    }

    /// Ranked corrections for one word; empty when none is convincing.
    pub fn suggest(&self, word: &str) -> Vec<Suggestion> {
        let len = word.chars().count();
        let current = self.frequency(word);
        let known = current > 0;

        let mut out = Vec::new();
        for candidate_len in len.saturating_sub(MAX_DISTANCE).max(MIN_TOKEN_LEN)..=len + MAX_DISTANCE {
            let Some(words) = self.by_len.get(&candidate_len) else {
                continue;
            };
            for candidate in words {
                if candidate == word {
                    continue;
                }
                let distance = strsim::levenshtein(word, candidate);
                if distance > MAX_DISTANCE {
                    continue;
                }
                let frequency = self.frequency(candidate);
                // Known words only yield to much more common neighbours.
                if known && frequency <= current * 3 {
                    continue;
                }
                let score = similarity(word, candidate, distance, frequency);
                if score >= MIN_SCORE {
                    out.push(Suggestion {
                        word: candidate.clone(),
                        score: (score * 1000.0).round() / 1000.0,
                        frequency,
                        distance,
                    });
                }
            }
        }

        out.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.frequency.cmp(&a.frequency))
                .then_with(|| a.word.cmp(&b.word))
        });
        out.truncate(MAX_SUGGESTIONS);
        out
    }

    pub fn check_query(&self, query: &str, tokenizer: &Tokenizer) -> SpellCheckReport {
        let normalized = normalize_text(query);
        let tokens: Vec<&str> = normalized
            .split_whitespace()
            .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
            .collect();

        let mut corrections = Vec::new();
        let mut corrected = Vec::new();
        let mut ignored = Vec::new();

        for token in &tokens {
            if is_gibberish(token) {
                ignored.push(token.to_string());
                continue;
            }
            let suggestions = if tokenizer.is_stopword(token) {
                Vec::new()
            } else {
                self.suggest(token)
            };
            match suggestions.first() {
                Some(best) => {
                    corrected.push(best.word.clone());
                    corrections.push(Correction {
                        original: token.to_string(),
                        best_correction: best.word.clone(),
                        suggestions: suggestions.clone(),
                    });
                }
                None => corrected.push(token.to_string()),
            }
        }

        let changed = corrections.len() + ignored.len();
        let confidence = 1.0 - changed as f64 / tokens.len().max(1) as f64;
        SpellCheckReport {
            original: query.to_string(),
            has_errors: changed > 0,
            corrected_query: corrected.join(" "),
            tokens_analyzed: tokens.len(),
            tokens_corrected: corrections.len(),
            tokens_ignored: ignored.len(),
            corrections,
            ignored_tokens: ignored,
            confidence: (confidence * 100.0).round() / 100.0,
        }
    }
}

fn similarity(word: &str, candidate: &str, distance: usize, frequency: usize) -> f64 {
    let distance_score = 1.0 / (1.0 + (distance as f64).powf(1.5));
    let freq_score = ((frequency + 1) as f64).ln() / 10.0;
    let prefix = word
        .chars()
        .zip(candidate.chars())
        .take_while(|(a, b)| a == b)
        .count();
    let longest = word.chars().count().max(candidate.chars().count()).max(1);
    0.6 * distance_score + 0.25 * freq_score + 0.15 * (prefix as f64 / longest as f64)
}

/// Keyboard mashes and other strings no vocabulary could fix.
pub fn is_gibberish(word: &str) -> bool {
    let chars: Vec<char> = word.to_lowercase().chars().collect();
    let len = chars.len();
    if len < 3 {
        return false;
    }

    let vowels = chars.iter().filter(|c| "aeiou".contains(**c)).count();
    if len > 4 && (vowels as f64 / len as f64) < 0.15 {
        return true;
    }

    // Whole word is one short sequence repeated ("asdasdas").
    for seq_len in 2..(len / 2 + 1).min(5) {
        if (0..len).all(|i| chars[i] == chars[i % seq_len]) {
            return true;
        }
    }

    let mut run = 0;
    for c in &chars {
        if c.is_ascii_alphabetic() && !"aeiou".contains(*c) {
            run += 1;
            if run >= 5 {
                return true;
            }
        } else {
            run = 0;
        }
    }

    len >= 5
        && KEYBOARD_ROWS.iter().any(|row| {
            let on_row = chars.iter().filter(|c| row.contains(**c)).count();
            on_row as f64 / len as f64 >= 0.8
        })
}
