//! Word normalization for indexing and querying.
//!
//! Text is split on anything that is not a Cyrillic letter, lowercased, and
//! each word is replaced by its normal forms. Words whose every reading is a
//! preposition, conjunction, particle or interjection are dropped. `ё` in a
//! lemma is written as `е` so that both spellings land on one index entry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::morphology::Morphology;

#[derive(Clone)]
pub struct Lemmatizer {
    morphology: Arc<dyn Morphology>,
}

impl Lemmatizer {
    pub fn new(morphology: Arc<dyn Morphology>) -> Self {
        Self { morphology }
    }

    /// Counts lemma occurrences in `text`.
    ///
    /// A word with several normal forms counts once toward each of them.
    pub fn count_lemmas(&self, text: &str) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for word in split_words(text) {
            if self.morphology.is_function_word(&word) {
                continue;
            }
            for lemma in self.morphology.normal_forms(&word) {
                *counts.entry(normalize_lemma(&lemma)).or_insert(0) += 1;
            }
        }
        counts
    }

    /// One lemma per input token, or `""` for tokens that are function words
    /// or contain no Cyrillic letters. The output is index-aligned with `tokens`.
    pub fn lemmatize_sequence<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<String> {
        tokens
            .iter()
            .map(|token| self.lemmatize_token(token.as_ref()))
            .collect()
    }

    fn lemmatize_token(&self, token: &str) -> String {
        let word: String = token
            .to_lowercase()
            .chars()
            .filter(|c| is_cyrillic_letter(*c))
            .collect();
        if word.is_empty() || self.morphology.is_function_word(&word) {
            return String::new();
        }
        self.morphology
            .normal_forms(&word)
            .into_iter()
            .next()
            .map(|lemma| normalize_lemma(&lemma))
            .unwrap_or_default()
    }
}

/// Lowercase Cyrillic words of `text`, in order.
pub fn split_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !is_cyrillic_letter(c))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn is_cyrillic_letter(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}

fn normalize_lemma(lemma: &str) -> String {
    lemma.replace('ё', "е")
}
