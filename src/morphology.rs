//! Morphological analysis backing the lemmatizer.
//!
//! The [`Morphology`] trait is the seam between the text pipeline and the
//! dictionary resource. Implementations are read-only after construction and
//! must be safe to share across crawl workers.
//!
//! [`DictionaryMorphology`] is the shipped analyzer. It always knows the
//! closed-class Russian words (prepositions, conjunctions, particles,
//! interjections) and can load a full word-form dictionary exported in the
//! OpenCorpora tag set:
//!
//! ```text
//! леопарда	леопард	NOUN
//! некоторых	некоторый	ADJF
//! некоторых	некоторые	ADJF
//! ```
//!
//! A form listed on several lines has several normal forms. Words missing from
//! the dictionary are reduced by the Snowball Russian stemmer, so "леопарда" and
//! "леопарды" both index under "леопард". Dictionary entries take precedence.

use anyhow::{Context, Result};
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

const FUNCTION_WORDS: &str = include_str!("../data/function_words.tsv");

static RUSSIAN: LazyLock<Stemmer> = LazyLock::new(|| Stemmer::create(Algorithm::Russian));

/// Part of speech as reported by the dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartOfSpeech {
    Noun,
    Adjective,
    ShortAdjective,
    Comparative,
    Verb,
    Infinitive,
    Participle,
    ShortParticiple,
    Gerund,
    Numeral,
    Adverb,
    Pronoun,
    Predicative,
    Preposition,
    Conjunction,
    Particle,
    Interjection,
    Unknown,
}

impl PartOfSpeech {
    /// Parses an OpenCorpora grammeme (`NOUN`, `PREP`, ...). Unrecognized tags map to `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "NOUN" => Self::Noun,
            "ADJF" => Self::Adjective,
            "ADJS" => Self::ShortAdjective,
            "COMP" => Self::Comparative,
            "VERB" => Self::Verb,
            "INFN" => Self::Infinitive,
            "PRTF" => Self::Participle,
            "PRTS" => Self::ShortParticiple,
            "GRND" => Self::Gerund,
            "NUMR" => Self::Numeral,
            "ADVB" => Self::Adverb,
            "NPRO" => Self::Pronoun,
            "PRED" => Self::Predicative,
            "PREP" => Self::Preposition,
            "CONJ" => Self::Conjunction,
            "PRCL" => Self::Particle,
            "INTJ" => Self::Interjection,
            _ => Self::Unknown,
        }
    }

    /// Closed grammatical categories that carry no searchable meaning.
    pub fn is_function_word(self) -> bool {
        matches!(
            self,
            Self::Preposition | Self::Conjunction | Self::Particle | Self::Interjection
        )
    }
}

/// One analysis of a surface word: a normal form and its part of speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordForm {
    pub lemma: String,
    pub pos: PartOfSpeech,
}

pub trait Morphology: Send + Sync {
    /// All analyses of a lowercase word. Never empty.
    fn analyze(&self, word: &str) -> Vec<WordForm>;

    /// True when every analysis of `word` is a function word.
    fn is_function_word(&self, word: &str) -> bool {
        let forms = self.analyze(word);
        !forms.is_empty() && forms.iter().all(|f| f.pos.is_function_word())
    }

    /// Distinct normal forms of `word` in dictionary order.
    fn normal_forms(&self, word: &str) -> Vec<String> {
        let mut lemmas: Vec<String> = Vec::new();
        for form in self.analyze(word) {
            if !lemmas.contains(&form.lemma) {
                lemmas.push(form.lemma);
            }
        }
        lemmas
    }
}

/// In-memory word-form table with an optional stemming fallback.
#[derive(Debug, Default)]
pub struct DictionaryMorphology {
    forms: HashMap<String, Vec<WordForm>>,
    stemming: bool,
}

impl DictionaryMorphology {
    /// Embedded closed-class words; other words are stemmed.
    pub fn builtin() -> Self {
        let mut morphology = Self::default().with_stemming(true);
        morphology.extend_from_tsv(FUNCTION_WORDS);
        morphology
    }

    /// Turns the stemming fallback on or off. When off, unknown words are their own lemma.
    pub fn with_stemming(mut self, stemming: bool) -> Self {
        self.stemming = stemming;
        self
    }

    /// Builtin table plus the dictionary at `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read morphology dictionary: {}", path.display()))?;
        let mut morphology = Self::builtin();
        let added = morphology.extend_from_tsv(&content);
        tracing::info!(path = %path.display(), forms = added, "loaded morphology dictionary");
        Ok(morphology)
    }

    /// Builtin table, plus the configured dictionary when there is one.
    pub fn load(dictionary: Option<&Path>) -> Result<Self> {
        match dictionary {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Adds `form<TAB>lemma<TAB>POS` lines. Blank lines and `#` comments are skipped.
    /// Returns the number of analyses added.
    pub fn extend_from_tsv(&mut self, content: &str) -> usize {
        let mut added = 0;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut cols = line.split('\t');
            let (Some(form), Some(lemma)) = (cols.next(), cols.next()) else {
                continue;
            };
            let pos = cols.next().map(PartOfSpeech::from_tag).unwrap_or(PartOfSpeech::Unknown);
            let entry = WordForm {
                lemma: lemma.trim().to_lowercase(),
                pos,
            };
            let forms = self.forms.entry(form.trim().to_lowercase()).or_default();
            if !forms.contains(&entry) {
                forms.push(entry);
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

impl Morphology for DictionaryMorphology {
    fn analyze(&self, word: &str) -> Vec<WordForm> {
        if let Some(forms) = self.forms.get(word) {
            return forms.clone();
        }
        if word.contains('ё') {
            if let Some(forms) = self.forms.get(&word.replace('ё', "е")) {
                return forms.clone();
            }
        }
        let lemma = if self.stemming {
            RUSSIAN.stem(&word.replace('ё', "е")).into_owned()
        } else {
            word.to_string()
        };
        vec![WordForm {
            lemma,
            pos: PartOfSpeech::Unknown,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_knows_function_words() {
        let m = DictionaryMorphology::builtin();
        assert!(m.is_function_word("в"));
        assert!(m.is_function_word("и"));
        assert!(m.is_function_word("не"));
        assert!(m.is_function_word("ох"));
        assert!(!m.is_function_word("леопард"));
    }

    #[test]
    fn test_unknown_word_is_its_own_lemma_without_stemming() {
        let m = DictionaryMorphology::builtin().with_stemming(false);
        assert_eq!(m.normal_forms("кавказа"), vec!["кавказа".to_string()]);
    }

    #[test]
    fn test_unknown_inflections_share_a_stem() {
        let m = DictionaryMorphology::load(None).unwrap();
        for word in ["леопард", "леопарда", "леопарды", "леопарду"] {
            assert_eq!(m.normal_forms(word), vec!["леопард".to_string()], "{}", word);
        }
        assert!(m.is_function_word("в"));
    }

    #[test]
    fn test_dictionary_entry_overrides_stem() {
        let mut m = DictionaryMorphology::builtin();
        m.extend_from_tsv("люди\tчеловек\tNOUN\n");
        assert_eq!(m.normal_forms("люди"), vec!["человек"]);
    }

    #[test]
    fn test_multiple_normal_forms() {
        let mut m = DictionaryMorphology::builtin();
        m.extend_from_tsv("постоянно\tпостоянно\tADVB\nпостоянно\tпостоянный\tADJS\n");
        assert_eq!(m.normal_forms("постоянно"), vec!["постоянно", "постоянный"]);
        assert!(!m.is_function_word("постоянно"));
    }

    #[test]
    fn test_word_with_content_reading_is_not_function_word() {
        let mut m = DictionaryMorphology::builtin();
        m.extend_from_tsv("так\tтак\tADVB\n");
        assert!(!m.is_function_word("так"));
    }

    #[test]
    fn test_tsv_skips_comments_and_short_lines() {
        let mut m = DictionaryMorphology::default();
        let added = m.extend_from_tsv("# header\n\nодин\nлеса\tлес\tNOUN\nлеса\tлес\tNOUN\n");
        assert_eq!(added, 1);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_yo_lookup_falls_back_to_ye() {
        let mut m = DictionaryMorphology::default();
        m.extend_from_tsv("елка\tелка\tNOUN\n");
        assert_eq!(m.normal_forms("ёлка"), vec!["елка"]);
    }

    #[test]
    fn test_pos_tags() {
        assert_eq!(PartOfSpeech::from_tag("prep"), PartOfSpeech::Preposition);
        assert_eq!(PartOfSpeech::from_tag("XYZ"), PartOfSpeech::Unknown);
        assert!(PartOfSpeech::Particle.is_function_word());
        assert!(!PartOfSpeech::Pronoun.is_function_word());
    }
}
