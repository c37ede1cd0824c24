//! Immutable vocabulary table and its read-only query contract.
//!
//! The table is built exactly once at startup, either from the embedded
//! JSON or from a file named by `VOCABULARY_PATH`. Nothing mutates it
//! afterwards, so concurrent request handlers share it without locking.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Vocabulary shipped with the binary; used unless a file override is set.
const EMBEDDED_VOCABULARY: &str = include_str!("../data/vocabulary.json");

/// Part-of-speech / usage grouping of a vocabulary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordCategory {
    Noun,
    Verb,
    Adjective,
    Pronoun,
    Adverb,
    Preposition,
    Phrase,
    Greeting,
    Number,
    Question,
    Other,
}

impl WordCategory {
    pub const ALL: [WordCategory; 11] = [
        Self::Noun,
        Self::Verb,
        Self::Adjective,
        Self::Pronoun,
        Self::Adverb,
        Self::Preposition,
        Self::Phrase,
        Self::Greeting,
        Self::Number,
        Self::Question,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Noun => "noun",
            Self::Verb => "verb",
            Self::Adjective => "adjective",
            Self::Pronoun => "pronoun",
            Self::Adverb => "adverb",
            Self::Preposition => "preposition",
            Self::Phrase => "phrase",
            Self::Greeting => "greeting",
            Self::Number => "number",
            Self::Question => "question",
            Self::Other => "other",
        }
    }
}

impl FromStr for WordCategory {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == raw)
            .ok_or_else(|| {
                AppError::invalid_request(
                    format!("invalid category: {raw}"),
                    Some("category"),
                    Some("invalid_category"),
                )
            })
    }
}

impl fmt::Display for WordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learner-facing difficulty tier of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl DifficultyLevel {
    pub const ALL: [DifficultyLevel; 3] = [Self::Beginner, Self::Intermediate, Self::Advanced];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl FromStr for DifficultyLevel {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == raw)
            .ok_or_else(|| {
                AppError::invalid_request(
                    format!("invalid difficulty level: {raw}"),
                    Some("difficulty"),
                    Some("invalid_difficulty"),
                )
            })
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translated sentence illustrating a vocabulary entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleSentence {
    pub hebrew: String,
    pub english: String,
}

/// One Hebrew/English vocabulary pair with learner metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabEntry {
    pub hebrew: String,
    pub english: String,
    pub category: WordCategory,
    pub difficulty: DifficultyLevel,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronunciation_guide: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_sentence: Option<ExampleSentence>,
}

/// Filters applied by [`VocabStore::random_sample`].
#[derive(Debug, Default)]
pub struct SampleFilter {
    pub category: Option<WordCategory>,
    pub difficulty: Option<DifficultyLevel>,
    pub exclude: Vec<String>,
}

/// Read-only vocabulary table plus the flat bidirectional lookup maps kept
/// for the legacy resolver path.
pub struct VocabStore {
    entries: Vec<VocabEntry>,
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
}

impl VocabStore {
    /// Parses a vocabulary table from JSON.
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        let entries: Vec<VocabEntry> = serde_json::from_str(raw)
            .map_err(|err| AppError::internal(format!("invalid vocabulary data: {err}")))?;
        if entries.is_empty() {
            return Err(AppError::internal("vocabulary data contains no entries"));
        }

        let forward = entries
            .iter()
            .map(|entry| (entry.hebrew.clone(), entry.english.clone()))
            .collect();
        let reverse = entries
            .iter()
            .map(|entry| (entry.english.clone(), entry.hebrew.clone()))
            .collect();

        Ok(Self {
            entries,
            forward,
            reverse,
        })
    }

    /// Loads the vocabulary from `path` when set, else the embedded table.
    pub fn load(path: Option<&str>) -> Result<Self, AppError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|err| {
                    AppError::internal(format!("failed to read vocabulary file {path:?}: {err}"))
                })?;
                Self::from_json(&raw)
            }
            None => Self::from_json(EMBEDDED_VOCABULARY),
        }
    }

    pub fn all(&self) -> &[VocabEntry] {
        &self.entries
    }

    /// English meaning of a Hebrew word, via the flat forward map.
    pub fn english_for(&self, hebrew: &str) -> Option<&str> {
        self.forward.get(hebrew).map(String::as_str)
    }

    /// Hebrew form of an English word, via the flat reverse map.
    pub fn hebrew_for(&self, english: &str) -> Option<&str> {
        self.reverse.get(english).map(String::as_str)
    }

    /// Case-insensitive substring search over both sides of every pair.
    pub fn search(&self, query: &str) -> Vec<&VocabEntry> {
        let query = query.to_lowercase();
        self.entries
            .iter()
            .filter(|entry| {
                entry.hebrew.to_lowercase().contains(&query)
                    || entry.english.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Draws up to `count` distinct entries matching `filter`.
    ///
    /// Returns an empty vector when the filters match nothing; callers
    /// decide whether to relax them.
    pub fn random_sample(&self, count: usize, filter: &SampleFilter) -> Vec<&VocabEntry> {
        let candidates: Vec<&VocabEntry> = self
            .entries
            .iter()
            .filter(|entry| filter.category.map_or(true, |c| entry.category == c))
            .filter(|entry| filter.difficulty.map_or(true, |d| entry.difficulty == d))
            .filter(|entry| !filter.exclude.iter().any(|word| *word == entry.hebrew))
            .collect();

        let mut rng = rand::thread_rng();
        candidates
            .choose_multiple(&mut rng, count.min(candidates.len()))
            .copied()
            .collect()
    }

    /// Entry counts by category, by difficulty, and by both combined.
    pub fn stats(&self) -> VocabStats {
        let count = |predicate: &dyn Fn(&VocabEntry) -> bool| {
            self.entries.iter().filter(|e| predicate(e)).count()
        };

        let by_category = WordCategory::ALL
            .into_iter()
            .map(|c| (c.as_str().to_string(), count(&|e| e.category == c)))
            .collect();
        let by_difficulty = DifficultyLevel::ALL
            .into_iter()
            .map(|d| (d.as_str().to_string(), count(&|e| e.difficulty == d)))
            .collect();
        let by_category_and_difficulty = WordCategory::ALL
            .into_iter()
            .map(|c| {
                let per_level = DifficultyLevel::ALL
                    .into_iter()
                    .map(|d| {
                        (
                            d.as_str().to_string(),
                            count(&|e| e.category == c && e.difficulty == d),
                        )
                    })
                    .collect();
                (c.as_str().to_string(), per_level)
            })
            .collect();

        VocabStats {
            total_words: self.entries.len(),
            by_category,
            by_difficulty,
            by_category_and_difficulty,
        }
    }
}

/// Aggregate counts returned by the stats endpoint.
#[derive(Debug, Serialize)]
pub struct VocabStats {
    pub total_words: usize,
    pub by_category: HashMap<String, usize>,
    pub by_difficulty: HashMap<String, usize>,
    pub by_category_and_difficulty: HashMap<String, HashMap<String, usize>>,
}
