//! Shared TF-IDF feature extractor.
//!
//! Pure Rust TF-IDF inference over a vectorizer exported as JSON by the
//! training pipeline. Follows scikit-learn's `TfidfVectorizer.transform`:
//! preprocess, analyze into n-grams, count vocabulary hits, weight, normalize.

use crate::SentimenError;
use crate::artifact::{invalid, read_artifact};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

/// scikit-learn's default `token_pattern`: words of two or more characters.
pub const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

/// Runs of two or more whitespace characters, collapsed before char analysis.
static WHITE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s\s+").unwrap());

/// Text → vector capability shared by both classifiers.
pub trait FeatureExtractor: Send + Sync {
    /// Deterministic for a given fitted state. Unknown terms are ignored.
    fn vectorize(&self, text: &str) -> FeatureVector;
    /// Number of features every produced vector has.
    fn dimension(&self) -> usize;
}

/// Sparse feature vector with entries sorted by feature index.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    dim: usize,
    entries: Vec<(usize, f64)>,
}

impl FeatureVector {
    /// Build a vector from `(index, value)` pairs. Indices must be unique and below `dim`.
    pub fn new(dim: usize, mut entries: Vec<(usize, f64)>) -> Result<Self, SentimenError> {
        entries.sort_by_key(|&(idx, _)| idx);
        if let Some(&(idx, _)) = entries.iter().find(|&&(idx, _)| idx >= dim) {
            return Err(SentimenError::Shape(format!(
                "feature index {idx} out of range for dimension {dim}"
            )));
        }
        if entries.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(SentimenError::Shape("duplicate feature index".into()));
        }
        Ok(Self { dim, entries })
    }

    pub fn zeros(dim: usize) -> Self {
        Self { dim, entries: Vec::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Dot product with a dense row of length `dim`.
    pub fn dot(&self, row: &[f64]) -> f64 {
        self.entries.iter().map(|&(idx, val)| val * row[idx]).sum()
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Analyzer {
    #[default]
    Word,
    Char,
    CharWb,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

/// Vectorizer as exported by the training pipeline.
#[derive(Debug, Deserialize)]
pub struct VectorizerArtifact {
    pub vocabulary: HashMap<String, usize>,
    #[serde(default)]
    pub idf: Option<Vec<f64>>,
    #[serde(default)]
    pub analyzer: Analyzer,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: [usize; 2],
    #[serde(default = "default_true")]
    pub lowercase: bool,
    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,
    #[serde(default)]
    pub stop_words: Vec<String>,
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default = "default_norm")]
    pub norm: Option<Norm>,
}

fn default_ngram_range() -> [usize; 2] {
    [1, 1]
}

fn default_true() -> bool {
    true
}

fn default_token_pattern() -> String {
    DEFAULT_TOKEN_PATTERN.into()
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

/// Loaded vectorizer ready for inference.
#[derive(Debug)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Option<Vec<f64>>,
    analyzer: Analyzer,
    min_n: usize,
    max_n: usize,
    lowercase: bool,
    token_pattern: Regex,
    stop_words: HashSet<String>,
    binary: bool,
    sublinear_tf: bool,
    norm: Option<Norm>,
}

impl TfidfVectorizer {
    /// Validate an exported vectorizer and compile it for inference.
    pub fn new(artifact: VectorizerArtifact) -> Result<Self, SentimenError> {
        let dim = artifact.vocabulary.len();

        let mut seen = vec![false; dim];
        for (term, &idx) in &artifact.vocabulary {
            if idx >= dim {
                return Err(SentimenError::Shape(format!(
                    "vocabulary term {term:?} has index {idx}, vocabulary size is {dim}"
                )));
            }
            if std::mem::replace(&mut seen[idx], true) {
                return Err(SentimenError::Shape(format!(
                    "vocabulary index {idx} assigned to more than one term"
                )));
            }
        }

        if let Some(idf) = &artifact.idf {
            if idf.len() != dim {
                return Err(SentimenError::Shape(format!(
                    "idf has {} entries, vocabulary size is {dim}",
                    idf.len()
                )));
            }
            if idf.iter().any(|v| !v.is_finite()) {
                return Err(SentimenError::Shape("idf contains non-finite values".into()));
            }
        }

        let [min_n, max_n] = artifact.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(SentimenError::Shape(format!(
                "invalid ngram_range [{min_n}, {max_n}]"
            )));
        }

        let token_pattern = Regex::new(&artifact.token_pattern).map_err(|e| {
            SentimenError::Shape(format!("token_pattern does not compile: {e}"))
        })?;
        // Group 0 plus at most one capture group.
        if token_pattern.captures_len() > 2 {
            return Err(SentimenError::Shape(
                "token_pattern has more than one capture group".into(),
            ));
        }

        Ok(Self {
            vocabulary: artifact.vocabulary,
            idf: artifact.idf,
            analyzer: artifact.analyzer,
            min_n,
            max_n,
            lowercase: artifact.lowercase,
            token_pattern,
            stop_words: artifact.stop_words.into_iter().collect(),
            binary: artifact.binary,
            sublinear_tf: artifact.sublinear_tf,
            norm: artifact.norm,
        })
    }

    /// Load from an exported JSON file. Returns the vectorizer and its fingerprint.
    pub fn load(path: &Path) -> Result<(Self, String), SentimenError> {
        let (artifact, hash) = read_artifact(path)?;
        let vectorizer = Self::new(artifact).map_err(|e| invalid(path, e))?;
        Ok((vectorizer, hash))
    }

    pub fn analyzer(&self) -> Analyzer {
        self.analyzer
    }

    /// Split text into tokens using the token pattern.
    fn tokenize<'t>(&self, text: &'t str) -> Vec<&'t str> {
        if self.token_pattern.captures_len() > 1 {
            self.token_pattern
                .captures_iter(text)
                .filter_map(|c| c.get(1).map(|m| m.as_str()))
                .collect()
        } else {
            self.token_pattern.find_iter(text).map(|m| m.as_str()).collect()
        }
    }

    /// Produce the n-gram counts for one document.
    fn analyze(&self, text: &str) -> HashMap<String, u32> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        match self.analyzer {
            Analyzer::Word => {
                let tokens: Vec<&str> = self
                    .tokenize(&text)
                    .into_iter()
                    .filter(|t| !self.stop_words.contains(*t))
                    .collect();
                word_ngrams(&tokens, self.min_n, self.max_n)
            }
            Analyzer::Char => char_ngrams(&text, self.min_n, self.max_n),
            Analyzer::CharWb => char_wb_ngrams(&text, self.min_n, self.max_n),
        }
    }
}

impl FeatureExtractor for TfidfVectorizer {
    fn vectorize(&self, text: &str) -> FeatureVector {
        // BTreeMap keeps indices ordered so sums below run in a fixed order.
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for (gram, count) in self.analyze(text) {
            if let Some(&idx) = self.vocabulary.get(&gram) {
                *counts.entry(idx).or_insert(0.0) += count as f64;
            }
        }

        let mut entries: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(idx, count)| {
                let tf = if self.binary {
                    1.0
                } else if self.sublinear_tf {
                    count.ln() + 1.0
                } else {
                    count
                };
                let weight = match &self.idf {
                    Some(idf) => tf * idf[idx],
                    None => tf,
                };
                (idx, weight)
            })
            .collect();

        let norm = match self.norm {
            Some(Norm::L2) => entries.iter().map(|(_, v)| v * v).sum::<f64>().sqrt(),
            Some(Norm::L1) => entries.iter().map(|(_, v)| v.abs()).sum::<f64>(),
            None => 1.0,
        };
        if norm > 0.0 {
            for (_, v) in &mut entries {
                *v /= norm;
            }
        }

        FeatureVector {
            dim: self.dimension(),
            entries,
        }
    }

    fn dimension(&self) -> usize {
        self.vocabulary.len()
    }
}

/// Generate word n-grams and count occurrences.
fn word_ngrams(tokens: &[&str], lo: usize, hi: usize) -> HashMap<String, u32> {
    let mut ngrams = HashMap::new();

    for n in lo..=hi {
        if n > tokens.len() {
            break;
        }
        for window in tokens.windows(n) {
            *ngrams.entry(window.join(" ")).or_insert(0) += 1;
        }
    }

    ngrams
}

/// Generate character n-grams over the whole document.
fn char_ngrams(text: &str, lo: usize, hi: usize) -> HashMap<String, u32> {
    let mut ngrams = HashMap::new();
    let normalized = WHITE_SPACES.replace_all(text, " ");
    let chars: Vec<char> = normalized.chars().collect();

    for n in lo..=hi {
        if n > chars.len() {
            break;
        }
        for window in chars.windows(n) {
            *ngrams.entry(window.iter().collect::<String>()).or_insert(0) += 1;
        }
    }

    ngrams
}

/// Generate char_wb n-grams (whitespace-bounded character n-grams).
///
/// A padded word no longer than `n` is counted once, as itself, and stops
/// the n loop for that word.
fn char_wb_ngrams(text: &str, lo: usize, hi: usize) -> HashMap<String, u32> {
    let mut ngrams = HashMap::new();
    let normalized = WHITE_SPACES.replace_all(text, " ");

    for word in normalized.split_whitespace() {
        let padded: Vec<char> = format!(" {word} ").chars().collect();

        for n in lo..=hi {
            if padded.len() <= n {
                *ngrams.entry(padded.iter().collect::<String>()).or_insert(0) += 1;
                break;
            }
            for window in padded.windows(n) {
                *ngrams.entry(window.iter().collect::<String>()).or_insert(0) += 1;
            }
        }
    }

    ngrams
}
