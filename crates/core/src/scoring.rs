use crate::embeddings::cosine_similarity;
use crate::highlight::TermMatcher;
use crate::models::TextUnit;
use crate::segment::{normalize_whitespace, trim_punctuation, word_spans};
use crate::traits::{UnitMatch, UnitScorer};
use std::ops::Range;

/// Case-insensitive containment of any expansion term; binary score.
pub struct LiteralScorer {
    matcher: TermMatcher,
}

impl LiteralScorer {
    pub fn new(matcher: TermMatcher) -> Self {
        Self { matcher }
    }
}

impl UnitScorer for LiteralScorer {
    fn score(&self, unit: &TextUnit, _embedding: Option<&[f32]>) -> Option<UnitMatch> {
        let terms = self.matcher.matching_terms(&unit.text);
        if terms.is_empty() {
            return None;
        }

        Some(UnitMatch { score: 1.0, terms })
    }
}

/// Normalized Levenshtein similarity between the query and the best window of
/// words in the unit. Windows span the query's word count plus or minus one.
pub struct FuzzyScorer {
    query: String,
    query_words: usize,
    threshold: f64,
}

impl FuzzyScorer {
    pub fn new(query: &str, threshold: f64) -> Self {
        let query = normalize_whitespace(query).to_lowercase();
        let query_words = query.split(' ').filter(|word| !word.is_empty()).count().max(1);
        Self {
            query,
            query_words,
            threshold,
        }
    }

    /// Best ratio and the byte range of the window that produced it.
    pub fn best_window(&self, text: &str) -> Option<(f64, Range<usize>)> {
        let words = word_spans(text);
        if words.is_empty() || self.query.is_empty() {
            return None;
        }

        let largest = (self.query_words + 1).min(words.len());
        let smallest = self.query_words.saturating_sub(1).max(1).min(largest);
        let mut best: Option<(f64, Range<usize>)> = None;

        for size in smallest..=largest {
            for window in words.windows(size) {
                let range = trim_punctuation(text, window[0].start..window[size - 1].end);
                let candidate = normalize_whitespace(&text[range.clone()]).to_lowercase();
                let ratio = strsim::normalized_levenshtein(&self.query, &candidate);

                if best.as_ref().map_or(true, |(score, _)| ratio > *score) {
                    best = Some((ratio, range));
                }
            }
        }

        best
    }
}

impl UnitScorer for FuzzyScorer {
    fn score(&self, unit: &TextUnit, _embedding: Option<&[f32]>) -> Option<UnitMatch> {
        let (ratio, range) = self.best_window(&unit.text)?;
        if ratio < self.threshold {
            return None;
        }

        Some(UnitMatch {
            score: ratio.clamp(0.0, 1.0),
            terms: vec![unit.text[range].to_string()],
        })
    }
}

/// Cosine similarity between the query vector and the unit's corpus vector.
pub struct SemanticScorer {
    query_vector: Vec<f32>,
    threshold: f64,
    keywords: TermMatcher,
}

impl SemanticScorer {
    /// `keywords` marks literal query words inside semantic hits.
    pub fn new(query_vector: Vec<f32>, threshold: f64, keywords: TermMatcher) -> Self {
        Self {
            query_vector,
            threshold,
            keywords,
        }
    }
}

impl UnitScorer for SemanticScorer {
    fn score(&self, unit: &TextUnit, embedding: Option<&[f32]>) -> Option<UnitMatch> {
        let similarity = cosine_similarity(&self.query_vector, embedding?);
        if similarity <= self.threshold {
            return None;
        }

        Some(UnitMatch {
            score: similarity.clamp(0.0, 1.0),
            terms: self.keywords.matching_terms(&unit.text),
        })
    }
}

/// Query words worth highlighting in semantic results.
pub fn keyword_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| word.chars().count() > 2)
        .map(str::to_string)
        .collect()
}
