use crate::models::TextUnit;

/// Outcome of scoring one unit against a prepared query.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitMatch {
    /// Normalized to [0, 1].
    pub score: f64,
    /// Literal substrings of the unit to highlight.
    pub terms: Vec<String>,
}

/// Common scoring capability shared by every match strategy.
///
/// A scorer is built once per query. `embedding` is the unit's corpus vector
/// when the strategy needs one.
pub trait UnitScorer: Send + Sync {
    fn score(&self, unit: &TextUnit, embedding: Option<&[f32]>) -> Option<UnitMatch>;
}
