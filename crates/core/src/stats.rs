use crate::models::TextUnit;
use crate::segment::{ascii_words, split_sentences};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const COMMON_WORD_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentStats {
    pub word_count: usize,
    pub sentence_count: usize,
    pub common_words: Vec<(String, usize)>,
}

impl DocumentStats {
    pub fn from_units(units: &[TextUnit]) -> Self {
        let mut frequencies: HashMap<String, usize> = HashMap::new();
        let mut word_count = 0;
        let mut sentence_count = 0;

        for unit in units {
            for word in ascii_words(&unit.text) {
                word_count += 1;
                *frequencies.entry(word).or_default() += 1;
            }
            sentence_count += split_sentences(&unit.text).len();
        }

        let mut common_words: Vec<(String, usize)> = frequencies.into_iter().collect();
        common_words.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
        common_words.truncate(COMMON_WORD_LIMIT);

        Self {
            word_count,
            sentence_count,
            common_words,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DocumentStats;
    use crate::models::{Location, TextUnit};

    fn unit(index: u32, text: &str) -> TextUnit {
        TextUnit {
            document_id: "doc".to_string(),
            location: Location::Line(index),
            text: text.to_string(),
            word_boxes: Vec::new(),
        }
    }

    #[test]
    fn counts_words_sentences_and_frequent_terms() {
        let units = vec![
            unit(1, "The budget was approved. The plan was not!"),
            unit(2, "Budget review next week"),
        ];

        let stats = DocumentStats::from_units(&units);

        assert_eq!(stats.word_count, 12);
        assert_eq!(stats.sentence_count, 3);
        assert_eq!(stats.common_words[0], ("budget".to_string(), 2));
        assert_eq!(stats.common_words[1], ("the".to_string(), 2));
        assert_eq!(stats.common_words[2], ("was".to_string(), 2));
    }

    #[test]
    fn empty_document_has_zero_stats() {
        assert_eq!(DocumentStats::from_units(&[]), DocumentStats::default());
    }
}
