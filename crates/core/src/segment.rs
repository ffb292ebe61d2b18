use std::ops::Range;

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Byte ranges of whitespace-separated words, in order.
pub fn word_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;

    for (index, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(begin) = start.take() {
                spans.push(begin..index);
            }
        } else if start.is_none() {
            start = Some(index);
        }
    }

    if let Some(begin) = start {
        spans.push(begin..text.len());
    }

    spans
}

/// Shrinks `range` so it neither starts nor ends with punctuation.
pub fn trim_punctuation(text: &str, range: Range<usize>) -> Range<usize> {
    let slice = &text[range.clone()];
    let leading = slice.len() - slice.trim_start_matches(|c: char| !c.is_alphanumeric()).len();
    let trailing = slice.len() - slice.trim_end_matches(|c: char| !c.is_alphanumeric()).len();

    if leading + trailing >= slice.len() {
        return range;
    }

    (range.start + leading)..(range.end - trailing)
}

pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Lower-cased runs of at least two ASCII letters.
pub fn ascii_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|word| word.len() >= 2)
        .map(|word| word.to_ascii_lowercase())
}
