//! Match highlighting and snippet windows.
//!
//! Spans for every term are collected on the untouched text, merged, and
//! rendered once, so overlapping terms never produce nested markers.

use crate::error::SearchError;
use crate::models::MatchRecord;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightMarker {
    pub open: String,
    pub close: String,
}

impl Default for HighlightMarker {
    fn default() -> Self {
        Self {
            open: "<mark>".to_string(),
            close: "</mark>".to_string(),
        }
    }
}

impl HighlightMarker {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    pub fn strip(&self, text: &str) -> String {
        text.replace(&self.open, "").replace(&self.close, "")
    }
}

/// How much text around the first match a snippet keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextWindow {
    Characters(usize),
    Lines(usize),
    Full,
}

impl Default for ContextWindow {
    fn default() -> Self {
        ContextWindow::Characters(120)
    }
}

/// Case-insensitive literal matcher for a set of terms.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    terms: Vec<String>,
    patterns: Vec<Regex>,
}

impl TermMatcher {
    /// Blank terms are ignored; remaining terms are tried longest first.
    pub fn new<I, S>(terms: I) -> Result<Self, SearchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for term in terms {
            let term = term.as_ref().trim();
            if !term.is_empty() && !unique.iter().any(|seen| seen.to_lowercase() == term.to_lowercase()) {
                unique.push(term.to_string());
            }
        }
        unique.sort_by(|left, right| right.chars().count().cmp(&left.chars().count()));

        let patterns = unique
            .iter()
            .map(|term| {
                RegexBuilder::new(&regex::escape(term))
                    .case_insensitive(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            terms: unique,
            patterns,
        })
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(text))
    }

    /// Terms that occur in `text`, longest first.
    pub fn matching_terms(&self, text: &str) -> Vec<String> {
        self.terms
            .iter()
            .zip(self.patterns.iter())
            .filter(|(_, pattern)| pattern.is_match(text))
            .map(|(term, _)| term.clone())
            .collect()
    }

    /// Sorted, non-overlapping byte ranges covering every occurrence of every term.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        let found: Vec<Range<usize>> = self
            .patterns
            .iter()
            .flat_map(|pattern| pattern.find_iter(text).map(|hit| hit.range()))
            .filter(|range| !range.is_empty())
            .collect();
        merge_spans(found)
    }
}

/// Merges overlapping or touching ranges.
pub fn merge_spans(mut spans: Vec<Range<usize>>) -> Vec<Range<usize>> {
    spans.sort_by_key(|span| (span.start, span.end));

    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans.drain(..) {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Wraps each span of `text` in the marker. `spans` must be sorted and disjoint.
pub fn render(text: &str, spans: &[Range<usize>], marker: &HighlightMarker) -> String {
    let mut out = String::with_capacity(text.len() + spans.len() * (marker.open.len() + marker.close.len()));
    let mut cursor = 0;

    for span in spans {
        out.push_str(&text[cursor..span.start]);
        out.push_str(&marker.open);
        out.push_str(&text[span.clone()]);
        out.push_str(&marker.close);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Snippet {
    pub text: String,
    pub highlights: usize,
    pub truncated_start: bool,
    pub truncated_end: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ResultFormatter {
    marker: HighlightMarker,
}

impl ResultFormatter {
    pub fn new(marker: HighlightMarker) -> Self {
        Self { marker }
    }

    pub fn marker(&self) -> &HighlightMarker {
        &self.marker
    }

    pub fn highlight(&self, text: &str, matcher: &TermMatcher) -> String {
        render(text, &matcher.spans(text), &self.marker)
    }

    pub fn strip(&self, text: &str) -> String {
        self.marker.strip(text)
    }

    /// Highlighted excerpt around the record's first match.
    pub fn format(&self, record: &MatchRecord, window: ContextWindow) -> Result<Snippet, SearchError> {
        let matcher = TermMatcher::new(&record.matched_terms)?;
        Ok(self.snippet(&record.matched_text, &matcher.spans(&record.matched_text), window))
    }

    pub fn snippet(&self, text: &str, spans: &[Range<usize>], window: ContextWindow) -> Snippet {
        let anchor = spans.first().cloned().unwrap_or(0..0);
        let bounds = match window {
            ContextWindow::Full => 0..text.len(),
            ContextWindow::Characters(count) => {
                chars_before(text, anchor.start, count)..chars_after(text, anchor.end, count)
            }
            ContextWindow::Lines(count) => line_window(text, anchor, count),
        };

        let visible: Vec<Range<usize>> = spans
            .iter()
            .filter(|span| span.start < bounds.end && span.end > bounds.start)
            .map(|span| {
                (span.start.max(bounds.start) - bounds.start)..(span.end.min(bounds.end) - bounds.start)
            })
            .collect();

        let excerpt = text[bounds.clone()].replace(['\n', '\r'], " ");
        let truncated_start = bounds.start > 0;
        let truncated_end = bounds.end < text.len();

        let mut rendered = render(&excerpt, &visible, &self.marker);
        if truncated_start {
            rendered.insert_str(0, "...");
        }
        if truncated_end {
            rendered.push_str("...");
        }

        Snippet {
            text: rendered,
            highlights: visible.len(),
            truncated_start,
            truncated_end,
        }
    }
}

fn chars_before(text: &str, from: usize, count: usize) -> usize {
    text[..from]
        .char_indices()
        .rev()
        .take(count)
        .last()
        .map(|(index, _)| index)
        .unwrap_or(from)
}

fn chars_after(text: &str, from: usize, count: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(count)
        .map(|(index, _)| from + index)
        .unwrap_or(text.len())
}

fn line_window(text: &str, anchor: Range<usize>, count: usize) -> Range<usize> {
    let mut starts = vec![0];
    starts.extend(text.match_indices('\n').map(|(index, _)| index + 1));

    let line_of = |offset: usize| starts.partition_point(|start| *start <= offset).saturating_sub(1);
    let first = line_of(anchor.start).saturating_sub(count);
    let last = line_of(anchor.end.saturating_sub(1).max(anchor.start)) + count;

    let start = starts[first];
    let end = starts
        .get(last + 1)
        .map(|next| next.saturating_sub(1))
        .unwrap_or(text.len());
    start..end.max(start)
}
