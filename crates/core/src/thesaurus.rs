use crate::error::IngestError;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

const MAX_EXPANSIONS: usize = 32;

/// Source of related terms for query expansion.
pub trait TermExpander: Send + Sync {
    /// Terms related to `term`, excluding `term` itself. Lookup is case-insensitive.
    fn related(&self, term: &str) -> Vec<String>;

    /// The query, its related terms, and one-word-substituted variants.
    fn expand_query(&self, query: &str) -> Vec<String> {
        let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut terms = vec![normalized.clone()];
        let push = |candidate: String, terms: &mut Vec<String>| {
            if terms.len() < MAX_EXPANSIONS
                && !terms.iter().any(|existing| existing.eq_ignore_ascii_case(&candidate))
            {
                terms.push(candidate);
            }
        };

        for related in self.related(&normalized) {
            push(related, &mut terms);
        }

        let words: Vec<&str> = normalized.split(' ').collect();
        if words.len() > 1 {
            for (position, word) in words.iter().enumerate() {
                for related in self.related(word) {
                    let mut variant = words.clone();
                    variant[position] = related.as_str();
                    push(variant.join(" "), &mut terms);
                }
            }
        }

        terms
    }
}

/// In-memory symmetric thesaurus.
#[derive(Debug, Clone, Default)]
pub struct Thesaurus {
    relations: HashMap<String, BTreeSet<String>>,
}

impl Thesaurus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every term in a group becomes related to every other term in it.
    pub fn add_group<I, S>(&mut self, group: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let members: Vec<String> = group
            .into_iter()
            .map(|term| term.as_ref().trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();

        for member in &members {
            let entry = self.relations.entry(member.clone()).or_default();
            for other in &members {
                if other != member {
                    entry.insert(other.clone());
                }
            }
        }
    }

    pub fn from_groups<G, I, S>(groups: G) -> Self
    where
        G: IntoIterator<Item = I>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut thesaurus = Self::new();
        for group in groups {
            thesaurus.add_group(group);
        }
        thesaurus
    }

    /// Loads a JSON object of `term -> [related terms]`.
    pub fn from_json_str(json: &str) -> Result<Self, IngestError> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(json)
            .map_err(|error| IngestError::InvalidArgument(format!("thesaurus json: {error}")))?;

        let mut keys: Vec<&String> = raw.keys().collect();
        keys.sort();

        let mut thesaurus = Self::new();
        for key in keys {
            for related in &raw[key] {
                thesaurus.add_group([key.as_str(), related.as_str()]);
            }
        }
        Ok(thesaurus)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, IngestError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

impl TermExpander for Thesaurus {
    fn related(&self, term: &str) -> Vec<String> {
        self.relations
            .get(&term.trim().to_lowercase())
            .map(|related| related.iter().cloned().collect())
            .unwrap_or_default()
    }
}
