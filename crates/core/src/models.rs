use crate::highlight::ContextWindow;
use crate::stats::DocumentStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Docx,
    Txt,
}

impl SourceType {
    pub fn extension(self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Docx => "docx",
            SourceType::Txt => "txt",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("pdf") {
            Some(SourceType::Pdf)
        } else if ext.eq_ignore_ascii_case("docx") {
            Some(SourceType::Docx)
        } else if ext.eq_ignore_ascii_case("txt") {
            Some(SourceType::Txt)
        } else {
            None
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// What an uploaded file is, judged by its name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Document(SourceType),
    Archive,
    Unsupported,
}

impl InputKind {
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        if ext.eq_ignore_ascii_case("zip") {
            return InputKind::Archive;
        }

        SourceType::from_extension(ext)
            .map(InputKind::Document)
            .unwrap_or(InputKind::Unsupported)
    }
}

/// 1-based position of a unit inside its document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "kind", content = "index", rename_all = "lowercase")]
pub enum Location {
    Page(u32),
    Paragraph(u32),
    Line(u32),
}

impl Location {
    pub fn index(self) -> u32 {
        match self {
            Location::Page(index) | Location::Paragraph(index) | Location::Line(index) => index,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Page(index) => write!(f, "page {index}"),
            Location::Paragraph(index) => write!(f, "paragraph {index}"),
            Location::Line(index) => write!(f, "line {index}"),
        }
    }
}

/// Word-level bounding box in page space, only used for visual highlighting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordBox {
    pub word: String,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextUnit {
    pub document_id: String,
    pub location: Location,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub word_boxes: Vec<WordBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub filename: String,
    pub origin: Option<String>,
    pub source_type: SourceType,
    pub byte_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub note: Option<String>,
    pub stats: DocumentStats,
    units: Vec<TextUnit>,
}

impl Document {
    pub fn new(
        document_id: String,
        filename: String,
        source_type: SourceType,
        byte_size: u64,
        units: Vec<TextUnit>,
    ) -> Self {
        let stats = DocumentStats::from_units(&units);
        Self {
            document_id,
            filename,
            origin: None,
            source_type,
            byte_size,
            uploaded_at: Utc::now(),
            note: None,
            stats,
            units,
        }
    }

    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn units(&self) -> &[TextUnit] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    #[default]
    Literal,
    Fuzzy,
    Semantic,
}

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.72;
pub const DEFAULT_SEMANTIC_THRESHOLD: f64 = 0.5;

impl MatchStrategy {
    pub fn default_threshold(self) -> f64 {
        match self {
            MatchStrategy::Literal => 1.0,
            MatchStrategy::Fuzzy => DEFAULT_FUZZY_THRESHOLD,
            MatchStrategy::Semantic => DEFAULT_SEMANTIC_THRESHOLD,
        }
    }

    /// Literal results keep corpus order; the other strategies sort by score.
    pub fn is_ranked(self) -> bool {
        !matches!(self, MatchStrategy::Literal)
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchStrategy::Literal => "literal",
            MatchStrategy::Fuzzy => "fuzzy",
            MatchStrategy::Semantic => "semantic",
        };
        f.write_str(name)
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "literal" | "keyword" => Ok(MatchStrategy::Literal),
            "fuzzy" => Ok(MatchStrategy::Fuzzy),
            "semantic" => Ok(MatchStrategy::Semantic),
            other => Err(format!("unknown match strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub document_id: String,
    pub filename: String,
    pub location: Location,
    pub score: f64,
    pub strategy: MatchStrategy,
    pub matched_text: String,
    pub highlighted_text: String,
    pub matched_terms: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub strategy: MatchStrategy,
    pub threshold: Option<f64>,
    pub top_k: usize,
    pub expand_query: bool,
    pub context: ContextWindow,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            strategy: MatchStrategy::Literal,
            threshold: None,
            top_k: 10,
            expand_query: false,
            context: ContextWindow::default(),
        }
    }
}

impl SearchOptions {
    pub fn new(strategy: MatchStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn expand_query(mut self, expand: bool) -> Self {
        self.expand_query = expand;
        self
    }

    /// Threshold on the normalized [0,1] scale. Fuzzy thresholds above 1 are percentages.
    pub fn effective_threshold(&self) -> f64 {
        let raw = self
            .threshold
            .unwrap_or_else(|| self.strategy.default_threshold());
        match self.strategy {
            MatchStrategy::Fuzzy if raw > 1.0 => (raw / 100.0).min(1.0),
            _ => raw,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    pub max_workers: usize,
    pub ocr_enabled: bool,
    pub max_entry_bytes: u64,
    pub embedding_batch_size: usize,
    pub precompute_embeddings: bool,
    /// Parent of the per-call scratch directory; the system temp dir when `None`.
    pub scratch_root: Option<PathBuf>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        let max_workers = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);

        Self {
            max_workers,
            ocr_enabled: true,
            max_entry_bytes: 256 * 1024 * 1024,
            embedding_batch_size: 64,
            precompute_embeddings: false,
            scratch_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileStatus {
    Indexed { units: usize },
    Empty { note: String },
    Failed { reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub filename: String,
    pub origin: Option<String>,
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn display_name(&self) -> String {
        match &self.origin {
            Some(archive) => format!("{archive}!{}", self.filename),
            None => self.filename.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingSummary {
    pub files: Vec<FileOutcome>,
    pub total_words: usize,
}

impl ProcessingSummary {
    pub fn documents_processed(&self) -> usize {
        self.files
            .iter()
            .filter(|file| {
                matches!(
                    file.status,
                    FileStatus::Indexed { .. } | FileStatus::Empty { .. }
                )
            })
            .count()
    }

    pub fn documents_failed(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.status, FileStatus::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.files
            .iter()
            .filter(|file| matches!(file.status, FileStatus::Skipped { .. }))
            .count()
    }

    pub fn total_units(&self) -> usize {
        self.files
            .iter()
            .map(|file| match file.status {
                FileStatus::Indexed { units } => units,
                _ => 0,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
