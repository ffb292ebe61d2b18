pub mod archive;
pub mod corpus;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod export;
pub mod extractor;
pub mod highlight;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod progress;
pub mod scoring;
pub mod segment;
pub mod session;
pub mod stats;
pub mod thesaurus;
pub mod traits;

pub use archive::{ArchiveEntry, ArchiveExpander, ExpandedArchive, SkippedEntry};
pub use corpus::{Corpus, CorpusEmbeddings};
pub use embeddings::{
    cosine_similarity, CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use engine::MatchEngine;
pub use error::{ExportError, IngestError, SearchError};
pub use export::{export_csv, export_csv_file, write_csv, EXPORT_HEADER};
pub use extractor::{
    DocumentReader, DocumentReaders, DocxReader, ExtractedText, PageText, PdfReader, PlainTextReader,
};
pub use highlight::{ContextWindow, HighlightMarker, ResultFormatter, Snippet, TermMatcher};
pub use ingest::{
    collect_uploads, digest_document, discover_documents, process_uploads, UploadSource,
    UploadedFile, EMPTY_EXTRACTION_NOTE,
};
pub use models::{
    Document, FileOutcome, FileStatus, InputKind, Location, MatchRecord, MatchStrategy,
    ProcessingOptions, ProcessingSummary, SearchOptions, SourceType, TextUnit, WordBox,
    DEFAULT_FUZZY_THRESHOLD, DEFAULT_SEMANTIC_THRESHOLD,
};
pub use ocr::{HttpOcrEngine, OcrEndpointConfig, OcrEngine};
pub use progress::{NoProgress, ProgressEvent, ProgressReporter, TracingProgress};
pub use scoring::{FuzzyScorer, LiteralScorer, SemanticScorer};
pub use session::SearchSession;
pub use stats::DocumentStats;
pub use thesaurus::{TermExpander, Thesaurus};
pub use traits::{UnitMatch, UnitScorer};
