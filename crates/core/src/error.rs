use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf is encrypted or password-protected")]
    Encrypted,

    #[error("docx parse error: {0}")]
    Docx(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive entry {name} exceeds {limit} bytes")]
    EntryTooLarge { name: String, limit: u64 },

    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("multimodal OCR failed: {0}")]
    OcrFailed(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("embedder returned an invalid vector: {0}")]
    InvalidEmbedding(String),

    #[error("invalid highlight pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SearchError {
    /// True when the caller may retry with a strategy that needs no embedder.
    pub fn is_embedding_unavailable(&self) -> bool {
        matches!(self, SearchError::EmbeddingUnavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
