use crate::corpus::Corpus;
use crate::embeddings::Embedder;
use crate::engine::MatchEngine;
use crate::error::{ExportError, IngestError, SearchError};
use crate::export::export_csv;
use crate::extractor::DocumentReaders;
use crate::highlight::{ContextWindow, ResultFormatter, Snippet};
use crate::ingest::{collect_uploads, process_uploads, UploadedFile};
use crate::models::{MatchRecord, ProcessingOptions, ProcessingSummary, SearchOptions};
use crate::ocr::OcrEngine;
use crate::progress::{NoProgress, ProgressReporter};
use crate::thesaurus::TermExpander;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Owns one Corpus and the collaborators that fill and query it.
pub struct SearchSession {
    id: Uuid,
    corpus: Corpus,
    engine: MatchEngine,
    readers: Arc<DocumentReaders>,
    options: ProcessingOptions,
    progress: Arc<dyn ProgressReporter>,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new(ProcessingOptions::default())
    }
}

impl SearchSession {
    pub fn new(options: ProcessingOptions) -> Self {
        let engine = MatchEngine::new().with_batch_size(options.embedding_batch_size);
        Self {
            id: Uuid::new_v4(),
            corpus: Corpus::new(),
            engine,
            readers: Arc::new(DocumentReaders::default()),
            options,
            progress: Arc::new(NoProgress),
        }
    }

    /// Installs an OCR fallback for blank PDF pages unless OCR is disabled.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        if self.options.ocr_enabled {
            self.readers = Arc::new(DocumentReaders::new(Some(ocr)));
        } else {
            info!(session = %self.id, "ocr disabled; engine ignored");
        }
        self
    }

    pub fn with_readers(mut self, readers: DocumentReaders) -> Self {
        self.readers = Arc::new(readers);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.engine = self.engine.with_embedder(embedder);
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn TermExpander>) -> Self {
        self.engine = self.engine.with_expander(expander);
        self
    }

    pub fn with_formatter(mut self, formatter: ResultFormatter) -> Self {
        self.engine = self.engine.with_formatter(formatter);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    pub fn formatter(&self) -> &ResultFormatter {
        self.engine.formatter()
    }

    /// Replaces the corpus with the documents read from `files`.
    pub async fn process_uploads(&mut self, files: Vec<UploadedFile>) -> ProcessingSummary {
        let (documents, summary) = process_uploads(
            files,
            Arc::clone(&self.readers),
            &self.options,
            self.progress.as_ref(),
        )
        .await;

        self.corpus = Corpus::from_documents(documents);
        info!(
            session = %self.id,
            documents = self.corpus.documents().len(),
            units = self.corpus.unit_count(),
            "corpus rebuilt"
        );

        if self.options.precompute_embeddings && self.engine.has_embedder() && !self.corpus.is_empty() {
            if let Err(error) = self
                .engine
                .prepare_embeddings(&self.corpus, self.progress.as_ref())
                .await
            {
                warn!(session = %self.id, reason = %error, "corpus embeddings not precomputed");
            }
        }

        summary
    }

    /// Reads files and folders from disk; folders are walked recursively.
    pub async fn process_paths(&mut self, paths: &[PathBuf]) -> Result<ProcessingSummary, IngestError> {
        let files = collect_uploads(paths)?;
        Ok(self.process_uploads(files).await)
    }

    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<MatchRecord>, SearchError> {
        self.engine.search(&self.corpus, query, options).await
    }

    pub fn format(&self, record: &MatchRecord, window: ContextWindow) -> Result<Snippet, SearchError> {
        self.engine.formatter().format(record, window)
    }

    pub fn clear(&mut self) {
        self.corpus.clear();
        info!(session = %self.id, "corpus cleared");
    }

    pub fn export(&self, records: &[MatchRecord]) -> Result<Vec<u8>, ExportError> {
        export_csv(records, self.engine.formatter().marker())
    }
}
