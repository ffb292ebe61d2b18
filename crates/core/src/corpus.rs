use crate::models::{Document, TextUnit};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Unit vectors in corpus order, produced by one embedder.
#[derive(Debug, Clone)]
pub struct CorpusEmbeddings {
    pub model: String,
    pub vectors: Vec<Vec<f32>>,
}

impl CorpusEmbeddings {
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        self.vectors.get(position).map(Vec::as_slice)
    }
}

/// Session-scoped collection of documents in upload order.
///
/// Documents are appended, never mutated; duplicate uploads are kept as
/// separate documents. The embedding table is built at most once per corpus
/// state and discarded whenever documents change.
#[derive(Debug, Default)]
pub struct Corpus {
    documents: Vec<Document>,
    embeddings: OnceCell<Arc<CorpusEmbeddings>>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self {
            documents,
            embeddings: OnceCell::new(),
        }
    }

    pub fn add_document(&mut self, document: Document) {
        self.documents.push(document);
        self.embeddings = OnceCell::new();
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.embeddings = OnceCell::new();
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, document_id: &str) -> Option<&Document> {
        self.documents
            .iter()
            .find(|document| document.document_id == document_id)
    }

    /// Every unit, ordered by upload order then location.
    pub fn all_units(&self) -> impl Iterator<Item = &TextUnit> + '_ {
        self.documents.iter().flat_map(|document| document.units().iter())
    }

    /// Units paired with the filename of their owning document.
    pub fn units_with_filenames(&self) -> impl Iterator<Item = (&str, &TextUnit)> + '_ {
        self.documents.iter().flat_map(|document| {
            document
                .units()
                .iter()
                .map(move |unit| (document.filename.as_str(), unit))
        })
    }

    pub fn unit_count(&self) -> usize {
        self.documents.iter().map(|document| document.units().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.unit_count() == 0
    }

    pub(crate) fn embedding_cell(&self) -> &OnceCell<Arc<CorpusEmbeddings>> {
        &self.embeddings
    }

    pub fn cached_embeddings(&self) -> Option<Arc<CorpusEmbeddings>> {
        self.embeddings.get().cloned()
    }
}
