use crate::corpus::{Corpus, CorpusEmbeddings};
use crate::embeddings::{validate_batch, Embedder};
use crate::highlight::{ResultFormatter, TermMatcher};
use crate::models::{MatchRecord, MatchStrategy, SearchOptions};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::scoring::{keyword_terms, FuzzyScorer, LiteralScorer, SemanticScorer};
use crate::thesaurus::TermExpander;
use crate::traits::UnitScorer;
use crate::SearchError;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_BATCH_SIZE: usize = 64;

/// Scores every corpus unit against a query with one strategy per call.
pub struct MatchEngine {
    embedder: Option<Arc<dyn Embedder>>,
    expander: Option<Arc<dyn TermExpander>>,
    formatter: ResultFormatter,
    batch_size: usize,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchEngine {
    pub fn new() -> Self {
        Self {
            embedder: None,
            expander: None,
            formatter: ResultFormatter::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn TermExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn with_formatter(mut self, formatter: ResultFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn formatter(&self) -> &ResultFormatter {
        &self.formatter
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    fn embedder(&self) -> Result<&Arc<dyn Embedder>, SearchError> {
        self.embedder
            .as_ref()
            .ok_or_else(|| SearchError::EmbeddingUnavailable("no embedder configured".to_string()))
    }

    /// Embeds every unit of `corpus` in batches, once per corpus state.
    pub async fn prepare_embeddings(
        &self,
        corpus: &Corpus,
        progress: &dyn ProgressReporter,
    ) -> Result<Arc<CorpusEmbeddings>, SearchError> {
        let embedder = self.embedder()?;
        let cached = corpus
            .embedding_cell()
            .get_or_try_init(|| self.embed_corpus(embedder.as_ref(), corpus, progress))
            .await?
            .clone();

        if cached.model == embedder.name() {
            return Ok(cached);
        }

        warn!(
            cached = %cached.model,
            current = %embedder.name(),
            "corpus vectors belong to another model; embedding again"
        );
        self.embed_corpus(embedder.as_ref(), corpus, progress).await
    }

    async fn embed_corpus(
        &self,
        embedder: &dyn Embedder,
        corpus: &Corpus,
        progress: &dyn ProgressReporter,
    ) -> Result<Arc<CorpusEmbeddings>, SearchError> {
        let texts: Vec<String> = corpus.all_units().map(|unit| unit.text.clone()).collect();
        let total = texts.len();
        let mut vectors = Vec::with_capacity(total);

        for batch in texts.chunks(self.batch_size) {
            let embedded = embedder.embed_batch(batch).await?;
            validate_batch(embedder, &embedded, batch.len())?;
            vectors.extend(embedded);
            progress.report(ProgressEvent::Embedding {
                done: vectors.len(),
                total,
            });
        }

        info!(model = %embedder.name(), units = total, "corpus embedded");
        Ok(Arc::new(CorpusEmbeddings {
            model: embedder.name().to_string(),
            vectors,
        }))
    }

    fn query_terms(&self, query: &str, expand: bool) -> Vec<String> {
        match (&self.expander, expand) {
            (Some(expander), true) => expander.expand_query(query),
            (None, true) => {
                debug!("query expansion requested without a term expander");
                vec![query.to_string()]
            }
            _ => vec![query.to_string()],
        }
    }

    pub async fn search(
        &self,
        corpus: &Corpus,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<MatchRecord>, SearchError> {
        let query = query.trim();
        if query.is_empty() || corpus.is_empty() {
            return Ok(Vec::new());
        }

        let threshold = options.effective_threshold();
        let mut table: Option<Arc<CorpusEmbeddings>> = None;
        let mut shared_highlight: Option<TermMatcher> = None;

        let scorer: Box<dyn UnitScorer> = match options.strategy {
            MatchStrategy::Literal => {
                let matcher = TermMatcher::new(self.query_terms(query, options.expand_query))?;
                shared_highlight = Some(matcher.clone());
                Box::new(LiteralScorer::new(matcher))
            }
            MatchStrategy::Fuzzy => Box::new(FuzzyScorer::new(query, threshold)),
            MatchStrategy::Semantic => {
                let embedder = self.embedder()?;
                table = Some(self.prepare_embeddings(corpus, &NoProgress).await?);

                let embedded = embedder.embed_batch(&[query.to_string()]).await?;
                validate_batch(embedder.as_ref(), &embedded, 1)?;
                let query_vector = embedded.into_iter().next().ok_or_else(|| {
                    SearchError::InvalidEmbedding("no vector returned for query".to_string())
                })?;

                let keywords = TermMatcher::new(keyword_terms(query))?;
                shared_highlight = Some(keywords.clone());
                Box::new(SemanticScorer::new(query_vector, threshold, keywords))
            }
        };

        let mut records = Vec::new();
        for (position, (filename, unit)) in corpus.units_with_filenames().enumerate() {
            let embedding = table.as_ref().and_then(|vectors| vectors.get(position));
            let Some(hit) = scorer.score(unit, embedding) else {
                continue;
            };

            let highlighted_text = match &shared_highlight {
                Some(matcher) => self.formatter.highlight(&unit.text, matcher),
                None => self
                    .formatter
                    .highlight(&unit.text, &TermMatcher::new(&hit.terms)?),
            };

            records.push(MatchRecord {
                document_id: unit.document_id.clone(),
                filename: filename.to_string(),
                location: unit.location,
                score: hit.score,
                strategy: options.strategy,
                matched_text: unit.text.clone(),
                highlighted_text,
                matched_terms: hit.terms,
            });
        }

        if options.strategy.is_ranked() {
            // stable: equal scores keep upload then location order
            records.sort_by(|left, right| right.score.total_cmp(&left.score));
        }

        let matched = records.len();
        records.truncate(options.top_k);

        debug!(
            strategy = %options.strategy,
            threshold,
            matched,
            returned = records.len(),
            "search finished"
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{Document, Location, SourceType, TextUnit};
    use crate::thesaurus::Thesaurus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn document(id: &str, texts: &[&str]) -> Document {
        let units = texts
            .iter()
            .enumerate()
            .map(|(index, text)| TextUnit {
                document_id: id.to_string(),
                location: Location::Paragraph(index as u32 + 1),
                text: text.to_string(),
                word_boxes: Vec::new(),
            })
            .collect();
        Document::new(id.to_string(), format!("{id}.docx"), SourceType::Docx, 0, units)
    }

    #[derive(Default)]
    struct CountingEmbedder {
        inner: CharacterNgramEmbedder,
        embedded: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn name(&self) -> &str {
            "counting"
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }
    }

    struct OfflineEmbedder;

    #[async_trait]
    impl Embedder for OfflineEmbedder {
        fn name(&self) -> &str {
            "offline"
        }

        fn dimensions(&self) -> usize {
            8
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
            Err(SearchError::EmbeddingUnavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn literal_search_is_binary_and_exact() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = Corpus::from_documents(vec![document(
            "minutes",
            &["the quarterly budget was approved", "weather was fine"],
        )]);
        let engine = MatchEngine::new();

        let hits = engine.search(&corpus, "budget", &SearchOptions::default()).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[0].location, Location::Paragraph(1));
        assert_eq!(
            hits[0].highlighted_text,
            "the quarterly <mark>budget</mark> was approved"
        );

        let none = engine
            .search(&corpus, "nonexistent_token_xyz", &SearchOptions::default())
            .await?;
        assert!(none.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn fuzzy_search_respects_threshold() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = Corpus::from_documents(vec![document("minutes", &["the quarterly budget was approved"])]);
        let engine = MatchEngine::new();

        let lenient = SearchOptions::new(MatchStrategy::Fuzzy).threshold(70.0);
        let hits = engine.search(&corpus, "buget", &lenient).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched_text, "the quarterly budget was approved");
        assert!(hits[0].highlighted_text.contains("<mark>budget</mark>"));

        let strict = SearchOptions::new(MatchStrategy::Fuzzy).threshold(99.0);
        assert!(engine.search(&corpus, "buget", &strict).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn semantic_search_is_deterministic_and_embeds_corpus_once() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = Corpus::from_documents(vec![
            document("minutes", &["the quarterly budget was approved", "weather forecast for tomorrow"]),
            document("notes", &["budget approval for the quarter"]),
        ]);
        let embedder = Arc::new(CountingEmbedder::default());
        let engine = MatchEngine::new().with_embedder(embedder.clone());
        let options = SearchOptions::new(MatchStrategy::Semantic).threshold(0.3);

        let first = engine.search(&corpus, "quarterly budget approved", &options).await?;
        let second = engine.search(&corpus, "quarterly budget approved", &options).await?;

        assert!(!first.is_empty());
        assert_eq!(first[0].matched_text, "the quarterly budget was approved");
        let summarize = |records: &[MatchRecord]| {
            records
                .iter()
                .map(|record| (record.document_id.clone(), record.location, record.score))
                .collect::<Vec<_>>()
        };
        assert_eq!(summarize(&first), summarize(&second));
        assert!(first.iter().all(|record| (0.0..=1.0).contains(&record.score)));

        // three corpus units once, plus one query vector per search
        assert_eq!(embedder.embedded.load(Ordering::SeqCst), 3 + 2);
        Ok(())
    }

    #[tokio::test]
    async fn equal_scores_keep_upload_then_location_order() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = Corpus::from_documents(vec![
            document("first", &["introduction", "the budget was approved"]),
            document("second", &["the budget was approved", "closing remarks"]),
        ]);
        let engine = MatchEngine::new();
        let options = SearchOptions::new(MatchStrategy::Fuzzy).threshold(0.9);

        let hits = engine.search(&corpus, "budget was approved", &options).await?;

        let order: Vec<(&str, Location)> = hits
            .iter()
            .map(|record| (record.document_id.as_str(), record.location))
            .collect();
        assert_eq!(
            order,
            vec![
                ("first", Location::Paragraph(2)),
                ("second", Location::Paragraph(1)),
            ]
        );
        assert_eq!(hits[0].score, hits[1].score);
        Ok(())
    }

    #[tokio::test]
    async fn empty_query_and_empty_corpus_return_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let engine = MatchEngine::new().with_embedder(Arc::new(OfflineEmbedder));
        let corpus = Corpus::from_documents(vec![document("a", &["some text"])]);

        assert!(engine.search(&corpus, "   ", &SearchOptions::default()).await?.is_empty());

        let empty = Corpus::from_documents(vec![document("failed", &[])]);
        let semantic = SearchOptions::new(MatchStrategy::Semantic);
        assert!(engine.search(&empty, "anything", &semantic).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn semantic_search_reports_unavailable_embedder() {
        let corpus = Corpus::from_documents(vec![document("a", &["some text"])]);
        let semantic = SearchOptions::new(MatchStrategy::Semantic);

        let without = MatchEngine::new().search(&corpus, "text", &semantic).await;
        assert!(matches!(without, Err(SearchError::EmbeddingUnavailable(_))));

        let offline = MatchEngine::new()
            .with_embedder(Arc::new(OfflineEmbedder))
            .search(&corpus, "text", &semantic)
            .await;
        assert!(matches!(offline, Err(SearchError::EmbeddingUnavailable(_))));
    }

    #[tokio::test]
    async fn expanded_query_highlights_union_of_terms() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = Corpus::from_documents(vec![document(
            "a",
            &["Quarterly funds and budget allowance", "unrelated"],
        )]);
        let thesaurus = Thesaurus::from_groups([["budget", "funds", "budget allowance"]]);
        let engine = MatchEngine::new().with_expander(Arc::new(thesaurus));
        let options = SearchOptions::default().expand_query(true);

        let hits = engine.search(&corpus, "budget", &options).await?;

        assert_eq!(hits.len(), 1);
        assert_eq!(
            hits[0].highlighted_text,
            "Quarterly <mark>funds</mark> and <mark>budget allowance</mark>"
        );
        assert_eq!(engine.formatter().strip(&hits[0].highlighted_text), hits[0].matched_text);

        let plain = engine.search(&corpus, "funds", &SearchOptions::default()).await?;
        assert_eq!(plain[0].matched_terms, vec!["funds"]);
        Ok(())
    }

    #[tokio::test]
    async fn top_k_truncates_after_scoring() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = Corpus::from_documents(vec![document("a", &["budget one", "budget two", "budget three"])]);
        let engine = MatchEngine::new();

        let hits = engine
            .search(&corpus, "budget", &SearchOptions::default().top_k(2))
            .await?;

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].matched_text, "budget two");
        Ok(())
    }
}
