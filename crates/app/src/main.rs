use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use docsift_core::{
    CharacterNgramEmbedder, ContextWindow, Embedder, FileStatus, HttpOcrEngine, MatchStrategy,
    OcrEndpointConfig, OllamaEmbedder, ProcessingOptions, ProcessingSummary, SearchOptions,
    SearchSession, Thesaurus, TracingProgress,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docsift", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Parallel document readers (defaults to available cores).
    #[arg(long)]
    workers: Option<usize>,

    /// Skip the OCR fallback for PDF pages without a text layer.
    #[arg(long, default_value_t = false)]
    no_ocr: bool,

    /// Multimodal OCR endpoint used for blank PDF pages.
    #[arg(long, env = "LLM_OCR_ENDPOINT")]
    ocr_endpoint: Option<String>,

    /// Bearer token for the OCR endpoint.
    #[arg(long, env = "LLM_OCR_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,

    /// Embedding backend for semantic search.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Ngram)]
    embedder: EmbedderKind,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Ollama embedding model
    #[arg(long, env = "OLLAMA_EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Vector size reported by the Ollama model.
    #[arg(long, default_value = "768")]
    embedding_dimensions: usize,

    /// Seconds to wait for one embedding request.
    #[arg(long, default_value = "60")]
    embedding_timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Offline character trigram vectors.
    Ngram,
    /// Ollama `/api/embed`.
    Ollama,
}

#[derive(Subcommand)]
enum Command {
    /// Read uploads and report what was extracted from each file.
    Index {
        /// Files (.pdf, .docx, .txt, .zip) or folders searched recursively.
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Read uploads into a fresh session and search them.
    Search {
        /// Files (.pdf, .docx, .txt, .zip) or folders searched recursively.
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
        /// Search query
        #[arg(long)]
        query: String,
        /// literal, fuzzy, or semantic
        #[arg(long, default_value = "literal")]
        strategy: MatchStrategy,
        /// Minimum score; fuzzy accepts 0-1 or a percentage.
        #[arg(long)]
        threshold: Option<f64>,
        /// Number of results to return.
        #[arg(long, default_value = "10")]
        top_k: usize,
        /// Expand the query with related terms from the thesaurus.
        #[arg(long, default_value_t = false)]
        expand: bool,
        /// JSON object of term -> related terms.
        #[arg(long)]
        thesaurus: Option<PathBuf>,
        /// Characters of context around the first highlight.
        #[arg(long, conflicts_with = "context_lines")]
        context_chars: Option<usize>,
        /// Lines of context around the first highlight.
        #[arg(long)]
        context_lines: Option<usize>,
        /// Write results as CSV to this path.
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut session = build_session(&cli)?;

    info!(
        version = app_version,
        session = %session.id(),
        started_at = %Utc::now().to_rfc3339(),
        "docsift boot"
    );

    match cli.command {
        Command::Index { input } => {
            let summary = session
                .process_paths(&input)
                .await
                .context("could not collect inputs")?;

            print_summary(&summary);
            for document in session.corpus().documents() {
                let common: Vec<String> = document
                    .stats
                    .common_words
                    .iter()
                    .map(|(word, count)| format!("{word}:{count}"))
                    .collect();
                println!(
                    "stats: {} words={} sentences={} common=[{}]",
                    document.filename,
                    document.stats.word_count,
                    document.stats.sentence_count,
                    common.join(", ")
                );
            }
        }
        Command::Search {
            input,
            query,
            strategy,
            threshold,
            top_k,
            expand,
            thesaurus,
            context_chars,
            context_lines,
            export,
        } => {
            if let Some(path) = &thesaurus {
                let loaded = Thesaurus::from_json_file(path)
                    .with_context(|| format!("could not load thesaurus {}", path.display()))?;
                info!(terms = loaded.len(), "thesaurus loaded");
                session = session.with_expander(Arc::new(loaded));
            } else if expand {
                warn!("--expand without --thesaurus; the query is used as is");
            }

            let summary = session
                .process_paths(&input)
                .await
                .context("could not collect inputs")?;
            if summary.documents_failed() > 0 {
                print_summary(&summary);
            }

            let mut options = SearchOptions::new(strategy).top_k(top_k).expand_query(expand);
            if let Some(value) = threshold {
                options = options.threshold(value);
            }
            options.context = match (context_lines, context_chars) {
                (Some(lines), _) => ContextWindow::Lines(lines),
                (None, Some(chars)) => ContextWindow::Characters(chars),
                (None, None) => ContextWindow::default(),
            };

            let records = match session.search(&query, &options).await {
                Ok(records) => records,
                Err(error) if error.is_embedding_unavailable() => {
                    return Err(anyhow::Error::new(error)
                        .context("semantic search unavailable; retry with --strategy literal or --strategy fuzzy"));
                }
                Err(error) => return Err(error.into()),
            };

            println!(
                "query: {} strategy={} threshold={:.2} hits={}",
                query,
                strategy,
                options.effective_threshold(),
                records.len()
            );
            for record in &records {
                let snippet = session.format(record, options.context)?;
                let origin = session
                    .corpus()
                    .document(&record.document_id)
                    .and_then(|document| document.origin.as_deref());
                match origin {
                    Some(archive) => println!(
                        "[{:.4}] {archive}!{} ({})",
                        record.score, record.filename, record.location
                    ),
                    None => println!(
                        "[{:.4}] {} ({})",
                        record.score, record.filename, record.location
                    ),
                }
                println!("  {}", snippet.text);
            }

            if let Some(path) = export {
                let bytes = session.export(&records)?;
                tokio::fs::write(&path, bytes)
                    .await
                    .with_context(|| format!("could not write {}", path.display()))?;
                println!("exported {} rows to {}", records.len(), path.display());
            }
        }
    }

    Ok(())
}

fn build_session(cli: &Cli) -> anyhow::Result<SearchSession> {
    let mut options = ProcessingOptions::default();
    if let Some(workers) = cli.workers {
        options.max_workers = workers.max(1);
    }
    options.ocr_enabled = !cli.no_ocr;

    let mut session = SearchSession::new(options).with_progress(Arc::new(TracingProgress));

    let ocr_config = cli
        .ocr_endpoint
        .as_deref()
        .and_then(|endpoint| OcrEndpointConfig::new(endpoint, cli.ocr_api_key.clone()));
    if let Some(config) = ocr_config {
        let engine = HttpOcrEngine::new(config);
        info!(endpoint = %engine.endpoint(), "ocr fallback configured");
        session = session.with_ocr(Arc::new(engine));
    }

    let embedder: Arc<dyn Embedder> = match cli.embedder {
        EmbedderKind::Ngram => Arc::new(CharacterNgramEmbedder::default()),
        EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(
            &cli.ollama_url,
            cli.embedding_model.clone(),
            cli.embedding_dimensions,
            Duration::from_secs(cli.embedding_timeout_secs),
        )?),
    };

    Ok(session.with_embedder(embedder))
}

fn print_summary(summary: &ProcessingSummary) {
    for file in &summary.files {
        match &file.status {
            FileStatus::Indexed { units } => {
                println!("indexed {} units={units}", file.display_name());
            }
            FileStatus::Empty { note } => println!("empty   {} note={note}", file.display_name()),
            FileStatus::Failed { reason } => {
                println!("failed  {} reason={reason}", file.display_name());
            }
            FileStatus::Skipped { reason } => {
                println!("skipped {} reason={reason}", file.display_name());
            }
        }
    }

    println!(
        "{} processed, {} failed, {} skipped, {} units, {} words",
        summary.documents_processed(),
        summary.documents_failed(),
        summary.skipped(),
        summary.total_units(),
        summary.total_words
    );
}
