use crate::archive::ArchiveExpander;
use crate::extractor::DocumentReaders;
use crate::models::{
    Document, FileOutcome, FileStatus, InputKind, ProcessingOptions, ProcessingSummary, SourceType,
    TextUnit,
};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::IngestError;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const EMPTY_EXTRACTION_NOTE: &str = "no text extracted (likely a scanned PDF or protected file)";

#[derive(Debug, Clone)]
pub enum UploadSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl UploadSource {
    fn load(self) -> Result<Vec<u8>, IngestError> {
        match self {
            UploadSource::Path(path) => Ok(fs::read(path)?),
            UploadSource::Bytes(bytes) => Ok(bytes),
        }
    }
}

/// One user-supplied file: a name that decides its type, plus its content.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub source: UploadSource,
}

impl UploadedFile {
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
            })?;

        Ok(Self {
            name: name.to_string(),
            source: UploadSource::Path(path.to_path_buf()),
        })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: UploadSource::Bytes(bytes),
        }
    }
}

/// Supported documents and archives below `folder`, sorted.
pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| InputKind::from_name(name) != InputKind::Unsupported);

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Expands directories into their supported files; plain paths pass through.
pub fn collect_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedFile>, IngestError> {
    let mut uploads = Vec::new();

    for path in paths {
        if path.is_dir() {
            for file in discover_documents(path) {
                uploads.push(UploadedFile::from_path(&file)?);
            }
        } else if path.is_file() {
            uploads.push(UploadedFile::from_path(path)?);
        } else {
            return Err(IngestError::InvalidArgument(format!(
                "input not found: {}",
                path.display()
            )));
        }
    }

    Ok(uploads)
}

/// SHA-256 over the filename followed by the content.
pub fn digest_document(name: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

struct ReadJob {
    filename: String,
    origin: Option<String>,
    source_type: SourceType,
    source: UploadSource,
}

enum Planned {
    Done(FileOutcome),
    Read(ReadJob),
}

/// Reads every upload into a Document. Never fails: unreadable files become
/// zero-unit documents with a note, and every input gets an outcome line.
pub async fn process_uploads(
    files: Vec<UploadedFile>,
    readers: Arc<DocumentReaders>,
    options: &ProcessingOptions,
    progress: &dyn ProgressReporter,
) -> (Vec<Document>, ProcessingSummary) {
    if files.is_empty() {
        return (Vec::new(), ProcessingSummary::default());
    }

    let needs_scratch = files
        .iter()
        .any(|file| InputKind::from_name(&file.name) == InputKind::Archive);
    let scratch = if needs_scratch {
        match create_scratch(options) {
            Ok(dir) => Some(dir),
            Err(error) => {
                warn!(reason = %error, "could not create scratch directory for archives");
                None
            }
        }
    } else {
        None
    };

    let mut planned = Vec::new();
    for (index, file) in files.into_iter().enumerate() {
        match InputKind::from_name(&file.name) {
            InputKind::Document(source_type) => planned.push(Planned::Read(ReadJob {
                filename: file.name,
                origin: None,
                source_type,
                source: file.source,
            })),
            InputKind::Archive => {
                let target = scratch
                    .as_ref()
                    .map(|dir| dir.path().join(format!("{index:03}")));
                planned.extend(plan_archive(file, target, options.max_entry_bytes).await);
            }
            InputKind::Unsupported => {
                debug!(file = %file.name, "unsupported upload skipped");
                let reason = IngestError::UnsupportedType(file.name.clone()).to_string();
                planned.push(Planned::Done(FileOutcome {
                    filename: file.name,
                    origin: None,
                    status: FileStatus::Skipped { reason },
                }));
            }
        }
    }

    let mut outcomes: Vec<Option<FileOutcome>> = Vec::with_capacity(planned.len());
    let mut jobs = Vec::new();
    for plan in planned {
        match plan {
            Planned::Done(outcome) => outcomes.push(Some(outcome)),
            Planned::Read(job) => {
                jobs.push((outcomes.len(), job));
                outcomes.push(None);
            }
        }
    }

    let total = jobs.len();
    let done = AtomicUsize::new(0);
    let semaphore = Arc::new(Semaphore::new(options.max_workers.max(1)));

    let tasks = jobs.into_iter().map(|(slot, job)| {
        let readers = Arc::clone(&readers);
        let semaphore = Arc::clone(&semaphore);
        let done = &done;
        async move {
            let filename = job.filename.clone();
            let origin = job.origin.clone();
            let _permit = semaphore.acquire_owned().await.ok();

            let (document, outcome) =
                match tokio::task::spawn_blocking(move || read_job(&readers, job)).await {
                    Ok(read) => read,
                    Err(error) => failed_document(filename, origin, format!("reader task failed: {error}")),
                };

            progress.report(ProgressEvent::Extracting {
                done: done.fetch_add(1, Ordering::SeqCst) + 1,
                total,
                file: outcome.display_name(),
            });
            (slot, document, outcome)
        }
    });

    let mut documents = Vec::with_capacity(total);
    for (slot, document, outcome) in join_all(tasks).await {
        outcomes[slot] = Some(outcome);
        documents.push(document);
    }

    if let Some(dir) = scratch {
        if let Err(error) = dir.close() {
            warn!(reason = %error, "could not remove scratch directory");
        }
    }

    let summary = ProcessingSummary {
        files: outcomes.into_iter().flatten().collect(),
        total_words: documents.iter().map(|document| document.stats.word_count).sum(),
    };

    info!(
        files = summary.files.len(),
        processed = summary.documents_processed(),
        failed = summary.documents_failed(),
        skipped = summary.skipped(),
        units = summary.total_units(),
        "uploads processed"
    );

    (documents, summary)
}

fn create_scratch(options: &ProcessingOptions) -> std::io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("docsift-");
    match &options.scratch_root {
        Some(root) => {
            fs::create_dir_all(root)?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
}

async fn plan_archive(file: UploadedFile, target: Option<PathBuf>, max_entry_bytes: u64) -> Vec<Planned> {
    let archive_name = file.name;
    let Some(target) = target else {
        return vec![Planned::Done(FileOutcome {
            filename: archive_name,
            origin: None,
            status: FileStatus::Failed {
                reason: "no scratch directory for archive expansion".to_string(),
            },
        })];
    };

    let source = file.source;
    let expanded = tokio::task::spawn_blocking(move || {
        let expander = ArchiveExpander::new(max_entry_bytes);
        match source {
            UploadSource::Path(path) => expander.expand_path(&path, &target),
            UploadSource::Bytes(bytes) => expander.expand_bytes(&bytes, &target),
        }
    })
    .await;

    let expanded = match expanded {
        Ok(Ok(expanded)) => expanded,
        Ok(Err(error)) => return vec![archive_failure(archive_name, error.to_string())],
        Err(error) => return vec![archive_failure(archive_name, format!("archive task failed: {error}"))],
    };

    debug!(
        archive = %archive_name,
        entries = expanded.entries.len(),
        skipped = expanded.skipped.len(),
        "archive expanded"
    );

    let mut planned: Vec<Planned> = expanded
        .entries
        .into_iter()
        .map(|entry| {
            Planned::Read(ReadJob {
                filename: entry.name,
                origin: Some(archive_name.clone()),
                source_type: entry.source_type,
                source: UploadSource::Path(entry.path),
            })
        })
        .collect();

    planned.extend(expanded.skipped.into_iter().map(|skipped| {
        Planned::Done(FileOutcome {
            filename: skipped.name,
            origin: Some(archive_name.clone()),
            status: FileStatus::Skipped {
                reason: skipped.reason,
            },
        })
    }));

    planned
}

fn archive_failure(archive_name: String, reason: String) -> Planned {
    warn!(file = %archive_name, reason = %reason, "archive could not be expanded");
    Planned::Done(FileOutcome {
        filename: archive_name,
        origin: None,
        status: FileStatus::Failed { reason },
    })
}

fn read_job(readers: &DocumentReaders, job: ReadJob) -> (Document, FileOutcome) {
    let ReadJob {
        filename,
        origin,
        source_type,
        source,
    } = job;

    let bytes = match source.load() {
        Ok(bytes) => bytes,
        Err(error) => return failed_document(filename, origin, error.to_string()),
    };

    let document_id = digest_document(&filename, &bytes);
    let byte_size = bytes.len() as u64;

    let extracted = match readers.read(source_type, &filename, &bytes) {
        Ok(extracted) => extracted,
        Err(error) => {
            let mut failed = failed_document(filename, origin, error.to_string());
            failed.0.document_id = document_id;
            failed.0.byte_size = byte_size;
            return failed;
        }
    };

    let units: Vec<TextUnit> = extracted
        .into_iter()
        .map(|piece| TextUnit {
            document_id: document_id.clone(),
            location: piece.location,
            text: piece.text,
            word_boxes: Vec::new(),
        })
        .collect();

    let unit_count = units.len();
    let mut document = Document::new(document_id, filename.clone(), source_type, byte_size, units)
        .with_origin(origin.clone());

    let status = if unit_count == 0 {
        info!(file = %filename, note = EMPTY_EXTRACTION_NOTE, "document has no text");
        document = document.with_note(EMPTY_EXTRACTION_NOTE);
        FileStatus::Empty {
            note: EMPTY_EXTRACTION_NOTE.to_string(),
        }
    } else {
        debug!(file = %filename, units = unit_count, "document read");
        FileStatus::Indexed { units: unit_count }
    };

    (
        document,
        FileOutcome {
            filename,
            origin,
            status,
        },
    )
}

fn failed_document(filename: String, origin: Option<String>, reason: String) -> (Document, FileOutcome) {
    warn!(file = %filename, reason = %reason, "document could not be read");
    let source_type = match InputKind::from_name(&filename) {
        InputKind::Document(source_type) => source_type,
        _ => SourceType::Txt,
    };
    let document = Document::new(
        digest_document(&filename, &[]),
        filename.clone(),
        source_type,
        0,
        Vec::new(),
    )
    .with_origin(origin.clone())
    .with_note(reason.clone());

    (
        document,
        FileOutcome {
            filename,
            origin,
            status: FileStatus::Failed { reason },
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixtures::zip_with;
    use crate::extractor::fixtures::{docx_with_paragraphs, pdf_with_pages};
    use crate::models::Location;
    use crate::progress::NoProgress;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn readers() -> Arc<DocumentReaders> {
        Arc::new(DocumentReaders::new(None))
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn report(&self, event: ProgressEvent) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }
    }

    #[test]
    fn discover_documents_is_recursive_and_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("b.txt")).and_then(|mut file| file.write_all(b"text"))?;
        File::create(nested.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("bundle.ZIP")).and_then(|mut file| file.write_all(b"PK"))?;
        File::create(base.join("photo.png")).and_then(|mut file| file.write_all(b"png"))?;

        let files = discover_documents(base);
        let names: Vec<String> = files
            .iter()
            .filter_map(|path| path.strip_prefix(base).ok())
            .map(|path| path.to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["b.txt", "bundle.ZIP", "nested/a.pdf"]);
        Ok(())
    }

    #[test]
    fn collect_uploads_rejects_missing_paths() {
        let result = collect_uploads(&[PathBuf::from("/definitely/not/here.txt")]);
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }

    #[test]
    fn digest_depends_on_name_and_content() {
        let first = digest_document("a.txt", b"abc");
        assert_eq!(first, digest_document("a.txt", b"abc"));
        assert_ne!(first, digest_document("b.txt", b"abc"));
        assert_ne!(first, digest_document("a.txt", b"abd"));
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn malformed_file_does_not_block_the_batch() -> Result<(), Box<dyn std::error::Error>> {
        let files = vec![
            UploadedFile::from_bytes("broken.pdf", b"%PDF-1.4\n%broken".to_vec()),
            UploadedFile::from_bytes("notes.txt", b"budget notes\n\nsecond line".to_vec()),
            UploadedFile::from_bytes("minutes.docx", docx_with_paragraphs(&["Agenda", "Budget approved"])),
        ];
        let options = ProcessingOptions {
            max_workers: 2,
            ..ProcessingOptions::default()
        };

        let (documents, summary) = process_uploads(files, readers(), &options, &NoProgress).await;

        assert_eq!(documents.len(), 3);
        assert_eq!(summary.documents_failed(), 1);
        assert_eq!(summary.documents_processed(), 2);
        assert_eq!(summary.files[0].filename, "broken.pdf");
        assert!(matches!(summary.files[0].status, FileStatus::Failed { .. }));
        assert!(documents[0].is_empty());
        assert!(documents[0].note.is_some());
        assert_eq!(summary.files[1].status, FileStatus::Indexed { units: 2 });
        assert_eq!(documents[2].units()[1].location, Location::Paragraph(2));
        assert_eq!(summary.total_units(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn nested_zip_contents_are_not_indexed() -> Result<(), Box<dyn std::error::Error>> {
        let scratch_root = tempdir()?;
        let inner = zip_with(&[("hidden.txt", b"secret inner text".as_slice())]);
        let bundle = zip_with(&[
            ("docs/visible.txt", b"outer text".as_slice()),
            ("inner.zip", inner.as_slice()),
            ("logo.png", b"png".as_slice()),
        ]);
        let options = ProcessingOptions {
            scratch_root: Some(scratch_root.path().to_path_buf()),
            ..ProcessingOptions::default()
        };

        let (documents, summary) = process_uploads(
            vec![UploadedFile::from_bytes("bundle.zip", bundle)],
            readers(),
            &options,
            &NoProgress,
        )
        .await;

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].filename, "docs/visible.txt");
        assert_eq!(documents[0].origin.as_deref(), Some("bundle.zip"));
        assert!(documents
            .iter()
            .flat_map(|document| document.units())
            .all(|unit| !unit.text.contains("secret")));

        assert_eq!(summary.files.len(), 2);
        assert_eq!(summary.files[1].display_name(), "bundle.zip!inner.zip");
        assert_eq!(summary.skipped(), 1);
        assert_eq!(fs::read_dir(scratch_root.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn scratch_is_removed_when_entries_fail() -> Result<(), Box<dyn std::error::Error>> {
        let scratch_root = tempdir()?;
        let bundle = zip_with(&[
            ("broken.pdf", b"%PDF-1.4\n%broken".as_slice()),
            ("fine.txt", b"fine".as_slice()),
        ]);
        let options = ProcessingOptions {
            scratch_root: Some(scratch_root.path().to_path_buf()),
            ..ProcessingOptions::default()
        };

        let (_, summary) = process_uploads(
            vec![
                UploadedFile::from_bytes("bundle.zip", bundle),
                UploadedFile::from_bytes("corrupt.zip", b"PK not really".to_vec()),
            ],
            readers(),
            &options,
            &NoProgress,
        )
        .await;

        assert_eq!(summary.documents_failed(), 2);
        assert_eq!(summary.documents_processed(), 1);
        assert_eq!(summary.files[2].filename, "corrupt.zip");
        assert_eq!(fs::read_dir(scratch_root.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn blank_pdf_is_recorded_with_empty_note() -> Result<(), Box<dyn std::error::Error>> {
        let files = vec![UploadedFile::from_bytes("scan.pdf", pdf_with_pages(&[None]))];

        let (documents, summary) =
            process_uploads(files, readers(), &ProcessingOptions::default(), &NoProgress).await;

        assert_eq!(documents[0].note.as_deref(), Some(EMPTY_EXTRACTION_NOTE));
        assert_eq!(
            summary.files[0].status,
            FileStatus::Empty {
                note: EMPTY_EXTRACTION_NOTE.to_string()
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_uploads_are_skipped_with_note() {
        let files = vec![
            UploadedFile::from_bytes("photo.png", b"png".to_vec()),
            UploadedFile::from_bytes("a.txt", b"alpha".to_vec()),
        ];

        let (documents, summary) =
            process_uploads(files, readers(), &ProcessingOptions::default(), &NoProgress).await;

        assert_eq!(documents.len(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.documents_failed(), 0);
    }

    #[tokio::test]
    async fn progress_counts_every_read() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("disk.txt");
        fs::write(&path, "from disk")?;
        let files = vec![
            UploadedFile::from_path(&path)?,
            UploadedFile::from_bytes("memory.txt", b"from memory".to_vec()),
        ];
        let progress = RecordingProgress::default();
        let options = ProcessingOptions {
            max_workers: 1,
            ..ProcessingOptions::default()
        };

        let (documents, _) = process_uploads(files, readers(), &options, &progress).await;

        assert_eq!(documents[0].filename, "disk.txt");
        assert_eq!(documents[0].units()[0].text, "from disk");
        let events = progress.events.lock().map_err(|_| "poisoned")?;
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|event| matches!(
            event,
            ProgressEvent::Extracting { done: 2, total: 2, .. }
        )));
        Ok(())
    }

    #[tokio::test]
    async fn no_uploads_is_a_no_op() {
        let (documents, summary) =
            process_uploads(Vec::new(), readers(), &ProcessingOptions::default(), &NoProgress).await;
        assert!(documents.is_empty());
        assert!(summary.is_empty());
    }
}
