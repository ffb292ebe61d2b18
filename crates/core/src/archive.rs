use crate::error::IngestError;
use crate::models::{InputKind, SourceType};
use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A supported document extracted from an archive to the scratch directory.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub source_type: SourceType,
    pub path: PathBuf,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ExpandedArchive {
    pub entries: Vec<ArchiveEntry>,
    pub skipped: Vec<SkippedEntry>,
}

/// Expands one level of a ZIP archive into `scratch`.
///
/// Entries with unsupported extensions are skipped silently; nested archives,
/// unsafe paths, and oversized entries are skipped with a note. The caller
/// owns `scratch` and is responsible for removing it.
pub struct ArchiveExpander {
    max_entry_bytes: u64,
}

impl ArchiveExpander {
    pub fn new(max_entry_bytes: u64) -> Self {
        Self { max_entry_bytes }
    }

    pub fn expand_path(&self, archive: &Path, scratch: &Path) -> Result<ExpandedArchive, IngestError> {
        let file = File::open(archive)?;
        self.expand(file, scratch)
    }

    pub fn expand_bytes(&self, archive: &[u8], scratch: &Path) -> Result<ExpandedArchive, IngestError> {
        self.expand(io::Cursor::new(archive), scratch)
    }

    fn expand<R: Read + Seek>(&self, reader: R, scratch: &Path) -> Result<ExpandedArchive, IngestError> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut expanded = ExpandedArchive::default();
        fs::create_dir_all(scratch)?;

        for index in 0..archive.len() {
            let entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().to_string();
            let source_type = match InputKind::from_name(&name) {
                InputKind::Document(source_type) => source_type,
                InputKind::Archive => {
                    debug!(entry = %name, "nested archive not expanded");
                    expanded.skipped.push(SkippedEntry {
                        name,
                        reason: "nested archive not expanded".to_string(),
                    });
                    continue;
                }
                InputKind::Unsupported => {
                    debug!(entry = %name, "unsupported archive entry skipped");
                    continue;
                }
            };

            if entry.enclosed_name().is_none() {
                expanded.skipped.push(SkippedEntry {
                    name,
                    reason: "unsafe entry path".to_string(),
                });
                continue;
            }

            if entry.size() > self.max_entry_bytes {
                expanded.skipped.push(SkippedEntry {
                    reason: IngestError::EntryTooLarge {
                        name: name.clone(),
                        limit: self.max_entry_bytes,
                    }
                    .to_string(),
                    name,
                });
                continue;
            }

            let file_name = Path::new(&name)
                .file_name()
                .map(|value| value.to_string_lossy().to_string())
                .unwrap_or_else(|| format!("entry.{}", source_type.extension()));
            let path = scratch.join(format!("{index:05}-{file_name}"));

            let mut output = File::create(&path)?;
            let written = io::copy(&mut entry.take(self.max_entry_bytes + 1), &mut output)?;
            if written > self.max_entry_bytes {
                drop(output);
                fs::remove_file(&path)?;
                expanded.skipped.push(SkippedEntry {
                    reason: IngestError::EntryTooLarge {
                        name: name.clone(),
                        limit: self.max_entry_bytes,
                    }
                    .to_string(),
                    name,
                });
                continue;
            }

            expanded.entries.push(ArchiveEntry {
                name,
                source_type,
                path,
                byte_size: written,
            });
        }

        Ok(expanded)
    }
}
