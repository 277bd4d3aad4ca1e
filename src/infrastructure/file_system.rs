use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::markdown::split_sections;
use crate::domain::document::Document;
use crate::domain::providers::DocumentParser;
use crate::error::{CounselError, CounselResult};

const TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Display name recorded as a document's `source`.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Turns one markdown text into section documents.
pub fn documents_from_markdown(markdown: &str, source: &str, page: Option<usize>) -> Vec<Document> {
    split_sections(markdown)
        .into_iter()
        .map(|section| {
            let mut document = Document::new(section.text, source);
            document.page = page;
            document.section = section.heading;
            document
        })
        .collect()
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| TEXT_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Lists the text files a local source consists of, in a stable order.
fn collect_source_files(path: &Path) -> CounselResult<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(CounselError::Configuration(format!("data file not found at {}", path.display())));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file() && is_text_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

/// Offline parser for markdown and plain-text knowledge sources: a single
/// file, or every `.md`/`.markdown`/`.txt` file under a directory.
#[derive(Debug, Default, Clone)]
pub struct LocalDocumentParser;

impl LocalDocumentParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_blocking(path: &Path) -> CounselResult<Vec<Document>> {
        let files = collect_source_files(path)?;
        log::debug!("Loading {} local source files from {:?}", files.len(), path);

        let mut documents = Vec::new();
        for file in files {
            let content = fs::read_to_string(&file).map_err(|e| {
                CounselError::Data(format!("failed to read {}: {}", file.display(), e))
            })?;
            let parsed = documents_from_markdown(&content, &source_name(&file), None);
            log::debug!("{} sections from {}", parsed.len(), file.display());
            documents.extend(parsed);
        }
        Ok(documents)
    }
}

#[async_trait]
impl DocumentParser for LocalDocumentParser {
    async fn parse(&self, path: &Path) -> CounselResult<Vec<Document>> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::parse_blocking(&path))
            .await
            .map_err(|e| CounselError::Data(format!("document loading task failed: {}", e)))?
    }
}
