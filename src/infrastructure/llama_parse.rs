//! Client for the LlamaParse document parsing service.
//!
//! A source file is uploaded as a parse job, the job is polled until it
//! settles, and the markdown result is split into one set of section
//! documents per page.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::file_system::{documents_from_markdown, source_name};
use crate::domain::document::Document;
use crate::domain::providers::DocumentParser;
use crate::error::{CounselError, CounselResult};

/// Separator LlamaParse places between pages (sheets, for spreadsheets).
pub const PAGE_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarkdownResult {
    markdown: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobStatus {
    Pending,
    Success,
    Failed,
}

fn job_status(raw: Option<&str>) -> JobStatus {
    match raw.map(|s| s.to_ascii_uppercase()).as_deref() {
        Some("SUCCESS") | Some("PARTIAL_SUCCESS") => JobStatus::Success,
        Some("ERROR") | Some("CANCELED") | Some("CANCELLED") => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("xls") => "application/vnd.ms-excel",
        Some("csv") => "text/csv",
        Some("pdf") => "application/pdf",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

/// Splits LlamaParse markdown into per-page section documents.
pub fn documents_from_pages(markdown: &str, source: &str) -> Vec<Document> {
    markdown
        .split(PAGE_SEPARATOR)
        .enumerate()
        .flat_map(|(i, page)| documents_from_markdown(page, source, Some(i + 1)))
        .collect()
}

pub struct LlamaParseClient {
    client: Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl LlamaParseClient {
    pub fn new(api_key: String, base_url: String, poll_interval: Duration, max_wait: Duration) -> CounselResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| CounselError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval,
            max_wait,
        })
    }

    fn upstream(action: &str, e: impl std::fmt::Display) -> CounselError {
        log::error!("LlamaParse {} failed: {}", action, e);
        CounselError::Upstream(format!("document parsing service {} failed", action))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String, action: &str) -> CounselResult<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Self::upstream(action, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::upstream(action, format!("HTTP {}: {}", status, body)));
        }
        response.json::<T>().await.map_err(|e| Self::upstream(action, e))
    }

    async fn upload(&self, path: &Path) -> CounselResult<JobResponse> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CounselError::Configuration(format!("failed to read {}: {}", path.display(), e)))?;
        log::info!("Uploading {} ({} bytes) for parsing...", path.display(), bytes.len());

        let part = Part::bytes(bytes)
            .file_name(source_name(path))
            .mime_str(content_type_for(path))
            .map_err(|e| Self::upstream("upload", e))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/api/parsing/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::upstream("upload", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::upstream("upload", format!("HTTP {}: {}", status, body)));
        }
        response.json::<JobResponse>().await.map_err(|e| Self::upstream("upload", e))
    }

    async fn wait_for_job(&self, job: JobResponse) -> CounselResult<()> {
        let started = tokio::time::Instant::now();
        // The upload response already carries the first status
        let mut status = job_status(job.status.as_deref());
        loop {
            match status {
                JobStatus::Success => return Ok(()),
                JobStatus::Failed => {
                    return Err(CounselError::Upstream(format!("document parsing job {} failed", job.id)));
                }
                JobStatus::Pending => {}
            }
            // Still pending
            if started.elapsed() >= self.max_wait {
                return Err(CounselError::Upstream(format!(
                    "document parsing job {} did not finish within {}s",
                    job.id,
                    self.max_wait.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            let polled: JobResponse = self
                .get_json(format!("{}/api/parsing/job/{}", self.base_url, job.id), "status check")
                .await?;
            log::debug!("Parse job {} status: {:?}", job.id, polled.status);
            status = job_status(polled.status.as_deref());
        }
    }
}

#[async_trait]
impl DocumentParser for LlamaParseClient {
    async fn parse(&self, path: &Path) -> CounselResult<Vec<Document>> {
        if !path.is_file() {
            return Err(CounselError::Configuration(format!("data file not found at {}", path.display())));
        }
        let job = self.upload(path).await?;
        let job_id = job.id.clone();
        log::info!("Parse job {} started.", job_id);
        self.wait_for_job(job).await?;

        let result: MarkdownResult = self
            .get_json(
                format!("{}/api/parsing/job/{}/result/markdown", self.base_url, job_id),
                "result download",
            )
            .await?;
        // One document per page
        let documents = documents_from_pages(&result.markdown, &source_name(path));
        log::info!("Parse job {} produced {} documents.", job_id, documents.len());
        Ok(documents)
    }
}
