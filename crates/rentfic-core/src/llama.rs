//! LlamaParse REST client.
//!
//! A parse is a three step job: upload the PDF, poll the job until it
//! finishes, then fetch the result in the configured format. The whole
//! result is exposed as a single [`ParsedPage`].

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::time::Instant;

use crate::config::{Config, LlamaParseConfig, ResultType};
use crate::{CoreError, ParsedDocument, TextExtractor};

/// One document returned by LlamaParse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    pub text: Option<String>,
}

impl ParsedDocument for ParsedPage {
    fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// Job state reported by the parsing API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum JobStatus {
    Pending,
    Success,
    Error,
    Canceled,
    /// Any other status, such as `PARTIAL_SUCCESS`. The job is treated as failed.
    Other(String),
}

impl From<String> for JobStatus {
    fn from(status: String) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "PENDING" => JobStatus::Pending,
            "SUCCESS" => JobStatus::Success,
            "ERROR" => JobStatus::Error,
            "CANCELED" | "CANCELLED" => JobStatus::Canceled,
            _ => JobStatus::Other(status),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => f.write_str("PENDING"),
            JobStatus::Success => f.write_str("SUCCESS"),
            JobStatus::Error => f.write_str("ERROR"),
            JobStatus::Canceled => f.write_str("CANCELED"),
            JobStatus::Other(status) => f.write_str(status),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    #[serde(default = "pending")]
    status: JobStatus,
}

fn pending() -> JobStatus {
    JobStatus::Pending
}

/// `Ok(true)` once the job succeeded, `Ok(false)` while it is still running.
fn job_finished(job_id: &str, status: &JobStatus) -> Result<bool, CoreError> {
    match status {
        JobStatus::Success => Ok(true),
        JobStatus::Pending => Ok(false),
        JobStatus::Error | JobStatus::Canceled | JobStatus::Other(_) => Err(
            CoreError::ParseService(format!("parsing job {job_id} ended with status {status}")),
        ),
    }
}

pub struct LlamaParseClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    result_type: ResultType,
    language: String,
    verbose: bool,
    poll_interval: Duration,
    max_wait: Duration,
}

impl LlamaParseClient {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, settings: &LlamaParseConfig) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            result_type: settings.result_type,
            language: settings.language.clone(),
            verbose: settings.verbose,
            poll_interval: settings.poll_interval(),
            max_wait: settings.max_wait(),
        }
    }

    pub fn from_config(http: reqwest::Client, api_key: impl Into<String>, config: &Config) -> Self {
        Self::new(http, api_key, &config.llama_parse)
    }

    fn progress(&self, message: &str) {
        if self.verbose {
            log::info!("{message}");
        } else {
            log::debug!("{message}");
        }
    }

    async fn upload(&self, pdf: Vec<u8>, file_name: &str) -> Result<String, CoreError> {
        let part = Part::bytes(pdf)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| CoreError::ParseService(e.to_string()))?;
        let form = Form::new()
            .text("language", self.language.clone())
            .part("file", part);

        let resp = self
            .http
            .post(format!("{}/api/parsing/upload", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CoreError::ParseService(format!("upload failed: {e}")))?;
        let job = read_job(resp).await?;
        self.progress(&format!("Started parsing job {}", job.id));
        Ok(job.id)
    }

    async fn wait_for(&self, job_id: &str) -> Result<(), CoreError> {
        let started = Instant::now();
        loop {
            let resp = self
                .http
                .get(format!("{}/api/parsing/job/{job_id}", self.base_url))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| CoreError::ParseService(format!("status check failed: {e}")))?;
            let job = read_job(resp).await?;

            if job_finished(job_id, &job.status)? {
                return Ok(());
            }

            if started.elapsed() >= self.max_wait {
                return Err(CoreError::ParseService(format!(
                    "parsing job {job_id} did not finish within {:.0}s",
                    self.max_wait.as_secs_f64()
                )));
            }
            self.progress(&format!("Parsing job {job_id} still running"));
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fetch_result(&self, job_id: &str) -> Result<Vec<ParsedPage>, CoreError> {
        let resp = self
            .http
            .get(format!(
                "{}/api/parsing/job/{job_id}/result/{}",
                self.base_url,
                self.result_type.as_str()
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| CoreError::ParseService(format!("result download failed: {e}")))?;
        read_result(resp, self.result_type).await
    }
}

impl TextExtractor for LlamaParseClient {
    type Document = ParsedPage;

    async fn extract(&self, pdf: Vec<u8>, file_name: &str) -> Result<Vec<ParsedPage>, CoreError> {
        let job_id = self.upload(pdf, file_name).await?;
        self.wait_for(&job_id).await?;
        self.fetch_result(&job_id).await
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, CoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CoreError::ParseService(format!(
        "HTTP {}: {}",
        status.as_u16(),
        body.trim()
    )))
}

async fn read_job(resp: reqwest::Response) -> Result<JobResponse, CoreError> {
    ensure_success(resp)
        .await?
        .json::<JobResponse>()
        .await
        .map_err(|e| CoreError::ParseService(format!("unexpected job response: {e}")))
}

/// Turn a result response into documents. A body without the
/// `<result_type>` field yields no documents.
async fn read_result(
    resp: reqwest::Response,
    result_type: ResultType,
) -> Result<Vec<ParsedPage>, CoreError> {
    let body: serde_json::Value = ensure_success(resp)
        .await?
        .json()
        .await
        .map_err(|e| CoreError::ParseService(format!("unexpected result response: {e}")))?;

    match body.get(result_type.as_str()) {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(value) => Ok(vec![ParsedPage {
            text: value.as_str().map(str::to_string),
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> reqwest::Response {
        http::Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(body.to_string())
            .unwrap()
            .into()
    }

    #[tokio::test]
    async fn job_status_parses() {
        let job = read_job(response(200, r#"{"id": "abc", "status": "SUCCESS"}"#))
            .await
            .unwrap();
        assert_eq!(job.id, "abc");
        assert_eq!(job.status, JobStatus::Success);

        let job = read_job(response(200, r#"{"id": "abc", "status": "PARTIAL_SUCCESS"}"#))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Other("PARTIAL_SUCCESS".into()));

        let job = read_job(response(200, r#"{"id": "abc", "status": "CANCELLED"}"#))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Canceled);

        let job = read_job(response(200, r#"{"id": "abc"}"#)).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn unexpected_status_fails_the_job() {
        let job = read_job(response(200, r#"{"id": "abc", "status": "PARTIAL_SUCCESS"}"#))
            .await
            .unwrap();
        match job_finished(&job.id, &job.status).unwrap_err() {
            CoreError::ParseService(msg) => {
                assert!(msg.contains("abc"));
                assert!(msg.contains("PARTIAL_SUCCESS"));
            }
            other => panic!("expected ParseService, got {other:?}"),
        }
    }

    #[test]
    fn job_finished_by_status() {
        assert!(job_finished("j", &JobStatus::Success).unwrap());
        assert!(!job_finished("j", &JobStatus::Pending).unwrap());
        assert!(job_finished("j", &JobStatus::Error).is_err());
        assert!(job_finished("j", &JobStatus::Canceled).is_err());
    }

    #[tokio::test]
    async fn http_errors_carry_status_and_body() {
        let err = read_job(response(401, r#"{"detail": "Invalid API key"}"#))
            .await
            .unwrap_err();
        match err {
            CoreError::ParseService(msg) => {
                assert!(msg.contains("401"));
                assert!(msg.contains("Invalid API key"));
            }
            other => panic!("expected ParseService, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn markdown_result_is_one_document() {
        let docs = read_result(
            response(200, r#"{"markdown": "Fecha de publicación: 5 de enero de 2025", "job_metadata": {}}"#),
            ResultType::Markdown,
        )
        .await
        .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].has_text());
        assert_eq!(docs[0].text(), Some("Fecha de publicación: 5 de enero de 2025"));
    }

    #[tokio::test]
    async fn empty_text_is_a_document_without_text() {
        let docs = read_result(response(200, r#"{"text": ""}"#), ResultType::Text)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(!docs[0].has_text());
    }

    #[tokio::test]
    async fn missing_field_is_no_documents() {
        let docs = read_result(response(200, r#"{"text": "plain"}"#), ResultType::Markdown)
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn base_url_is_normalized() {
        let settings = LlamaParseConfig {
            base_url: "https://parse.example.com/".into(),
            ..LlamaParseConfig::default()
        };
        let client = LlamaParseClient::new(reqwest::Client::new(), "key", &settings);
        assert_eq!(client.base_url, "https://parse.example.com");
        assert_eq!(client.poll_interval, Duration::from_secs(1));
    }
}
