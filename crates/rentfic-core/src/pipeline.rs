//! The download → first page → parse → date → dedupe → archive run.
//!
//! A run ends in exactly one [`Outcome`] or fails with a [`PipelineError`]
//! naming the [`Stage`] it was in. Skips are normal outcomes: the report has
//! no text, no recognizable date, or a date that was already archived.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::config::Config;
use crate::date::{DateExtractor, MonthTable};
use crate::download::{Downloader, HttpGet};
use crate::history::{HistoryStore, ProcessedDateRecord};
use crate::{CoreError, ParsedDocument, TextExtractor};

/// File name hint sent to the text-extraction service with page one.
pub const PARSE_FILE_NAME: &str = "temp.pdf";

/// Timestamp layout used in archived file names and history records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const EXCERPT_CHARS: usize = 500;

/// Where a run was when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Downloading,
    ExtractingPage,
    Parsing,
    ExtractingDate,
    CheckingIdempotency,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Downloading => "download",
            Stage::ExtractingPage => "first page extraction",
            Stage::Parsing => "text extraction",
            Stage::ExtractingDate => "date extraction",
            Stage::CheckingIdempotency => "history check",
            Stage::Persisting => "archiving",
        };
        f.write_str(name)
    }
}

/// Fatal failure of a run.
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: CoreError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E: Into<CoreError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError {
            stage,
            source: e.into(),
        })
    }
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A report for a new date was archived.
    Saved { date_key: String, path: PathBuf },
    /// The service returned a document without text.
    SkippedEmptyParse,
    /// Neither date pattern matched the extracted text.
    SkippedDateNotFound,
    /// The report's date is already in the history.
    SkippedAlreadyProcessed { date_key: String },
}

impl Outcome {
    pub fn new_file_saved(&self) -> bool {
        matches!(self, Outcome::Saved { .. })
    }
}

/// Result of [`Pipeline::execute`]: failures are values, never panics.
#[derive(Debug)]
pub enum RunReport {
    Completed(Outcome),
    Failed(PipelineError),
}

impl RunReport {
    pub fn new_file_saved(&self) -> bool {
        matches!(self, RunReport::Completed(outcome) if outcome.new_file_saved())
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RunReport::Failed(_))
    }
}

pub struct Pipeline<C, E> {
    downloader: Downloader<C>,
    extractor: E,
    dates: DateExtractor,
    months: MonthTable,
    history: HistoryStore,
    url: String,
    timeout: Duration,
    raw_pdf_base: PathBuf,
    debug_file: PathBuf,
}

impl<C: HttpGet, E: TextExtractor> Pipeline<C, E> {
    pub fn new(config: &Config, client: C, extractor: E) -> Result<Self, CoreError> {
        Ok(Self {
            downloader: Downloader::from_config(client, config),
            extractor,
            dates: DateExtractor::from_config(config)?,
            months: MonthTable::from_config(config),
            history: HistoryStore::new(&config.paths.json_status_file)
                .verify_paths(config.history.verify_paths),
            url: config.download.url.clone(),
            timeout: config.download.timeout(),
            raw_pdf_base: config.paths.raw_pdf_base.clone(),
            debug_file: config.paths.debug_file.clone(),
        })
    }

    /// Run once and log the result. Never returns an error.
    pub async fn execute(&self) -> RunReport {
        match self.run().await {
            Ok(outcome) => {
                match &outcome {
                    Outcome::Saved { path, .. } => {
                        log::info!("A new report was processed and saved to {}", path.display())
                    }
                    _ => log::info!("No new report to process"),
                }
                RunReport::Completed(outcome)
            }
            Err(e) => {
                log::error!("Critical error: {e}");
                RunReport::Failed(e)
            }
        }
    }

    /// Run once, propagating fatal errors.
    pub async fn run(&self) -> Result<Outcome, PipelineError> {
        log::info!("Downloading PDF from {}", self.url);
        let content = self
            .downloader
            .download(&self.url, self.timeout)
            .await
            .at(Stage::Downloading)?;
        let mut history = self.history.load().at(Stage::CheckingIdempotency)?;

        let first_page = rentfic_pdf::extract_first_page(&content).at(Stage::ExtractingPage)?;

        log::info!("Extracting text from page one");
        let documents = self
            .extractor
            .extract(first_page, PARSE_FILE_NAME)
            .await
            .at(Stage::Parsing)?;
        let Some(document) = documents.first() else {
            return Err(CoreError::ParseService(
                "the service returned no documents; check the API key and service status".into(),
            ))
            .at(Stage::Parsing);
        };
        let text = match document.text() {
            Some(text) if document.has_text() => text,
            _ => {
                log::warn!("The text-extraction service returned an empty document");
                return Ok(Outcome::SkippedEmptyParse);
            }
        };

        let Some(found) = self.dates.extract_date(text) else {
            log::warn!("No publication date found in the PDF; check the date patterns");
            self.write_debug_text(text);
            log::info!("--- First {EXCERPT_CHARS} characters of the extracted text ---");
            log::info!("{}", excerpt(text, EXCERPT_CHARS));
            log::info!("--- End of excerpt ---");
            return Ok(Outcome::SkippedDateNotFound);
        };
        let date_key = self
            .months
            .format_date(&found.day, &found.month, &found.year)
            .at(Stage::ExtractingDate)?;
        log::info!("Document date: {date_key}");

        if history.contains_key(&date_key) {
            log::info!("The report for {date_key} was already processed; skipping");
            return Ok(Outcome::SkippedAlreadyProcessed { date_key });
        }

        let month = self
            .months
            .month_number(&found.month)
            .at(Stage::Persisting)?;
        let folder = self.raw_pdf_base.join(&found.year).join(month);
        std::fs::create_dir_all(&folder).at(Stage::Persisting)?;

        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let path = folder.join(archive_file_name(&date_key, &timestamp));
        std::fs::write(&path, &content).at(Stage::Persisting)?;
        log::info!("Saved new file: {}", path.display());

        history.insert(
            date_key.clone(),
            ProcessedDateRecord::new(timestamp, path.display().to_string()),
        );
        self.history.save(&history).at(Stage::Persisting)?;

        Ok(Outcome::Saved { date_key, path })
    }

    /// Best effort: a failed write is logged and otherwise ignored.
    fn write_debug_text(&self, text: &str) {
        match write_creating_parent(&self.debug_file, text.as_bytes()) {
            Ok(()) => log::info!(
                "Extracted text saved to {} for inspection",
                self.debug_file.display()
            ),
            Err(e) => log::warn!("Could not write the debug file: {e}"),
        }
    }
}

/// `rentabilidades_fic_<YYYYMMDD>_downloaded_<timestamp>.pdf`
pub fn archive_file_name(date_key: &str, timestamp: &str) -> String {
    format!("rentabilidades_fic_{date_key}_downloaded_{timestamp}.pdf")
}

fn write_creating_parent(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
