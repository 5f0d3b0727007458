use thiserror::Error;

pub mod config;
pub mod date;
pub mod download;
pub mod history;
pub mod llama;
pub mod pipeline;

// Re-export for convenience
pub use config::{CONFIG_PATH_ENV, Config, ConfigError, LLAMA_API_KEY_ENV, load_config};
pub use date::{DateExtractor, DateMatch, MonthTable, PatternKind};
pub use download::{Downloader, HttpGet, HttpResponse};
pub use history::{History, HistoryStore, ProcessedDateRecord};
pub use llama::{LlamaParseClient, ParsedPage};
pub use pipeline::{Outcome, Pipeline, PipelineError, RunReport, Stage};
pub use rentfic_pdf::PdfError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not download the PDF after {retries} attempts")]
    DownloadExhausted { retries: u32 },
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),
    #[error("text extraction service error: {0}")]
    ParseService(String),
    #[error("unknown month name: {0}")]
    UnknownMonth(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A document returned by the text-extraction service.
pub trait ParsedDocument {
    /// Extracted text, if the service produced any.
    fn text(&self) -> Option<&str>;

    fn has_text(&self) -> bool {
        self.text().is_some_and(|t| !t.is_empty())
    }
}

/// Converts a PDF into text documents.
///
/// Implementations own their transport and retry policy; the pipeline calls
/// `extract` once per run and never retries it.
pub trait TextExtractor {
    type Document: ParsedDocument;

    fn extract(
        &self,
        pdf: Vec<u8>,
        file_name: &str,
    ) -> impl Future<Output = Result<Vec<Self::Document>, CoreError>>;
}
