//! Error types for the bilancio-agent library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`BilancioError`] is **fatal**: the balance sheet cannot be produced at
//!   all (bad input file, provider not configured, extraction stage returned
//!   text that holds no JSON). Returned as `Err(BilancioError)` from the
//!   top-level `generate*` functions.
//!
//! * [`JsonExtractError`]: the model reply contained no recoverable JSON.
//!   Whether this is fatal depends on the stage: analysis and validation
//!   fall back to defaults, extraction turns it into
//!   [`BilancioError::JsonExtraction`].
//!
//! * [`StageWarning`] is **non-fatal**: a stage fell back to a default or
//!   reported an unbalanced sheet. Stored inside
//!   [`crate::output::StageResult`] so callers can show it to the user.

use crate::pipeline::llm::Stage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the bilancio-agent library.
#[derive(Debug, Error)]
pub enum BilancioError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// File name does not end in `.pdf`.
    #[error("File must be a PDF, got: '{extension}' ({path})")]
    InvalidExtension { path: PathBuf, extension: String },

    /// More documents than the configured limit.
    #[error("Maximum {max} files allowed, got {got}")]
    TooManyFiles { max: usize, got: usize },

    /// Nothing to process.
    #[error("No documents supplied. Provide at least one PDF file.")]
    NoDocuments,

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password. Encrypted statements are not supported.
    #[error("PDF '{path}' is encrypted and requires a password.\nRemove the protection before uploading.")]
    PasswordRequired { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page} of '{path}': {detail}")]
    RasterisationFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// The documents hold more pages than the configured limit.
    #[error("Documents have {total} pages in total; the limit is {max}")]
    TooManyPages { total: usize, max: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_DYNAMIC_LIB_PATH=/path/to/libpdfium.\n\
  • Place libpdfium next to the bilancio executable.\n\
  • Install pdfium in a system library directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A stage failed on every attempt.
    #[error("{stage} stage failed after {attempts} attempt(s): {detail}")]
    StageFailed {
        stage: Stage,
        attempts: u32,
        detail: String,
    },

    /// A stage call exceeded the per-call timeout on the final attempt.
    #[error("{stage} stage timed out after {secs}s")]
    StageTimeout { stage: Stage, secs: u64 },

    /// A stage that cannot fall back returned text without usable JSON.
    #[error("{stage} stage returned no usable JSON: {source}")]
    JsonExtraction {
        stage: Stage,
        #[source]
        source: JsonExtractError,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The PDF layout engine could not produce a document.
    #[error("PDF layout failed: {0}")]
    PdfLayout(String),

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BilancioError {
    /// True when the failure comes from a missing or rejected API key.
    ///
    /// The web front end hides the detail of these errors from end users.
    pub fn is_api_key_problem(&self) -> bool {
        match self {
            BilancioError::ProviderNotConfigured { .. } => true,
            BilancioError::StageFailed { detail, .. } => {
                let lower = detail.to_lowercase();
                lower.contains("api key")
                    || lower.contains("api_key")
                    || lower.contains("authentication")
                    || lower.contains("401")
            }
            _ => false,
        }
    }
}

/// The model reply could not be turned into a JSON value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to extract valid JSON. Preview: {preview}...")]
pub struct JsonExtractError {
    /// First 500 characters of the fence-stripped reply.
    pub preview: String,
}

/// A non-fatal event raised by a stage.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageWarning {
    /// The reply held no JSON; the stage substituted a default.
    #[error("could not parse reply, using fallback: {detail}")]
    ParseFallback { detail: String },

    /// Validation reported that assets and liabilities differ.
    #[error("Balance difference of €{formatted}")]
    Unbalanced { difference: f64, formatted: String },
}
