//! Page-level errors with HTTP status mapping.
//!
//! Every failure the browser can see renders the results page with a
//! user-facing message. Upload failures also carry the steps and log lines
//! gathered before the failure.

use super::templates::{result_page, AgentStep, ResultView};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PageError {
    #[error("Invalid security token. Please refresh and try again.")]
    InvalidCsrf,
    #[error("Could not read the upload: {0}")]
    MalformedUpload(String),
    #[error("No files uploaded. Please select at least one PDF file.")]
    NoFilesUploaded,
    #[error("No files selected. Please choose at least one PDF file.")]
    NoFilesSelected,
    #[error("Too many files. Maximum {max} files allowed.")]
    TooManyFiles { max: usize },
    #[error("Invalid file type: {name}. Only PDF files are allowed.")]
    InvalidFileType { name: String },
    #[error("File {name} is too large ({size_mb:.1}MB). Maximum size is {max_mb:.0}MB.")]
    FileTooLarge {
        name: String,
        size_mb: f64,
        max_mb: f64,
    },
    /// The whole request went over the body limit before any file could be checked.
    #[error("Upload is too large. Each file may be at most {max_mb:.0}MB, with up to {max_files} files per upload.")]
    UploadTooLarge { max_mb: f64, max_files: usize },
    #[error("API configuration error. Please contact the administrator.")]
    ApiConfiguration,
    /// The pipeline failed; the message is already user-facing.
    #[error("{0}")]
    Processing(String),
    #[error("Invalid download request. Please generate a new balance sheet.")]
    InvalidDownload,
    #[error("File not found. It may have been deleted. Please generate a new balance sheet.")]
    FileNotFound,
    #[error("Error downloading file: {0}")]
    Download(String),
    #[error("Page not found.")]
    NotFound,
    #[error("Internal server error. Please try again.")]
    Internal,
}

impl PageError {
    pub fn status(&self) -> StatusCode {
        match self {
            PageError::InvalidCsrf | PageError::InvalidDownload => StatusCode::FORBIDDEN,
            PageError::MalformedUpload(_)
            | PageError::NoFilesUploaded
            | PageError::NoFilesSelected
            | PageError::TooManyFiles { .. }
            | PageError::InvalidFileType { .. }
            | PageError::FileTooLarge { .. } => StatusCode::BAD_REQUEST,
            PageError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PageError::FileNotFound | PageError::NotFound => StatusCode::NOT_FOUND,
            PageError::ApiConfiguration
            | PageError::Processing(_)
            | PageError::Download(_)
            | PageError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render with the steps and logs of a partially completed upload.
    pub fn with_progress(self, steps: Vec<AgentStep>, logs: Vec<String>) -> Response {
        let message = self.to_string();
        let html = result_page(&ResultView {
            error: Some(&message),
            steps: &steps,
            logs: &logs,
            ..Default::default()
        });
        (self.status(), Html(html)).into_response()
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        self.with_progress(Vec::new(), Vec::new())
    }
}
