//! Route handlers.
//!
//! The upload handler follows a fixed sequence and records each step
//! (label + duration) and a log line for the results page:
//!
//! ```text
//! validate (CSRF, count, type, size) → save uploads → API key check
//!   → engine (four stages) → PDF → text backup → session update → cleanup
//! ```
//!
//! Uploads are removed only after success, so a failed run leaves the
//! inputs on disk for inspection.

use super::error::PageError;
use super::session::{session_id_from_headers, set_cookie_header};
use super::templates::{index_page, result_page, AgentStep, ResultView};
use super::AppState;
use crate::config::ServerConfig;
use crate::error::BilancioError;
use crate::generate::write_atomic;
use crate::layout::create_pdf;
use crate::pipeline::input::has_pdf_extension;
use crate::pipeline::llm::Stage;
use crate::progress::{GenerationProgressCallback, ProgressCallback};
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{error, info, warn};

/// Name the generated PDF is downloaded as.
pub const DOWNLOAD_NAME: &str = "bilancio_completo.pdf";

// ── GET / ────────────────────────────────────────────────────────────────

pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie_id = session_id_from_headers(&headers);
    let session = state.sessions.get_or_create(cookie_id.as_deref());
    let html = index_page(
        &session.csrf_token,
        state.config.max_files,
        state.config.max_file_size_mb(),
    );
    ([set_cookie_header(&session, state.session_ttl())], Html(html)).into_response()
}

// ── POST /upload ─────────────────────────────────────────────────────────

struct UploadedFile {
    name: String,
    bytes: Bytes,
}

#[derive(Default)]
struct UploadForm {
    csrf_token: Option<String>,
    /// A `files` part was present, even if empty.
    has_files_field: bool,
    files: Vec<UploadedFile>,
}

/// A body over the request limit surfaces as a multipart read error.
fn multipart_error(e: MultipartError, config: &ServerConfig) -> PageError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Upload rejected: request body over the size limit");
        return PageError::UploadTooLarge {
            max_mb: config.max_file_size_mb(),
            max_files: config.max_files,
        };
    }
    warn!("Failed to read multipart body: {e}");
    PageError::MalformedUpload(e.body_text())
}

async fn read_form(multipart: &mut Multipart, config: &ServerConfig) -> Result<UploadForm, PageError> {
    let mut form = UploadForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(e, config)),
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "csrf_token" => {
                form.csrf_token = field.text().await.ok();
            }
            "files" => {
                form.has_files_field = true;
                let name = field.file_name().unwrap_or("").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, config))?;
                form.files.push(UploadedFile { name, bytes });
            }
            _ => {}
        }
    }
    Ok(form)
}

fn validate_files(form: &UploadForm, state: &AppState) -> Result<(), PageError> {
    if !form.has_files_field {
        return Err(PageError::NoFilesUploaded);
    }
    if form.files.first().map_or(true, |f| f.name.is_empty()) {
        return Err(PageError::NoFilesSelected);
    }
    if form.files.len() > state.config.max_files {
        return Err(PageError::TooManyFiles {
            max: state.config.max_files,
        });
    }
    for file in &form.files {
        if !has_pdf_extension(Path::new(&file.name)) {
            return Err(PageError::InvalidFileType {
                name: file.name.clone(),
            });
        }
        if file.bytes.len() as u64 > state.config.max_file_size {
            return Err(PageError::FileTooLarge {
                name: file.name.clone(),
                size_mb: file.bytes.len() as f64 / (1024.0 * 1024.0),
                max_mb: state.config.max_file_size_mb(),
            });
        }
    }
    Ok(())
}

/// Collects stage events as agent log lines.
#[derive(Default)]
struct AgentLog {
    lines: Mutex<Vec<String>>,
}

impl AgentLog {
    fn push(&self, line: String) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl GenerationProgressCallback for AgentLog {
    fn on_generation_start(&self, documents: usize, total_pages: usize) {
        self.push(format!(
            "Rendered {total_pages} page(s) from {documents} document(s)."
        ));
    }

    fn on_stage_complete(&self, stage: Stage, _output_len: usize, elapsed_ms: u64) {
        self.push(format!(
            "Phase {}/4 ({}) completed in {elapsed_ms} ms.",
            stage.number(),
            stage.title()
        ));
    }

    fn on_stage_warning(&self, stage: Stage, message: &str) {
        self.push(format!("Warning in {}: {message}", stage.title()));
    }
}

/// Timeline of an upload request.
struct Progress {
    steps: Vec<AgentStep>,
    logs: Vec<String>,
    step_start: Instant,
}

impl Progress {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            logs: Vec::new(),
            step_start: Instant::now(),
        }
    }

    fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    fn step(&mut self, label: &str) {
        self.steps.push(AgentStep {
            label: label.to_string(),
            duration_ms: self.step_start.elapsed().as_millis() as u64,
        });
        self.step_start = Instant::now();
    }

    fn fail(self, error: PageError) -> Response {
        error.with_progress(self.steps, self.logs)
    }
}

/// User-facing message for a pipeline failure.
pub fn friendly_error(err: &BilancioError, max_files: usize) -> PageError {
    if err.is_api_key_problem() {
        return PageError::ApiConfiguration;
    }
    match err {
        BilancioError::TooManyFiles { .. } => PageError::Processing(format!(
            "Too many files. Please upload maximum {max_files} PDF files."
        )),
        other => PageError::Processing(format!("Error processing files: {other}")),
    }
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut progress = Progress::new();
    progress.log("Session started. Validating request and security token...");

    let form = match read_form(&mut multipart, &state.config).await {
        Ok(form) => form,
        Err(e) => return progress.fail(e),
    };

    let session = session_id_from_headers(&headers).and_then(|id| state.sessions.get(&id));
    let session = match session {
        Some(s) if state.sessions.verify_csrf(&s.id, form.csrf_token.as_deref().unwrap_or("")) => s,
        _ => {
            warn!("Upload rejected: missing or invalid CSRF token");
            return progress.fail(PageError::InvalidCsrf);
        }
    };

    if let Err(e) = validate_files(&form, &state) {
        info!("Upload rejected: {e}");
        return progress.fail(e);
    }

    // ── Save uploads ─────────────────────────────────────────────────────
    let mut saved = Vec::with_capacity(form.files.len());
    for file in &form.files {
        let path = state
            .config
            .upload_dir
            .join(format!("{}_{}", session.id, sanitize_filename(&file.name)));
        if let Err(e) = write_atomic(&path, &file.bytes).await {
            error!("Error saving upload {}: {e}", path.display());
            return progress.fail(PageError::Processing(format!(
                "Error processing files: Could not save file {}. Please try again.",
                file.name
            )));
        }
        saved.push(path);
    }
    info!("Saved {} upload(s) for session {}", saved.len(), session.id);
    progress.log(format!("Saved {} file(s) to disk.", saved.len()));
    progress.step("Files uploaded and saved");
    progress.log("Sending documents to Claude for analysis...");

    if !state.engine.api_key_configured() {
        error!("API key not configured; uploads kept at {:?}", saved);
        return progress.fail(PageError::ApiConfiguration);
    }

    // ── Generate ─────────────────────────────────────────────────────────
    let agent_log = Arc::new(AgentLog::default());
    let result = state
        .engine
        .generate(&saved, Arc::clone(&agent_log) as ProgressCallback)
        .await;
    progress.logs.extend(agent_log.take());

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            error!("Generation failed: {e}");
            warn!("Uploaded files preserved for debugging: {:?}", saved);
            return progress.fail(friendly_error(&e, state.config.max_files));
        }
    };
    progress.step("AI analysis (Claude)");
    progress.log("Received structured balance sheet from Claude.");

    // ── PDF ──────────────────────────────────────────────────────────────
    let output_filename = format!("{}_bilancio.pdf", session.id);
    let pdf_path = state.config.output_dir.join(&output_filename);
    let text = output.text.clone();
    let today = chrono::Local::now().date_naive();
    let pdf = match tokio::task::spawn_blocking(move || create_pdf(&text, today)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            error!("PDF layout failed: {e}");
            return progress.fail(friendly_error(&e, state.config.max_files));
        }
        Err(e) => {
            error!("PDF layout task panicked: {e}");
            return progress.fail(PageError::Internal);
        }
    };
    if let Err(e) = write_atomic(&pdf_path, &pdf).await {
        error!("{e}");
        return progress.fail(friendly_error(&e, state.config.max_files));
    }
    progress.step("PDF generation");
    progress.log(format!("PDF generated at {}.", pdf_path.display()));

    // ── Text backup ──────────────────────────────────────────────────────
    let txt_path = state
        .config
        .output_dir
        .join(format!("{}_bilancio.txt", session.id));
    if let Err(e) = write_atomic(&txt_path, output.text.as_bytes()).await {
        error!("{e}");
        return progress.fail(friendly_error(&e, state.config.max_files));
    }
    progress.step("Save text backup");
    progress.log(format!("Saved text backup at {}.", txt_path.display()));

    // ── Finalize ─────────────────────────────────────────────────────────
    state.sessions.set_output(&session.id, output_filename.clone());
    state.sessions.rotate_csrf(&session.id);
    remove_uploads(&saved).await;
    progress.step("Finalize & prepare download");
    progress.log("Finalized processing and prepared download link.");
    info!("Generated {} for session {}", output_filename, session.id);

    let download_url = format!("/download/{output_filename}");
    Html(result_page(&ResultView {
        download_url: Some(&download_url),
        filename: Some(&output_filename),
        steps: &progress.steps,
        logs: &progress.logs,
        ..Default::default()
    }))
    .into_response()
}

async fn remove_uploads(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!("Cleaned up {}", path.display()),
            Err(e) => warn!("Could not clean up {}: {e}", path.display()),
        }
    }
}

/// Sanitize a filename: strip path separators and special characters.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|&c| c != '/' && c != '\\' && c != '\0')
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Consecutive dots would allow traversal.
    let sanitized: String = sanitized.replace("..", "").chars().take(100).collect();

    if sanitized.is_empty() {
        "document".into()
    } else {
        sanitized
    }
}

// ── GET /download/:filename ──────────────────────────────────────────────

pub async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(filename): UrlPath<String>,
) -> Response {
    let session = session_id_from_headers(&headers).and_then(|id| state.sessions.get(&id));
    let expected = session.as_ref().and_then(|s| s.output_file.as_deref());
    if expected != Some(filename.as_str()) {
        warn!("Download of {filename} refused: not this session's output");
        return PageError::InvalidDownload.into_response();
    }

    let path = state.config.output_dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            info!("Downloading {}", path.display());
            (
                [
                    (CONTENT_TYPE, "application/pdf".to_string()),
                    (
                        CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{DOWNLOAD_NAME}\""),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            PageError::FileNotFound.into_response()
        }
        Err(e) => {
            error!("Error downloading {}: {e}", path.display());
            PageError::Download(e.to_string()).into_response()
        }
    }
}

// ── GET /health, GET /test ───────────────────────────────────────────────

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
    }))
}

/// Self-check report returned by `GET /test`.
#[derive(Debug, Serialize)]
pub struct Diagnostics {
    pub status: &'static str,
    pub api_key: &'static str,
    pub upload_folder: String,
    pub upload_exists: bool,
    pub upload_writable: bool,
    pub output_folder: String,
    pub output_exists: bool,
    pub output_writable: bool,
    /// `true`, or `"Failed: <reason>"`.
    pub file_creation_test: Value,
    pub max_file_size_mb: f64,
    pub version: &'static str,
}

async fn dir_status(dir: &Path) -> (bool, bool) {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => (true, !meta.permissions().readonly()),
        _ => (false, false),
    }
}

pub async fn diagnostics(State(state): State<AppState>) -> Json<Diagnostics> {
    let config = &state.config;
    let (upload_exists, upload_writable) = dir_status(&config.upload_dir).await;
    let (output_exists, output_writable) = dir_status(&config.output_dir).await;

    let probe = config.upload_dir.join("test.txt");
    let file_creation_test = match tokio::fs::write(&probe, b"test").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe).await;
            Value::Bool(true)
        }
        Err(e) => Value::String(format!("Failed: {e}")),
    };

    Json(Diagnostics {
        status: "ok",
        api_key: if state.engine.api_key_configured() {
            "configured"
        } else {
            "missing"
        },
        upload_folder: config.upload_dir.display().to_string(),
        upload_exists,
        upload_writable,
        output_folder: config.output_dir.display().to_string(),
        output_exists,
        output_writable,
        file_creation_test,
        max_file_size_mb: config.max_file_size_mb(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn not_found() -> PageError {
    PageError::NotFound
}
