//! Router tests driven through `tower::ServiceExt::oneshot`.
//!
//! A stub engine stands in for the pipeline, so these run without pdfium,
//! an API key or network access. The PDF layout step is real.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bilancio_agent::output::BalanceSheetOutput;
use bilancio_agent::progress::ProgressCallback;
use bilancio_agent::server::{router, AppState, BalanceSheetEngine, SESSION_COOKIE};
use bilancio_agent::{BilancioError, GenerationProgressCallback, ServerConfig};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

const BOUNDARY: &str = "----bilancio-test-boundary";
const PDF_BYTES: &[u8] = b"%PDF-1.4\n% test document\n%%EOF\n";

enum Outcome {
    Text(&'static str),
    Fail(fn() -> BilancioError),
}

struct StubEngine {
    key: bool,
    outcome: Outcome,
    /// Inputs of every call, with whether each file existed at the time.
    calls: Mutex<Vec<Vec<(PathBuf, bool)>>>,
}

impl StubEngine {
    fn new(key: bool, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            key,
            outcome,
            calls: Mutex::new(Vec::new()),
        })
    }
}

impl BalanceSheetEngine for StubEngine {
    fn api_key_configured(&self) -> bool {
        self.key
    }

    fn generate<'a>(
        &'a self,
        inputs: &'a [PathBuf],
        progress: ProgressCallback,
    ) -> BoxFuture<'a, Result<BalanceSheetOutput, BilancioError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(
                inputs
                    .iter()
                    .map(|p| (p.clone(), p.is_file()))
                    .collect(),
            );
            progress.on_generation_start(inputs.len(), inputs.len());
            match &self.outcome {
                Outcome::Text(text) => Ok(BalanceSheetOutput {
                    text: text.to_string(),
                    raw_text: text.to_string(),
                    summary: json!({"document_quality": "good"}),
                    extracted: json!({}),
                    validated: json!({}),
                    validation: None,
                    stages: vec![],
                    stats: Default::default(),
                }),
                Outcome::Fail(make) => Err(make()),
            }
        })
    }
}

struct Harness {
    app: Router,
    engine: Arc<StubEngine>,
    upload_dir: PathBuf,
    output_dir: PathBuf,
    _tmp: TempDir,
}

fn harness(engine: Arc<StubEngine>) -> Harness {
    harness_with(engine, |_| {})
}

fn harness_with(engine: Arc<StubEngine>, tweak: impl FnOnce(&mut ServerConfig)) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let upload_dir = tmp.path().join("uploads");
    let output_dir = tmp.path().join("outputs");
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::create_dir_all(&output_dir).unwrap();

    let mut config = ServerConfig {
        upload_dir: upload_dir.clone(),
        output_dir: output_dir.clone(),
        ..ServerConfig::default()
    };
    tweak(&mut config);

    let state = AppState::new(config, Arc::clone(&engine) as Arc<dyn BalanceSheetEngine>);
    Harness {
        app: router(state),
        engine,
        upload_dir,
        output_dir,
        _tmp: tmp,
    }
}

fn sample_text() -> Outcome {
    Outcome::Text("ALFA S.R.L.\n\nSTATO PATRIMONIALE - ATTIVO\nCassa 10.000\nTOTALE ATTIVO 10.000")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

fn text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

/// GET / and return the `Cookie` value and CSRF token it hands out.
async fn start_session(app: &Router) -> (String, String) {
    let (status, headers, body) = send(app, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let set_cookie = headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    let cookie = set_cookie.split(';').next().unwrap().to_string();
    assert!(cookie.starts_with(&format!("{SESSION_COOKIE}=")));

    let html = text(&body);
    let marker = r#"name="csrf_token" value=""#;
    let start = html.find(marker).unwrap() + marker.len();
    let len = html[start..].find('"').unwrap();
    let token = html[start..start + len].to_string();
    assert!(!token.is_empty());

    (cookie, token)
}

/// Build a multipart body. `files` entries are `(filename, bytes)`.
fn multipart(csrf: Option<&str>, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(token) = csrf {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"csrf_token\"\r\n\r\n{token}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
                 Content-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(cookie: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::post("/upload").header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

fn download_request(cookie: &str, filename: &str) -> Request<Body> {
    Request::get(format!("/download/{filename}"))
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn session_id(cookie: &str) -> &str {
    cookie.split_once('=').map(|(_, v)| v).unwrap()
}

// ── Simple routes ────────────────────────────────────────────────────────────

#[tokio::test]
async fn index_sets_cookie_and_embeds_token() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (status, headers, body) =
        send(&h.app, Request::get("/").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    let set_cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));

    let html = text(&body);
    assert!(html.contains(r#"action="/upload""#));
    assert!(html.contains(r#"name="csrf_token""#));
}

#[tokio::test]
async fn index_reuses_existing_session() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (cookie, token) = start_session(&h.app).await;

    let request = Request::get("/")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (_, headers, body) = send(&h.app, request).await;

    let again = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(again.starts_with(&cookie));
    assert!(text(&body).contains(&token));
}

#[tokio::test]
async fn health_reports_service() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (status, _, body) = send(&h.app, Request::get("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "bilancio-agent");
}

#[tokio::test]
async fn diagnostics_report_directories_and_key() {
    let h = harness(StubEngine::new(false, sample_text()));
    let (status, _, body) = send(&h.app, Request::get("/test").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["api_key"], "missing");
    assert_eq!(json["upload_exists"], true);
    assert_eq!(json["output_exists"], true);
    assert_eq!(json["file_creation_test"], true);
    assert_eq!(json["max_file_size_mb"], 10.0);
    // The probe file is removed again.
    assert!(files_in(&h.upload_dir).is_empty());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (status, _, body) =
        send(&h.app, Request::get("/nope").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(text(&body).contains("Page not found."));
}

// ── Upload validation ────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_without_session_is_forbidden() {
    let h = harness(StubEngine::new(true, sample_text()));
    let body = multipart(Some("whatever"), &[("a.pdf", PDF_BYTES)]);
    let (status, _, body) = send(&h.app, upload_request(None, body)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(text(&body).contains("Invalid security token"));
    assert!(files_in(&h.upload_dir).is_empty());
}

#[tokio::test]
async fn upload_with_wrong_token_is_forbidden() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (cookie, _) = start_session(&h.app).await;
    let body = multipart(Some("not-the-token"), &[("a.pdf", PDF_BYTES)]);
    let (status, _, _) = send(&h.app, upload_request(Some(&cookie), body)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(h.engine.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upload_without_files_field() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (cookie, token) = start_session(&h.app).await;
    let body = multipart(Some(&token), &[]);
    let (status, _, body) = send(&h.app, upload_request(Some(&cookie), body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text(&body).contains("No files uploaded"));
}

#[tokio::test]
async fn upload_with_empty_selection() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (cookie, token) = start_session(&h.app).await;
    let body = multipart(Some(&token), &[("", &b""[..])]);
    let (status, _, body) = send(&h.app, upload_request(Some(&cookie), body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text(&body).contains("No files selected"));
}

#[tokio::test]
async fn upload_rejects_wrong_extension() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (cookie, token) = start_session(&h.app).await;
    let body = multipart(
        Some(&token),
        &[("a.pdf", PDF_BYTES), ("notes.docx", &b"PK\x03\x04"[..])],
    );
    let (status, _, body) = send(&h.app, upload_request(Some(&cookie), body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text(&body).contains("Invalid file type: notes.docx"));
    // Nothing is saved when any file is rejected.
    assert!(files_in(&h.upload_dir).is_empty());
}

#[tokio::test]
async fn upload_rejects_too_many_files() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (cookie, token) = start_session(&h.app).await;
    let names = ["1.pdf", "2.pdf", "3.pdf", "4.pdf", "5.pdf", "6.pdf"];
    let files: Vec<(&str, &[u8])> = names.iter().map(|n| (*n, PDF_BYTES)).collect();
    let body = multipart(Some(&token), &files);
    let (status, _, body) = send(&h.app, upload_request(Some(&cookie), body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text(&body).contains("Too many files. Maximum 5 files allowed."));
}

#[tokio::test]
async fn upload_rejects_oversized_file() {
    let h = harness_with(StubEngine::new(true, sample_text()), |c| {
        c.max_file_size = 1024 * 1024;
    });
    let (cookie, token) = start_session(&h.app).await;
    let big = vec![b'x'; 1024 * 1024 + 512 * 1024];
    let body = multipart(Some(&token), &[("big.pdf", big.as_slice())]);
    let (status, _, body) = send(&h.app, upload_request(Some(&cookie), body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(text(&body).contains("File big.pdf is too large (1.5MB). Maximum size is 1MB."));
}

#[tokio::test]
async fn body_over_limit_reports_too_large() {
    // Body limit is 5 * 1 KiB + 1 MiB; two MiB goes past it.
    let h = harness_with(StubEngine::new(true, sample_text()), |c| {
        c.max_file_size = 1024;
    });
    let (cookie, token) = start_session(&h.app).await;
    let big = vec![b'x'; 2 * 1024 * 1024];
    let body = multipart(Some(&token), &[("big.pdf", big.as_slice())]);
    let (status, _, body) = send(&h.app, upload_request(Some(&cookie), body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    let html = text(&body);
    assert!(html.contains("Upload is too large"), "{html}");
    assert!(!html.contains("Could not read the upload"));
    assert!(files_in(&h.upload_dir).is_empty());
}

// ── Generation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_api_key_keeps_uploads() {
    let h = harness(StubEngine::new(false, sample_text()));
    let (cookie, token) = start_session(&h.app).await;
    let body = multipart(Some(&token), &[("bilancio 2024.pdf", PDF_BYTES)]);
    let (status, _, body) = send(&h.app, upload_request(Some(&cookie), body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let html = text(&body);
    assert!(html.contains("API configuration error"));
    assert!(html.contains("Saved 1 file(s) to disk."));

    let expected = format!("{}_bilancio_2024.pdf", session_id(&cookie));
    assert_eq!(files_in(&h.upload_dir), [expected]);
    assert!(h.engine.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn engine_failure_is_reported_and_uploads_kept() {
    let engine = StubEngine::new(
        true,
        Outcome::Fail(|| BilancioError::Internal("no pages".to_string())),
    );
    let h = harness(engine);
    let (cookie, token) = start_session(&h.app).await;
    let body = multipart(Some(&token), &[("a.pdf", PDF_BYTES)]);
    let (status, _, body) = send(&h.app, upload_request(Some(&cookie), body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text(&body).contains("Error processing files"));
    assert_eq!(files_in(&h.upload_dir).len(), 1);
    assert!(files_in(&h.output_dir).is_empty());
}

#[tokio::test]
async fn successful_upload_generates_and_downloads() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (cookie, token) = start_session(&h.app).await;
    let sid = session_id(&cookie).to_string();

    let body = multipart(
        Some(&token),
        &[("stato patrimoniale.pdf", PDF_BYTES), ("conto.pdf", PDF_BYTES)],
    );
    let (status, _, body) = send(&h.app, upload_request(Some(&cookie), body)).await;
    let html = text(&body);
    assert_eq!(status, StatusCode::OK, "{html}");

    // The engine saw both saved uploads.
    let calls = h.engine.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 2);
    assert!(calls[0].iter().all(|(_, existed)| *existed));
    assert!(calls[0][0]
        .0
        .ends_with(format!("{sid}_stato_patrimoniale.pdf")));

    // Uploads are cleaned up; outputs are written.
    assert!(files_in(&h.upload_dir).is_empty());
    let pdf_name = format!("{sid}_bilancio.pdf");
    let txt_name = format!("{sid}_bilancio.txt");
    assert_eq!(files_in(&h.output_dir), [pdf_name.clone(), txt_name.clone()]);
    let backup = std::fs::read_to_string(h.output_dir.join(&txt_name)).unwrap();
    assert!(backup.starts_with("ALFA S.R.L."));

    // Results page lists the steps, the agent log and the link.
    assert!(html.contains(&format!("/download/{pdf_name}")));
    for label in [
        "Files uploaded and saved",
        "AI analysis (Claude)",
        "PDF generation",
        "Save text backup",
        "Finalize &amp; prepare download",
    ] {
        assert!(html.contains(label), "missing step {label}");
    }
    assert!(html.contains("Rendered 2 page(s) from 2 document(s)."));

    // Download serves the PDF as an attachment.
    let (status, headers, bytes) = send(&h.app, download_request(&cookie, &pdf_name)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"bilancio_completo.pdf\""
    );
    assert!(bytes.starts_with(b"%PDF"));

    // The token rotates after a successful upload.
    let reused = multipart(Some(&token), &[("a.pdf", PDF_BYTES)]);
    let (status, _, _) = send(&h.app, upload_request(Some(&cookie), reused)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn raised_file_limit_reaches_the_engine() {
    let h = harness_with(StubEngine::new(true, sample_text()), |c| {
        c.max_files = 6;
    });
    let (cookie, token) = start_session(&h.app).await;
    let names = ["1.pdf", "2.pdf", "3.pdf", "4.pdf", "5.pdf", "6.pdf"];
    let files: Vec<(&str, &[u8])> = names.iter().map(|n| (*n, PDF_BYTES)).collect();
    let body = multipart(Some(&token), &files);
    let (status, _, body) = send(&h.app, upload_request(Some(&cookie), body)).await;

    assert_eq!(status, StatusCode::OK, "{}", text(&body));
    let calls = h.engine.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 6);
}

// ── Download guards ──────────────────────────────────────────────────────────

#[tokio::test]
async fn download_of_other_file_is_forbidden() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (cookie, token) = start_session(&h.app).await;
    let body = multipart(Some(&token), &[("a.pdf", PDF_BYTES)]);
    let (status, _, _) = send(&h.app, upload_request(Some(&cookie), body)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) =
        send(&h.app, download_request(&cookie, "someone_else_bilancio.pdf")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(text(&body).contains("Invalid download request"));
}

#[tokio::test]
async fn download_without_generation_is_forbidden() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (cookie, _) = start_session(&h.app).await;
    let name = format!("{}_bilancio.pdf", session_id(&cookie));

    let (status, _, _) = send(&h.app, download_request(&cookie, &name)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn download_of_deleted_output_is_404() {
    let h = harness(StubEngine::new(true, sample_text()));
    let (cookie, token) = start_session(&h.app).await;
    let body = multipart(Some(&token), &[("a.pdf", PDF_BYTES)]);
    let (status, _, _) = send(&h.app, upload_request(Some(&cookie), body)).await;
    assert_eq!(status, StatusCode::OK);

    let name = format!("{}_bilancio.pdf", session_id(&cookie));
    std::fs::remove_file(h.output_dir.join(&name)).unwrap();

    let (status, _, body) = send(&h.app, download_request(&cookie, &name)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(text(&body).contains("File not found"));
}
