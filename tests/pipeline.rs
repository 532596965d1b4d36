//! Pipeline integration tests with a scripted model client.
//!
//! No network and no pdfium: the four stages run against canned replies,
//! and the document-loading error paths fail before anything is rendered.

use bilancio_agent::error::StageWarning;
use bilancio_agent::pipeline::llm::{ModelClient, ModelTier, StageReply, StageRequest};
use bilancio_agent::pipeline::stages::run_stages;
use bilancio_agent::{
    generate_with_client, BilancioError, GenerationProgressCallback, GeneratorConfig, Stage,
};
use edgequake_llm::ImageData;
use futures::future::BoxFuture;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Seen {
    stage: Stage,
    tier: ModelTier,
    prompt: String,
    attachments: usize,
    max_tokens: usize,
}

/// Replies in order; records every request it receives.
struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn ok(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(*r)).collect())
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl ModelClient for ScriptedClient {
    fn send<'a>(&'a self, request: &'a StageRequest) -> BoxFuture<'a, Result<StageReply, String>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(Seen {
                stage: request.stage,
                tier: request.tier,
                prompt: request.prompt.clone(),
                attachments: request.attachments.len(),
                max_tokens: request.max_tokens,
            });
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".to_string()));
            next.map(|content| StageReply {
                input_tokens: 100,
                output_tokens: content.len(),
                model: format!("{:?}", request.tier).to_lowercase(),
                content,
            })
        })
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl GenerationProgressCallback for Recorder {
    fn on_stage_start(&self, stage: Stage) {
        self.events.lock().unwrap().push(format!("start {stage}"));
    }
    fn on_stage_complete(&self, stage: Stage, _output_len: usize, _elapsed_ms: u64) {
        self.events.lock().unwrap().push(format!("done {stage}"));
    }
    fn on_stage_warning(&self, stage: Stage, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("warn {stage}: {message}"));
    }
}

fn config() -> GeneratorConfig {
    GeneratorConfig::builder()
        .max_retries(1)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

fn pages(n: usize) -> Vec<ImageData> {
    (0..n)
        .map(|_| ImageData::new("iVBORw0KGgo=", "image/png"))
        .collect()
}

const ANALYSIS: &str = r#"{"company_name": "ALFA S.R.L.", "fiscal_year": "2024",
    "closing_date": "31/12/2024", "has_balance_sheet": true, "has_income_statement": true,
    "document_quality": "good"}"#;

const EXTRACTION: &str = r#"```json
{"company_info": {"name": "ALFA S.R.L."},
 "stato_patrimoniale_attivo": {"TOTALE_ATTIVO": 10000},
 "stato_patrimoniale_passivo": {"TOTALE_PASSIVO": 10000},}
```"#;

const VALIDATION_OK: &str = r#"{"is_balanced": true, "balance_difference": 0,
    "corrections_made": ["ricalcolato totale B"],
    "corrected_data": {"company_info": {"name": "ALFA S.R.L."}, "fixed": true}}"#;

const FORMATTED: &str = "```\n**ALFA S.R.L.**\n\n\n\nSTATO PATRIMONIALE - ATTIVO\n| Cassa € 10.000 |\n```";

// ── Stage chain ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn four_stages_run_in_order_with_chained_data() {
    let client = ScriptedClient::ok(&[ANALYSIS, EXTRACTION, VALIDATION_OK, FORMATTED]);
    let output = run_stages(&client, &pages(3), &config()).await.unwrap();

    let seen = client.seen();
    let order: Vec<Stage> = seen.iter().map(|s| s.stage).collect();
    assert_eq!(order, Stage::ALL);

    // Documents go only to the first two stages.
    assert_eq!(seen[0].attachments, 3);
    assert_eq!(seen[1].attachments, 3);
    assert_eq!(seen[2].attachments, 0);
    assert_eq!(seen[3].attachments, 0);

    // Tiers and budgets.
    assert_eq!(seen[0].tier, ModelTier::Fast);
    assert_eq!(seen[1].tier, ModelTier::Deep);
    assert_eq!(seen[0].max_tokens, 1500);
    assert_eq!(seen[1].max_tokens, 7000);
    assert_eq!(seen[2].max_tokens, 6000);

    // Each prompt carries the previous stage's JSON.
    assert!(seen[1].prompt.contains(r#""company_name":"ALFA S.R.L.""#));
    assert!(seen[2].prompt.contains("TOTALE_ATTIVO"));
    assert!(seen[3].prompt.contains(r#""fixed": true"#));

    assert_eq!(output.summary["document_quality"], "good");
    assert_eq!(output.extracted["stato_patrimoniale_attivo"]["TOTALE_ATTIVO"], 10000);
    assert_eq!(output.validated["fixed"], true);

    let report = output.validation.as_ref().unwrap();
    assert!(report.is_balanced);
    assert_eq!(report.corrections, ["ricalcolato totale B"]);
    assert_eq!(output.warnings().count(), 0);

    assert_eq!(
        output.text,
        "ALFA S.R.L.\n\nSTATO PATRIMONIALE - ATTIVO\n Cassa € 10.000"
    );
    assert!(output.raw_text.starts_with("```"));

    assert_eq!(output.stages.len(), 4);
    assert_eq!(output.stats.total_input_tokens, 400);
    assert_eq!(output.stages[1].model, "deep");
}

#[tokio::test]
async fn analysis_fallback_and_unbalanced_warning() {
    let client = ScriptedClient::ok(&[
        "I could not read these documents.",
        r#"{"TOTALE_ATTIVO": 100}"#,
        r#"{"is_balanced": false, "balance_difference": 2500.5, "corrections_made": []}"#,
        "STATO PATRIMONIALE - ATTIVO",
    ]);
    let recorder = Arc::new(Recorder::default());
    let config = GeneratorConfig::builder()
        .progress_callback(Arc::clone(&recorder) as Arc<dyn GenerationProgressCallback>)
        .build()
        .unwrap();

    let output = run_stages(&client, &[], &config).await.unwrap();

    assert_eq!(output.summary, json!({"document_quality": "unknown"}));
    assert!(client.seen()[1]
        .prompt
        .contains(r#"{"document_quality":"unknown"}"#));

    // No corrected data: stage 4 formats the extracted data.
    assert_eq!(output.validated, json!({"TOTALE_ATTIVO": 100}));

    let warnings: Vec<(Stage, &StageWarning)> = output.warnings().collect();
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].0, Stage::Analysis);
    assert!(matches!(warnings[0].1, StageWarning::ParseFallback { .. }));
    assert_eq!(warnings[1].0, Stage::Validation);
    assert_eq!(warnings[1].1.to_string(), "Balance difference of €2,500.50");

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("start analysis"));
    assert!(events.contains(&"warn validation: Balance difference of €2,500.50".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("done formatting"));
}

#[tokio::test]
async fn extraction_without_json_is_fatal() {
    let client = ScriptedClient::ok(&[ANALYSIS, "Here is a summary of the documents."]);
    let err = run_stages(&client, &[], &config()).await.unwrap_err();

    match err {
        BilancioError::JsonExtraction { stage, source } => {
            assert_eq!(stage, Stage::Extraction);
            assert!(source.preview.contains("Here is a summary"));
        }
        other => panic!("expected JsonExtraction, got {other:?}"),
    }
    // Validation and formatting never ran.
    assert_eq!(client.seen().len(), 2);
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let client = ScriptedClient::new(vec![
        Err("529 overloaded"),
        Ok(ANALYSIS),
        Ok(EXTRACTION),
        Ok(VALIDATION_OK),
        Ok("CONTO ECONOMICO"),
    ]);
    let output = run_stages(&client, &[], &config()).await.unwrap();

    assert_eq!(output.stages[0].retries, 1);
    assert_eq!(output.stages[1].retries, 0);
    assert_eq!(output.text, "CONTO ECONOMICO");
}

#[tokio::test]
async fn exhausted_retries_fail_the_stage() {
    let client = ScriptedClient::new(vec![Ok(ANALYSIS), Err("boom"), Err("boom")]);
    let err = run_stages(&client, &[], &config()).await.unwrap_err();

    match err {
        BilancioError::StageFailed {
            stage, attempts, ..
        } => {
            assert_eq!(stage, Stage::Extraction);
            assert_eq!(attempts, 2);
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }
}

// ── Document loading (fails before rendering) ───────────────────────────────

#[tokio::test]
async fn no_documents() {
    let client = ScriptedClient::ok(&[]);
    let inputs: [&str; 0] = [];
    let err = generate_with_client(&inputs, &client, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, BilancioError::NoDocuments));
    assert!(client.seen().is_empty());
}

#[tokio::test]
async fn too_many_documents() {
    let client = ScriptedClient::ok(&[]);
    let inputs = ["a.pdf", "b.pdf", "c.pdf", "d.pdf", "e.pdf", "f.pdf"];
    let err = generate_with_client(&inputs, &client, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, BilancioError::TooManyFiles { max: 5, got: 6 }));
}

#[tokio::test]
async fn missing_file() {
    let client = ScriptedClient::ok(&[]);
    let err = generate_with_client(&["/definitely/not/here.pdf"], &client, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, BilancioError::FileNotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn non_pdf_content_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("statement.pdf");
    std::fs::write(&path, b"PK\x03\x04 this is a zip").unwrap();

    let client = ScriptedClient::ok(&[]);
    let input = path.to_string_lossy().into_owned();
    let err = generate_with_client(&[input], &client, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, BilancioError::NotAPdf { .. }), "got {err:?}");
}
