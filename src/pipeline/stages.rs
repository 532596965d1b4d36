//! The four-stage prompt chain.
//!
//! ```text
//! pages ─▶ 1 analysis ─▶ 2 extraction ─▶ 3 validation ─▶ 4 formatting ─▶ cleanup
//!          (fast, imgs)  (deep, imgs)    (fast, text)    (fast, text)
//! ```
//!
//! Stages run strictly in sequence; each prompt embeds the JSON produced by
//! the previous one. Only extraction is allowed to fail on unparseable
//! output. Analysis falls back to `{"document_quality": "unknown"}` and
//! validation falls back to the extracted data, each leaving a
//! [`StageWarning`] behind.

use crate::config::GeneratorConfig;
use crate::error::{BilancioError, StageWarning};
use crate::output::{BalanceSheetOutput, GenerationStats, StageResult, ValidationReport};
use crate::pipeline::json_extract::extract_json;
use crate::pipeline::llm::{call_stage, ModelClient, Stage, StageOutcome, StageRequest};
use crate::pipeline::postprocess::cleanup_formatting;
use crate::prompts;
use edgequake_llm::ImageData;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{info, warn};

/// Run all four stages over the encoded page images.
///
/// `stats.documents`, `stats.pages` and the render timing are left at zero;
/// the caller knows them.
pub async fn run_stages(
    client: &dyn ModelClient,
    attachments: &[ImageData],
    config: &GeneratorConfig,
) -> Result<BalanceSheetOutput, BilancioError> {
    let llm_start = Instant::now();
    let mut stages = Vec::with_capacity(Stage::ALL.len());

    // ── Stage 1: document analysis ───────────────────────────────────────
    let outcome = run_stage(
        client,
        Stage::Analysis,
        prompts::analysis_prompt(),
        attachments,
        config,
    )
    .await?;
    let (summary, warning) = match extract_json(&outcome.reply.content) {
        Ok(v) => (v, None),
        Err(e) => {
            let w = StageWarning::ParseFallback {
                detail: e.to_string(),
            };
            report_warning(config, Stage::Analysis, &w);
            (json!({"document_quality": "unknown"}), Some(w))
        }
    };
    stages.push(stage_result(Stage::Analysis, &outcome, warning));

    // ── Stage 2: full extraction ─────────────────────────────────────────
    let outcome = run_stage(
        client,
        Stage::Extraction,
        &prompts::extraction_prompt(&summary),
        attachments,
        config,
    )
    .await?;
    let extracted = extract_json(&outcome.reply.content).map_err(|source| {
        warn!("Extraction failed: {}", source);
        BilancioError::JsonExtraction {
            stage: Stage::Extraction,
            source,
        }
    })?;
    stages.push(stage_result(Stage::Extraction, &outcome, None));

    // ── Stage 3: validation ──────────────────────────────────────────────
    let outcome = run_stage(
        client,
        Stage::Validation,
        &prompts::validation_prompt(&extracted),
        &[],
        config,
    )
    .await?;
    let (validated, validation, warning) = interpret_validation(&outcome.reply.content, &extracted);
    if let Some(ref w) = warning {
        report_warning(config, Stage::Validation, w);
    }
    stages.push(stage_result(Stage::Validation, &outcome, warning));

    // ── Stage 4: formatting ──────────────────────────────────────────────
    let outcome = run_stage(
        client,
        Stage::Formatting,
        &prompts::formatting_prompt(&validated),
        &[],
        config,
    )
    .await?;
    let raw_text = outcome.reply.content.trim().to_string();
    let text = cleanup_formatting(&raw_text);
    stages.push(stage_result(Stage::Formatting, &outcome, None));

    let stats = GenerationStats {
        total_input_tokens: stages.iter().map(|s| s.input_tokens as u64).sum(),
        total_output_tokens: stages.iter().map(|s| s.output_tokens as u64).sum(),
        llm_duration_ms: llm_start.elapsed().as_millis() as u64,
        ..Default::default()
    };

    Ok(BalanceSheetOutput {
        text,
        raw_text,
        summary,
        extracted,
        validated,
        validation,
        stages,
        stats,
    })
}

async fn run_stage(
    client: &dyn ModelClient,
    stage: Stage,
    prompt: &str,
    attachments: &[ImageData],
    config: &GeneratorConfig,
) -> Result<StageOutcome, BilancioError> {
    info!("PHASE {}: {}", stage.number(), stage.title());
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage);
    }

    let attachments = if stage.reads_documents() {
        attachments.to_vec()
    } else {
        Vec::new()
    };
    let request = StageRequest::new(stage, prompt, attachments, config);
    let outcome = call_stage(client, &request, config).await?;

    info!(
        "Stage {} complete ({}→{} tokens)",
        stage, outcome.reply.input_tokens, outcome.reply.output_tokens
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(stage, outcome.reply.content.len(), outcome.duration_ms);
    }
    Ok(outcome)
}

fn stage_result(stage: Stage, outcome: &StageOutcome, warning: Option<StageWarning>) -> StageResult {
    StageResult {
        stage,
        model: outcome.reply.model.clone(),
        input_tokens: outcome.reply.input_tokens,
        output_tokens: outcome.reply.output_tokens,
        duration_ms: outcome.duration_ms,
        retries: outcome.retries,
        warning,
    }
}

fn report_warning(config: &GeneratorConfig, stage: Stage, warning: &StageWarning) {
    warn!("Stage {}: {}", stage, warning);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_warning(stage, &warning.to_string());
    }
}

/// Turn the validation reply into the data for stage 4.
///
/// Returns the data to format, the parsed report (if any) and a warning
/// when the reply was unusable or the sheet does not balance.
pub fn interpret_validation(
    reply: &str,
    extracted: &Value,
) -> (Value, Option<ValidationReport>, Option<StageWarning>) {
    let parsed = match extract_json(reply) {
        Ok(v) if v.is_object() => v,
        Ok(_) => {
            let w = StageWarning::ParseFallback {
                detail: "validation reply is not a JSON object; using extracted data".into(),
            };
            return (extracted.clone(), None, Some(w));
        }
        Err(e) => {
            let w = StageWarning::ParseFallback {
                detail: format!("{e}; using extracted data"),
            };
            return (extracted.clone(), None, Some(w));
        }
    };

    let is_balanced = parsed
        .get("is_balanced")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let balance_difference = parsed
        .get("balance_difference")
        .and_then(number_like)
        .unwrap_or(0.0);
    let corrections: Vec<String> = parsed
        .get("corrections_made")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(describe_correction).collect())
        .unwrap_or_default();

    let corrected = parsed.get("corrected_data").filter(|v| v.is_object());
    let report = ValidationReport {
        is_balanced,
        balance_difference,
        corrections,
        has_corrected_data: corrected.is_some(),
    };

    if is_balanced {
        info!("Balance sheet is balanced");
    }
    if !report.corrections.is_empty() {
        info!("Made {} corrections", report.corrections.len());
    }

    let warning = (!is_balanced).then(|| StageWarning::Unbalanced {
        difference: balance_difference,
        formatted: format_thousands(balance_difference),
    });

    let data = corrected.cloned().unwrap_or_else(|| extracted.clone());
    (data, Some(report), warning)
}

/// Numbers sometimes come back as strings such as `"1,234.56"`.
fn number_like(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}

fn describe_correction(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `1234.5` → `1,234.50`; comma thousands, two decimals.
pub fn format_thousands(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}
