//! Result types returned by the generation pipeline.

use crate::error::StageWarning;
use crate::pipeline::llm::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything one generation run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSheetOutput {
    /// Cleaned plain-text balance sheet, ready for the PDF renderer.
    pub text: String,
    /// Formatting-stage reply before cleanup.
    pub raw_text: String,
    /// Stage 1 document summary (or the `document_quality: unknown` fallback).
    pub summary: Value,
    /// Stage 2 structured data.
    pub extracted: Value,
    /// Data handed to the formatting stage: the corrected data when
    /// validation supplied it, the extracted data otherwise.
    pub validated: Value,
    /// Stage 3 verdict; `None` when its reply could not be parsed.
    pub validation: Option<ValidationReport>,
    /// One entry per stage, in execution order.
    pub stages: Vec<StageResult>,
    pub stats: GenerationStats,
}

impl BalanceSheetOutput {
    /// All warnings raised along the way.
    pub fn warnings(&self) -> impl Iterator<Item = (Stage, &StageWarning)> {
        self.stages
            .iter()
            .filter_map(|s| s.warning.as_ref().map(|w| (s.stage, w)))
    }

    /// The first `n` lines of the text, for console previews.
    pub fn preview(&self, n: usize) -> String {
        self.text.lines().take(n).collect::<Vec<_>>().join("\n")
    }
}

/// What the validation stage reported about the extracted figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_balanced: bool,
    /// TOTALE_ATTIVO − TOTALE_PASSIVO as reported by the model.
    pub balance_difference: f64,
    /// Free-text descriptions of each correction.
    pub corrections: Vec<String>,
    /// Whether `corrected_data` was present in the reply.
    pub has_corrected_data: bool,
}

/// Per-stage accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub model: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
    pub warning: Option<StageWarning>,
}

/// Totals for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    pub documents: usize,
    pub pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}
