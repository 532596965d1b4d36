//! LLM interaction: the [`ModelClient`] seam and the retrying stage call.
//!
//! Each stage becomes one [`StageRequest`]: a prompt, optionally the page
//! images, a model tier and a token budget. The request goes through a
//! [`ModelClient`]. In production that is [`ProviderClient`], which maps
//! tiers onto two edgequake-llm providers. In tests it is a scripted fake,
//! so the stage logic runs without network access.
//!
//! ## Retry Strategy
//!
//! Provider 429 / 529 (overloaded) errors are transient. Exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) spaces out the retries: with 500 ms
//! base and 2 retries the wait sequence is 500 ms → 1 s. Every attempt is
//! bounded by `api_timeout_secs`.

use crate::config::GeneratorConfig;
use crate::error::BilancioError;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

// ── Stages ───────────────────────────────────────────────────────────────

/// One of the four sequential model calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Document summary (company, date, which sections exist).
    Analysis,
    /// Full structured extraction into the Italian schema.
    Extraction,
    /// Arithmetic checks and corrections.
    Validation,
    /// Plain-text balance-sheet rendering.
    Formatting,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [
        Stage::Analysis,
        Stage::Extraction,
        Stage::Validation,
        Stage::Formatting,
    ];

    /// 1-based position in the chain.
    pub fn number(self) -> usize {
        match self {
            Stage::Analysis => 1,
            Stage::Extraction => 2,
            Stage::Validation => 3,
            Stage::Formatting => 4,
        }
    }

    /// Human-readable phase title.
    pub fn title(self) -> &'static str {
        match self {
            Stage::Analysis => "Document Analysis",
            Stage::Extraction => "Data Extraction",
            Stage::Validation => "Validation and Calculations",
            Stage::Formatting => "Balance Sheet Formatting",
        }
    }

    /// Which model tier serves this stage.
    pub fn tier(self) -> ModelTier {
        match self {
            Stage::Extraction => ModelTier::Deep,
            _ => ModelTier::Fast,
        }
    }

    /// Whether the page images are attached to the request.
    pub fn reads_documents(self) -> bool {
        matches!(self, Stage::Analysis | Stage::Extraction)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Analysis => "analysis",
            Stage::Extraction => "extraction",
            Stage::Validation => "validation",
            Stage::Formatting => "formatting",
        })
    }
}

/// Cheap-and-fast versus slow-and-thorough model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Fast,
    Deep,
}

// ── Requests and replies ─────────────────────────────────────────────────

/// Everything a client needs to make one stage call.
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub stage: Stage,
    pub tier: ModelTier,
    pub prompt: String,
    /// Page images; empty for the text-only stages.
    pub attachments: Vec<ImageData>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl StageRequest {
    /// Build the request for `stage` using the budgets in `config`.
    pub fn new(
        stage: Stage,
        prompt: impl Into<String>,
        attachments: Vec<ImageData>,
        config: &GeneratorConfig,
    ) -> Self {
        Self {
            stage,
            tier: stage.tier(),
            prompt: prompt.into(),
            attachments,
            max_tokens: config.max_tokens_for(stage),
            temperature: config.temperature,
        }
    }
}

/// Raw model reply for one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub model: String,
}

/// A reply plus the cost of getting it.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub reply: StageReply,
    /// Attempts beyond the first.
    pub retries: u32,
    pub duration_ms: u64,
}

// ── Client seam ──────────────────────────────────────────────────────────

/// Sends one stage request to a model.
///
/// Errors are plain strings: the retry loop only needs something to log and
/// to report once attempts run out.
pub trait ModelClient: Send + Sync {
    fn send<'a>(&'a self, request: &'a StageRequest) -> BoxFuture<'a, Result<StageReply, String>>;
}

/// [`ModelClient`] backed by two edgequake-llm providers.
#[derive(Clone)]
pub struct ProviderClient {
    fast: Arc<dyn LLMProvider>,
    fast_model: String,
    deep: Arc<dyn LLMProvider>,
    deep_model: String,
}

impl ProviderClient {
    pub fn new(
        fast: Arc<dyn LLMProvider>,
        fast_model: impl Into<String>,
        deep: Arc<dyn LLMProvider>,
        deep_model: impl Into<String>,
    ) -> Self {
        Self {
            fast,
            fast_model: fast_model.into(),
            deep,
            deep_model: deep_model.into(),
        }
    }

    fn route(&self, tier: ModelTier) -> (&Arc<dyn LLMProvider>, &str) {
        match tier {
            ModelTier::Fast => (&self.fast, &self.fast_model),
            ModelTier::Deep => (&self.deep, &self.deep_model),
        }
    }
}

impl ModelClient for ProviderClient {
    fn send<'a>(&'a self, request: &'a StageRequest) -> BoxFuture<'a, Result<StageReply, String>> {
        Box::pin(async move {
            let (provider, model) = self.route(request.tier);
            let messages = build_messages(request);
            let options = build_options(request);

            let response = provider
                .chat(&messages, Some(&options))
                .await
                .map_err(|e| format!("{}", e))?;

            Ok(StageReply {
                content: response.content,
                input_tokens: response.prompt_tokens,
                output_tokens: response.completion_tokens,
                model: model.to_string(),
            })
        })
    }
}

/// One user turn: the page images (if any) followed by the prompt text.
fn build_messages(request: &StageRequest) -> Vec<ChatMessage> {
    if request.attachments.is_empty() {
        vec![ChatMessage::user(request.prompt.as_str())]
    } else {
        vec![ChatMessage::user_with_images(
            request.prompt.as_str(),
            request.attachments.clone(),
        )]
    }
}

fn build_options(request: &StageRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_tokens),
        ..Default::default()
    }
}

// ── Retrying call ────────────────────────────────────────────────────────

/// Upper bound for a single backoff sleep.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Sleep before retry number `attempt` (1-based): `base_ms * 2^(attempt-1)`,
/// capped at [`MAX_BACKOFF_MS`].
pub fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Send `request`, retrying with exponential backoff.
///
/// Fails with [`BilancioError::StageTimeout`] when the last attempt timed
/// out and [`BilancioError::StageFailed`] otherwise.
pub async fn call_stage(
    client: &dyn ModelClient,
    request: &StageRequest,
    config: &GeneratorConfig,
) -> Result<StageOutcome, BilancioError> {
    let start = Instant::now();
    let stage = request.stage;
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    let mut last_err = String::from("Unknown error");
    let mut last_timed_out = false;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Stage {}: retry {}/{} after {}ms",
                stage, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_timeout, client.send(request)).await {
            Ok(Ok(reply)) => {
                let duration = start.elapsed();
                debug!(
                    "Stage {}: {} input tokens, {} output tokens, {:?}",
                    stage, reply.input_tokens, reply.output_tokens, duration
                );
                return Ok(StageOutcome {
                    reply,
                    retries: attempt,
                    duration_ms: duration.as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                warn!("Stage {}: attempt {} failed: {}", stage, attempt + 1, e);
                last_err = e;
                last_timed_out = false;
            }
            Err(_) => {
                warn!(
                    "Stage {}: attempt {} timed out after {}s",
                    stage,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_timed_out = true;
            }
        }
    }

    if last_timed_out {
        Err(BilancioError::StageTimeout {
            stage,
            secs: config.api_timeout_secs,
        })
    } else {
        Err(BilancioError::StageFailed {
            stage,
            attempts: config.max_retries.saturating_add(1),
            detail: last_err,
        })
    }
}
