//! Top-level generation entry points.
//!
//! [`generate_balance_sheet`] is what the CLI and the web server call. It
//! resolves the providers, then hands off to [`generate_with_client`],
//! which owns the document side of the pipeline (load, render, encode)
//! and delegates the model calls to [`crate::pipeline::stages`].

use crate::config::{api_key_configured, api_key_env_var, effective_provider_name, GeneratorConfig};
use crate::error::BilancioError;
use crate::layout::create_pdf;
use crate::output::BalanceSheetOutput;
use crate::pipeline::llm::{ModelClient, ProviderClient};
use crate::pipeline::{encode, input, render, stages};
use chrono::NaiveDate;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Generate a balance sheet from local PDF paths or URLs.
///
/// # Errors
/// Fatal errors only: unreadable inputs, a missing API key, a stage that
/// fails after all retries, or an extraction reply with no JSON in it.
/// Analysis and validation problems degrade to warnings on the output.
pub async fn generate_balance_sheet<S: AsRef<str>>(
    inputs: &[S],
    config: &GeneratorConfig,
) -> Result<BalanceSheetOutput, BilancioError> {
    let client = resolve_client(config)?;
    generate_with_client(inputs, &client, config).await
}

/// Same as [`generate_balance_sheet`] with a caller-supplied [`ModelClient`].
pub async fn generate_with_client<S: AsRef<str>>(
    inputs: &[S],
    client: &dyn ModelClient,
    config: &GeneratorConfig,
) -> Result<BalanceSheetOutput, BilancioError> {
    let total_start = Instant::now();
    info!("Starting generation for {} document(s)", inputs.len());

    // ── Step 1: Resolve inputs ───────────────────────────────────────────
    let documents = input::load_documents(inputs, config).await?;
    let paths: Vec<PathBuf> = documents.iter().map(|d| d.path().to_path_buf()).collect();

    // ── Step 2: Rasterise pages ──────────────────────────────────────────
    let render_start = Instant::now();
    let rendered = render::render_documents(paths, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Rendered {} pages in {}ms", rendered.len(), render_duration_ms);

    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_start(documents.len(), rendered.len());
    }

    // ── Step 3: Encode ───────────────────────────────────────────────────
    let attachments = encode::encode_pages(&rendered)?;
    drop(rendered);

    // ── Step 4: Prompt chain ─────────────────────────────────────────────
    let mut output = stages::run_stages(client, &attachments, config).await?;

    output.stats.documents = documents.len();
    output.stats.pages = attachments.len();
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Generation complete: {} chars, {}→{} tokens, {}ms",
        output.text.len(),
        output.stats.total_input_tokens,
        output.stats.total_output_tokens,
        output.stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_generation_complete(output.text.len(), output.stats.total_duration_ms);
    }

    Ok(output)
}

/// Generate, lay out the PDF and write both the PDF and the text backup.
///
/// Both files are written atomically (temp file + rename). `today` is the
/// date printed in the PDF footer.
pub async fn generate_to_files<S: AsRef<str>>(
    inputs: &[S],
    pdf_path: impl AsRef<Path>,
    txt_path: impl AsRef<Path>,
    config: &GeneratorConfig,
    today: NaiveDate,
) -> Result<BalanceSheetOutput, BilancioError> {
    let output = generate_balance_sheet(inputs, config).await?;
    write_outputs(&output.text, pdf_path.as_ref(), txt_path.as_ref(), today).await?;
    Ok(output)
}

/// Render `text` to a PDF at `pdf_path` and save the text itself at `txt_path`.
pub async fn write_outputs(
    text: &str,
    pdf_path: &Path,
    txt_path: &Path,
    today: NaiveDate,
) -> Result<(), BilancioError> {
    let pdf = create_pdf(text, today)?;
    write_atomic(pdf_path, &pdf).await?;
    info!("PDF written to {} ({} bytes)", pdf_path.display(), pdf.len());

    write_atomic(txt_path, text.as_bytes()).await?;
    info!("Text backup written to {}", txt_path.display());
    Ok(())
}

/// Synchronous wrapper around [`generate_balance_sheet`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync<S: AsRef<str>>(
    inputs: &[S],
    config: &GeneratorConfig,
) -> Result<BalanceSheetOutput, BilancioError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BilancioError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_balance_sheet(inputs, config))
}

/// Write `bytes` to `path` via a `.tmp` sibling and a rename, creating
/// the parent directory if needed.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BilancioError> {
    let write_err = |source| BilancioError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// Build the [`ProviderClient`] for `config`.
///
/// Each tier resolves independently, most specific first:
///
/// 1. **Pre-built provider** (`fast_provider` / `deep_provider`), used as-is.
/// 2. **Named provider** (`provider_name`, else `BILANCIO_LLM_PROVIDER`,
///    else `anthropic`) created through [`ProviderFactory`] with the tier's
///    model. `BILANCIO_FAST_MODEL` / `BILANCIO_DEEP_MODEL` override the
///    configured models when no provider was named explicitly.
///
/// The API key variable is checked up front so a missing key fails before
/// any PDF is rendered.
pub fn resolve_client(config: &GeneratorConfig) -> Result<ProviderClient, BilancioError> {
    let provider_name = effective_provider_name(config);
    let from_env = config.provider_name.is_none();

    let fast_model = model_for(from_env, "BILANCIO_FAST_MODEL", &config.fast_model);
    let deep_model = model_for(from_env, "BILANCIO_DEEP_MODEL", &config.deep_model);

    let fast = match config.fast_provider {
        Some(ref p) => Arc::clone(p),
        None => create_provider(&provider_name, &fast_model)?,
    };
    let deep = match config.deep_provider {
        Some(ref p) => Arc::clone(p),
        None => create_provider(&provider_name, &deep_model)?,
    };

    debug!(
        provider = %provider_name,
        fast = %fast_model,
        deep = %deep_model,
        "Resolved model providers"
    );
    Ok(ProviderClient::new(fast, fast_model, deep, deep_model))
}

fn model_for(from_env: bool, var: &str, configured: &str) -> String {
    if from_env {
        if let Ok(m) = std::env::var(var) {
            if !m.trim().is_empty() {
                return m.trim().to_string();
            }
        }
    }
    configured.to_string()
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, BilancioError> {
    if !api_key_configured(provider_name) {
        let var = api_key_env_var(provider_name).unwrap_or("the provider API key");
        return Err(BilancioError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("API key not found. Set {var} or create anthropic_api_key.txt"),
        });
    }

    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        BilancioError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
