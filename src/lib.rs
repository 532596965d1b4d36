//! # bilancio-agent
//!
//! Generate an Italian balance sheet (*bilancio d'esercizio*) from PDF
//! financial statements with a four-stage LLM prompt chain, then lay it out
//! as a formatted PDF.
//!
//! ## Why this crate?
//!
//! Trial balances and statements arrive as scanned or exported PDFs with
//! inconsistent layouts. Text extraction mangles the tables, so each page is
//! rasterised and read by a vision model instead. A single prompt cannot
//! both read the documents and produce a civil-code balance sheet reliably,
//! so the work is split into four narrow stages whose JSON outputs feed one
//! another.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDFs
//!  │
//!  ├─ 1. Input       resolve local files or download URLs (≤ 5 documents)
//!  ├─ 2. Render      rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Encode      PNG → base64 ImageData
//!  ├─ 4. Analysis    fast model: company, date, sections present
//!  ├─ 5. Extraction  deep model: full Stato Patrimoniale / Conto Economico JSON
//!  ├─ 6. Validation  fast model: totals, balance check, corrections
//!  ├─ 7. Formatting  fast model: plain-text balance sheet
//!  ├─ 8. Cleanup     strip Markdown markers
//!  └─ 9. Layout      A4 PDF with tables, notes and footer (printpdf)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bilancio_agent::{generate_balance_sheet, GeneratorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads ANTHROPIC_API_KEY (or the key of BILANCIO_LLM_PROVIDER)
//!     let config = GeneratorConfig::default();
//!     let output = generate_balance_sheet(&["bilancio_2024.pdf"], &config).await?;
//!     println!("{}", output.text);
//!     for (stage, warning) in output.warnings() {
//!         eprintln!("{stage}: {warning}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! To write the PDF and text backup directly use [`generate_to_files`]; to
//! serve the upload form use [`server::serve`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bilancio` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! bilancio-agent = { version = "0.3", default-features = false }
//! ```
//!
//! ## Models
//!
//! | Stage | Tier | Default model |
//! |-------|------|---------------|
//! | Analysis   | fast | `claude-haiku-4-5` |
//! | Extraction | deep | `claude-sonnet-4-5` |
//! | Validation | fast | `claude-haiku-4-5` |
//! | Formatting | fast | `claude-haiku-4-5` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod generate;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{load_api_key_file, ApiKeySource, GeneratorConfig, GeneratorConfigBuilder, ServerConfig};
pub use error::{BilancioError, JsonExtractError, StageWarning};
pub use generate::{
    generate_balance_sheet, generate_sync, generate_to_files, generate_with_client, write_outputs,
};
pub use layout::create_pdf;
pub use output::{BalanceSheetOutput, GenerationStats, StageResult, ValidationReport};
pub use pipeline::llm::{ModelClient, ModelTier, Stage};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
