//! Pipeline stages for balance-sheet generation.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ stages ──────────────────────▶ postprocess
//! (path/URL) (pdfium)  (base64)   (llm + json_extract, 4 calls)   (cleanup)
//! ```
//!
//! 1. [`input`]: canonicalise each user-supplied path or URL to a local PDF
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]: PNG-encode and base64-wrap each page for the request body
//! 4. [`stages`]: the analysis, extraction, validation and formatting chain
//! 5. [`llm`]: one stage call with retry/backoff and timeout; the only
//!    module with network I/O
//! 6. [`json_extract`]: recover JSON from fenced or chatty replies
//! 7. [`postprocess`]: strip Markdown markers from the formatted text

pub mod encode;
pub mod input;
pub mod json_extract;
pub mod llm;
pub mod postprocess;
pub mod render;
pub mod stages;
