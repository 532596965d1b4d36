//! PDF layout for the formatted balance sheet.
//!
//! ## Data Flow
//!
//! ```text
//! text ──▶ classify ──▶ document::build_story ──▶ pdf::render_story ──▶ bytes
//!          (sections,    (Block list: paragraphs,   (printpdf, A4,
//!           amounts)      tables, page breaks)       Helvetica)
//! ```
//!
//! 1. [`classify`]: keyword and punctuation rules that find sections,
//!    amounts, totals and note headings in plain text
//! 2. [`document`]: assemble header, tables, notes and footer as [`Block`]s
//! 3. [`style`]: paragraph styles, colours and table geometry
//! 4. [`metrics`]: Helvetica widths for wrapping and alignment
//! 5. [`pdf`]: paginate the blocks and write the PDF

pub mod classify;
pub mod document;
pub mod metrics;
pub mod pdf;
pub mod style;

pub use document::{build_story, Block};

use crate::error::BilancioError;
use chrono::NaiveDate;
use tracing::warn;

/// Document title stored in the PDF metadata.
pub const PDF_TITLE: &str = "Bilancio d'esercizio";

/// Lay out `text` as a balance-sheet PDF.
///
/// If the structured layout fails the whole text is written as one plain
/// paragraph instead; only a failure of that too is returned.
pub fn create_pdf(text: &str, today: NaiveDate) -> Result<Vec<u8>, BilancioError> {
    let story = build_story(text, today);
    match pdf::render_story(&story, PDF_TITLE) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            warn!("Structured PDF layout failed, writing plain text: {}", e);
            pdf::render_story(&document::fallback_story(text), PDF_TITLE)
        }
    }
}
