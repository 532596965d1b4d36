//! Post-processing: deterministic cleanup of the formatted balance sheet.
//!
//! The formatting prompt asks for plain text, but models still emit
//! Markdown emphasis, table pipes and heading hashes. The PDF renderer
//! classifies lines by their leading characters, so every stray marker would
//! end up printed. This module strips them with cheap regex/string rules.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the fence rule sees `\n`. Markers
//! are removed before blank lines are collapsed, because removing a line of
//! `###` leaves an empty line behind.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw formatting-stage reply.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Remove code-fence openers and closers (` ``` `, ` ```text `, …)
/// 3. Delete Markdown markers: `**`, `*`, `|`, `###`, `##`, `#`
/// 4. Collapse 3+ consecutive newlines down to 2
/// 5. Trim the whole text
///
/// Everything else, including whitespace inside lines, is left as the
/// model wrote it.
pub fn cleanup_formatting(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_code_fences(&s);
    let s = strip_markdown_markers(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove code fences ───────────────────────────────────────────────

static RE_CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```[a-z]*\n?").unwrap());

fn strip_code_fences(input: &str) -> String {
    RE_CODE_FENCE.replace_all(input, "").into_owned()
}

// ── Rule 3: Delete Markdown markers ──────────────────────────────────────────

const MARKDOWN_MARKERS: [&str; 6] = ["**", "*", "|", "###", "##", "#"];

fn strip_markdown_markers(input: &str) -> String {
    MARKDOWN_MARKERS
        .iter()
        .fold(input.to_string(), |acc, marker| acc.replace(marker, ""))
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}
