//! Line classification for the formatted balance-sheet text.
//!
//! The formatting stage returns plain text shaped like
//! [`crate::prompts::BALANCE_SHEET_TEMPLATE`]. Nothing in it is marked up,
//! so the renderer recognises structure by keyword and punctuation:
//!
//! | Rule            | Matches                                                   |
//! |-----------------|-----------------------------------------------------------|
//! | section marker  | `STATO PATRIMONIALE - ATTIVO` / `- PASSIVO`, `CONTO ECONOMICO`, `NOTA INTEGRATIVA` |
//! | financial line  | contains `€`, `)` or `-`                                  |
//! | amount split    | text before the first `€` / text up to the next `€`      |
//! | total           | starts with `TOTALE`, `DIFFERENZA`, `RISULTATO`, `UTILE (PERDITA)` |
//! | note heading    | short, capitalised, no `€` `:` `•`, not a `-` bullet      |

/// The part of the balance sheet a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Attivo,
    Passivo,
    ContoEconomico,
    Note,
}

impl Section {
    /// Heading printed above the section.
    pub fn title(self) -> &'static str {
        match self {
            Section::Attivo => "STATO PATRIMONIALE - ATTIVO",
            Section::Passivo => "STATO PATRIMONIALE - PASSIVO",
            Section::ContoEconomico => "CONTO ECONOMICO",
            Section::Note => "NOTA INTEGRATIVA",
        }
    }
}

/// A kept line and its nesting depth in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionLine {
    /// The trimmed line.
    pub text: String,
    /// Leading-space count divided by two.
    pub indent: usize,
}

/// Lines grouped by section, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub attivo: Vec<SectionLine>,
    pub passivo: Vec<SectionLine>,
    pub conto_economico: Vec<SectionLine>,
    pub note: Vec<SectionLine>,
}

impl Sections {
    pub fn get(&self, section: Section) -> &[SectionLine] {
        match section {
            Section::Attivo => &self.attivo,
            Section::Passivo => &self.passivo,
            Section::ContoEconomico => &self.conto_economico,
            Section::Note => &self.note,
        }
    }

    fn get_mut(&mut self, section: Section) -> &mut Vec<SectionLine> {
        match section {
            Section::Attivo => &mut self.attivo,
            Section::Passivo => &mut self.passivo,
            Section::ContoEconomico => &mut self.conto_economico,
            Section::Note => &mut self.note,
        }
    }
}

/// The section a marker line opens, if it is one.
///
/// Checked in order, so `CONTO ECONOMICO` inside a longer heading still wins
/// over `NOTA INTEGRATIVA`.
pub fn section_marker(line: &str) -> Option<Section> {
    let upper = line.to_uppercase();
    [
        Section::Attivo,
        Section::Passivo,
        Section::ContoEconomico,
        Section::Note,
    ]
    .into_iter()
    .find(|s| upper.contains(s.title()))
}

/// Split `text` into sections.
///
/// Blank lines, marker lines and anything before the first marker are
/// dropped. Financial sections keep only lines with `€`, `)` or `-`; the
/// notes keep every line.
pub fn split_sections(text: &str) -> Sections {
    let mut sections = Sections::default();
    let mut current: Option<Section> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(section) = section_marker(line) {
            current = Some(section);
            continue;
        }
        let Some(section) = current else { continue };

        let keep = section == Section::Note || is_financial_line(line);
        if keep {
            sections.get_mut(section).push(SectionLine {
                text: line.to_string(),
                indent: indent_level(raw),
            });
        }
    }

    sections
}

/// True for lines that may carry an amount or a schedule item label.
pub fn is_financial_line(line: &str) -> bool {
    line.contains('€') || line.contains(')') || line.contains('-')
}

/// Two leading spaces per level; a tab counts as one level.
pub fn indent_level(raw: &str) -> usize {
    let mut spaces = 0;
    for c in raw.chars() {
        match c {
            ' ' => spaces += 1,
            '\t' => spaces += 2,
            _ => break,
        }
    }
    spaces / 2
}

/// Description and amount of a table line.
///
/// `None` when the line has no `€`. The description loses its `*`
/// emphasis; the amount is the text after the first `€` up to any second
/// one, prefixed with `€ `.
pub fn split_amount(line: &str) -> Option<(String, String)> {
    let mut parts = line.split('€');
    let description = parts.next()?;
    let amount = parts.next()?;

    let description = description.trim().replace('*', "").trim().to_string();
    Some((description, format!("€ {}", amount.trim())))
}

/// Subtotal and result rows.
pub fn is_total_line(description: &str) -> bool {
    let upper = description.trim_start().to_uppercase();
    ["TOTALE", "DIFFERENZA", "RISULTATO", "UTILE (PERDITA)"]
        .iter()
        .any(|p| upper.starts_with(p))
}

// ── Header heuristics ────────────────────────────────────────────────────

const COMPANY_KEYWORDS: [&str; 6] = ["S.R.L.", "S.P.A.", "S.R.L", "S.P.A", "SRL", "SPA"];
const PERIOD_ENDS: [&str; 4] = ["31/12", "31/03", "30/06", "30/09"];

/// Up to two header lines naming the company.
///
/// Scans the first 10 lines. A line with a company-form keyword is taken
/// and ends the scan. Before that, any short line without `STATO`,
/// `ATTIVO` or `AL` is taken too.
pub fn company_info(text: &str) -> Vec<String> {
    let mut info = Vec::new();
    for line in text.split('\n').take(10) {
        let trimmed = line.trim();
        let upper = line.to_uppercase();
        if COMPANY_KEYWORDS.iter().any(|k| upper.contains(k)) {
            info.push(trimmed.to_string());
            break;
        }
        let excluded = ["STATO", "ATTIVO", "AL"].iter().any(|x| line.contains(x));
        if !trimmed.is_empty() && trimmed.chars().count() < 100 && !excluded {
            info.push(trimmed.to_string());
        }
    }
    info.truncate(2);
    info
}

/// The "... AL 31/12/2024" line among the first 15 lines.
pub fn date_line(text: &str) -> Option<String> {
    text.split('\n')
        .take(15)
        .find(|line| {
            line.to_uppercase().contains("AL") && PERIOD_ENDS.iter().any(|d| line.contains(d))
        })
        .map(|line| line.trim().to_string())
}

// ── Notes ────────────────────────────────────────────────────────────────

/// A note heading with the body lines worth printing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSubsection {
    pub heading: String,
    pub body: Vec<String>,
}

/// True for short capitalised lines that read like a note heading.
pub fn is_note_heading(line: &str) -> bool {
    let Some(first) = line.chars().next() else {
        return false;
    };
    line.chars().count() < 100
        && !line.starts_with('-')
        && !line.contains(['€', ':', '•'])
        && first.is_uppercase()
}

/// Group note lines under their headings.
///
/// A heading is printed only once it has gathered lines, so a heading
/// followed directly by another is dropped. Lines seen before the first
/// heading stay pending and end up under it. Body lines of 10 characters or
/// fewer are left out.
pub fn note_subsections(lines: &[SectionLine]) -> Vec<NoteSubsection> {
    let mut out = Vec::new();
    let mut heading: Option<&str> = None;
    let mut content: Vec<&str> = Vec::new();

    for line in lines {
        let text = line.text.trim();
        if text.is_empty() {
            continue;
        }
        if is_note_heading(text) {
            if let Some(h) = heading {
                if !content.is_empty() {
                    out.push(subsection(h, &content));
                    content.clear();
                }
            }
            heading = Some(text);
        } else {
            content.push(text);
        }
    }
    if let Some(h) = heading {
        if !content.is_empty() {
            out.push(subsection(h, &content));
        }
    }

    out
}

fn subsection(heading: &str, content: &[&str]) -> NoteSubsection {
    NoteSubsection {
        heading: heading.to_string(),
        body: content
            .iter()
            .filter(|l| l.chars().count() > 10)
            .map(|l| l.to_string())
            .collect(),
    }
}
