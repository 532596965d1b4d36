//! Turn balance-sheet text into a list of layout blocks.
//!
//! The block list is what [`super::pdf::render_story`] paginates. Building it
//! is pure string work, so every structural rule can be tested without
//! producing a PDF.

use super::classify::{
    company_info, date_line, is_total_line, note_subsections, split_amount, split_sections,
    Section, SectionLine,
};
use super::style::{
    self, ParagraphStyle, COMPANY_INFO, FOOTER, HEADER_SUBTITLE, HEADER_TITLE, NORMAL,
    NOTE_SECTION, NOTE_TEXT, SECTION_MAIN,
};
use chrono::NaiveDate;

/// Maximum body rows per table.
pub const MAX_TABLE_ROWS: usize = 30;

pub const TITLE: &str = "BILANCIO D'ESERCIZIO";
pub const SUBTITLE: &str = "STATO PATRIMONIALE E CONTO ECONOMICO";
pub const FOOTER_OIC: &str =
    "Il presente bilancio è stato redatto in conformità con i principi contabili nazionali (OIC).";

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Text in a paragraph style. `\n` is a forced line break.
    Paragraph {
        text: String,
        style: &'static ParagraphStyle,
    },
    /// Vertical gap in points.
    Spacer(f32),
    Table(Table),
    PageBreak,
}

impl Block {
    fn para(text: impl Into<String>, style: &'static ParagraphStyle) -> Self {
        Block::Paragraph {
            text: text.into(),
            style,
        }
    }
}

/// A two-column `Voce | Importo (€)` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: [String; 2],
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub description: String,
    pub amount: String,
    pub indent: usize,
    /// Printed bold.
    pub is_total: bool,
}

/// Lay out `text` as a balance sheet dated `today`.
pub fn build_story(text: &str, today: NaiveDate) -> Vec<Block> {
    let mut story = Vec::new();
    push_header(&mut story, text);

    let sections = split_sections(text);
    for section in [Section::Attivo, Section::Passivo] {
        push_table(&mut story, section, sections.get(section));
    }
    story.push(Block::PageBreak);
    push_table(
        &mut story,
        Section::ContoEconomico,
        sections.get(Section::ContoEconomico),
    );
    push_notes(&mut story, sections.get(Section::Note));
    push_footer(&mut story, today);

    story
}

/// The whole text as one plain paragraph.
pub fn fallback_story(text: &str) -> Vec<Block> {
    vec![Block::para(text, &NORMAL)]
}

fn push_header(story: &mut Vec<Block>, text: &str) {
    story.push(Block::para(TITLE, &HEADER_TITLE));
    story.push(Block::para(SUBTITLE, &HEADER_SUBTITLE));

    let info = company_info(text);
    if !info.is_empty() {
        story.push(Block::para(info.join("\n"), &COMPANY_INFO));
    }
    if let Some(date) = date_line(text) {
        story.push(Block::para(date, &COMPANY_INFO));
    }
    story.push(Block::Spacer(style::mm(15.0)));
}

/// Rows for a section: the first 30 lines, of which only those with `€`.
pub fn table_rows(lines: &[SectionLine]) -> Vec<TableRow> {
    lines
        .iter()
        .take(MAX_TABLE_ROWS)
        .filter_map(|line| {
            let (description, amount) = split_amount(&line.text)?;
            Some(TableRow {
                is_total: is_total_line(&description),
                description,
                amount,
                indent: line.indent,
            })
        })
        .collect()
}

fn push_table(story: &mut Vec<Block>, section: Section, lines: &[SectionLine]) {
    if lines.is_empty() {
        return;
    }
    story.push(Block::para(section.title(), &SECTION_MAIN));

    let rows = table_rows(lines);
    if rows.is_empty() {
        return;
    }
    story.push(Block::Table(Table {
        header: ["Voce".to_string(), "Importo (€)".to_string()],
        rows,
    }));
    story.push(Block::Spacer(style::mm(10.0)));
}

fn push_notes(story: &mut Vec<Block>, lines: &[SectionLine]) {
    if lines.is_empty() {
        return;
    }
    story.push(Block::PageBreak);
    story.push(Block::para(Section::Note.title(), &SECTION_MAIN));

    let subsections = note_subsections(lines);
    let last = subsections.len().saturating_sub(1);
    for (i, sub) in subsections.into_iter().enumerate() {
        story.push(Block::para(sub.heading, &NOTE_SECTION));
        for line in sub.body {
            story.push(Block::para(line, &NOTE_TEXT));
        }
        if i < last {
            story.push(Block::Spacer(style::mm(5.0)));
        }
    }
}

fn push_footer(story: &mut Vec<Block>, today: NaiveDate) {
    story.push(Block::Spacer(style::mm(15.0)));
    story.push(Block::para(FOOTER_OIC, &FOOTER));
    story.push(Block::para(
        format!(
            "Documento generato automaticamente il {} - Per approvazione.",
            today.format("%d/%m/%Y")
        ),
        &FOOTER,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
    }

    fn paragraphs(story: &[Block]) -> Vec<(&str, &'static str)> {
        story
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph { text, style } => Some((text.as_str(), style.name)),
                _ => None,
            })
            .collect()
    }

    const TEXT: &str = "\
ALFA S.P.A.
BILANCIO D'ESERCIZIO AL 31/12/2024
STATO PATRIMONIALE - ATTIVO
  Crediti verso clienti € 10.000
TOTALE ATTIVO € 10.000
STATO PATRIMONIALE - PASSIVO
Capitale sociale € 10.000
CONTO ECONOMICO
Ricavi € 5.000
NOTA INTEGRATIVA
Criteri di valutazione
costo storico, ammortamento a quote costanti
";

    #[test]
    fn story_order() {
        let story = build_story(TEXT, today());
        let paras = paragraphs(&story);
        assert_eq!(
            paras,
            [
                (TITLE, "HeaderTitle"),
                (SUBTITLE, "HeaderSubtitle"),
                ("ALFA S.P.A.", "CompanyInfo"),
                ("BILANCIO D'ESERCIZIO AL 31/12/2024", "CompanyInfo"),
                ("STATO PATRIMONIALE - ATTIVO", "SectionMain"),
                ("STATO PATRIMONIALE - PASSIVO", "SectionMain"),
                ("CONTO ECONOMICO", "SectionMain"),
                ("NOTA INTEGRATIVA", "SectionMain"),
                ("Criteri di valutazione", "NoteSection"),
                ("costo storico, ammortamento a quote costanti", "NoteText"),
                (FOOTER_OIC, "Footer"),
                (
                    "Documento generato automaticamente il 31/01/2025 - Per approvazione.",
                    "Footer"
                ),
            ]
        );

        let breaks = story.iter().filter(|b| matches!(b, Block::PageBreak)).count();
        assert_eq!(breaks, 2);
        let tables: Vec<&Table> = story
            .iter()
            .filter_map(|b| match b {
                Block::Table(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(tables.len(), 3);
        assert_eq!(tables[0].rows[0].indent, 1);
        assert!(tables[0].rows[1].is_total);
        assert_eq!(tables[0].header[1], "Importo (€)");
    }

    #[test]
    fn page_break_is_unconditional() {
        let story = build_story("testo libero senza sezioni", today());
        assert!(story.contains(&Block::PageBreak));
        assert!(!story.iter().any(|b| matches!(b, Block::Table(_))));
    }

    #[test]
    fn section_without_amounts_gets_title_only() {
        let text = "STATO PATRIMONIALE - ATTIVO\nB) IMMOBILIZZAZIONI\n";
        let story = build_story(text, today());
        assert!(paragraphs(&story).contains(&("STATO PATRIMONIALE - ATTIVO", "SectionMain")));
        assert!(!story.iter().any(|b| matches!(b, Block::Table(_))));
    }

    #[test]
    fn tables_capped_at_thirty_lines() {
        let lines: Vec<SectionLine> = (0..40)
            .map(|i| SectionLine {
                text: format!("Voce {i} € {i}"),
                indent: 0,
            })
            .collect();
        assert_eq!(table_rows(&lines).len(), MAX_TABLE_ROWS);
    }

    #[test]
    fn fallback_is_single_paragraph() {
        assert_eq!(fallback_story("a\nb"), [Block::para("a\nb", &NORMAL)]);
    }
}
