//! Paginate a block list onto A4 pages with printpdf.
//!
//! A cursor moves down from the top margin; anything that does not fit
//! below it starts a new page. Coordinates are kept in points from the
//! bottom-left corner and converted to millimetres at the printpdf call.

use super::document::{Block, Table, TableRow};
use super::metrics::{text_width, winansi_safe, wrap};
use super::style::{
    self, Align, FontFace, ParagraphStyle, Rgb, CELL_PAD_X, CELL_PAD_Y, GREY, GRID_WIDTH,
    INDENT_STEP, LIGHT_GREY, TABLE_AMOUNT, TABLE_COLUMNS, TABLE_HEADER, TABLE_HEADER_FILL,
    TABLE_ITEM, TABLE_TOTAL, TABLE_TOTAL_FILL,
};
use crate::error::BilancioError;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Rect,
};
use std::io::BufWriter;
use tracing::debug;

const PAGE_WIDTH: f32 = style::mm(210.0);
const PAGE_HEIGHT: f32 = style::mm(297.0);
const MARGIN: f32 = style::mm(15.0);
const FRAME_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
/// Line height as a multiple of the font size inside table cells.
const CELL_LINE_FACTOR: f32 = 1.2;

/// Render `story` to PDF bytes.
pub fn render_story(story: &[Block], title: &str) -> Result<Vec<u8>, BilancioError> {
    let mut canvas = Canvas::new(title)?;

    for block in story {
        match block {
            Block::Paragraph { text, style } => canvas.paragraph(text, style),
            Block::Spacer(height) => canvas.spacer(*height),
            Block::Table(table) => canvas.table(table),
            Block::PageBreak => canvas.page_break(),
        }
    }

    debug!("Laid out {} blocks on {} page(s)", story.len(), canvas.pages);
    canvas.finish()
}

fn to_mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

fn pdf_color(c: Rgb) -> Color {
    Color::Rgb(printpdf::Rgb::new(c.r, c.g, c.b, None))
}

fn layout_err(what: &str, e: impl std::fmt::Display) -> BilancioError {
    BilancioError::PdfLayout(format!("{what}: {e}"))
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    oblique: IndirectFontRef,
}

impl Fonts {
    fn get(&self, face: FontFace) -> &IndirectFontRef {
        match face {
            FontFace::Regular => &self.regular,
            FontFace::Bold => &self.bold,
            FontFace::Oblique => &self.oblique,
        }
    }
}

struct Canvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    fonts: Fonts,
    /// Top of the free area, in points from the page bottom.
    y: f32,
    /// Whether anything has been drawn on the current page.
    dirty: bool,
    pages: usize,
}

impl Canvas {
    fn new(title: &str) -> Result<Self, BilancioError> {
        let (doc, page, layer) =
            PdfDocument::new(title, to_mm(PAGE_WIDTH), to_mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let fonts = Fonts {
            regular: doc
                .add_builtin_font(BuiltinFont::Helvetica)
                .map_err(|e| layout_err("font", e))?,
            bold: doc
                .add_builtin_font(BuiltinFont::HelveticaBold)
                .map_err(|e| layout_err("font", e))?,
            oblique: doc
                .add_builtin_font(BuiltinFont::HelveticaOblique)
                .map_err(|e| layout_err("font", e))?,
        };
        Ok(Self {
            doc,
            layer,
            fonts,
            y: PAGE_HEIGHT - MARGIN,
            dirty: false,
            pages: 1,
        })
    }

    fn finish(self) -> Result<Vec<u8>, BilancioError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc.save(&mut buf).map_err(|e| layout_err("save", e))?;
        buf.into_inner().map_err(|e| layout_err("buffer", e))
    }

    // ── Pagination ───────────────────────────────────────────────────────

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(to_mm(PAGE_WIDTH), to_mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
        self.dirty = false;
        self.pages += 1;
    }

    /// Start a new page unless `height` fits or the page is still empty.
    fn reserve(&mut self, height: f32) {
        if self.y - height < MARGIN && self.dirty {
            self.new_page();
        }
    }

    fn page_break(&mut self) {
        if self.dirty {
            self.new_page();
        }
    }

    fn spacer(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.page_break();
        } else {
            self.y -= height;
        }
    }

    // ── Drawing primitives ───────────────────────────────────────────────

    fn text(&mut self, s: &str, face: FontFace, size: f32, x: f32, baseline: f32, color: Rgb) {
        self.layer.set_fill_color(pdf_color(color));
        self.layer.use_text(
            winansi_safe(s),
            size,
            to_mm(x),
            to_mm(baseline),
            self.fonts.get(face),
        );
        self.dirty = true;
    }

    fn rect(&mut self, x: f32, top: f32, w: f32, h: f32, mode: PaintMode) {
        let rect = Rect::new(to_mm(x), to_mm(top - h), to_mm(x + w), to_mm(top)).with_mode(mode);
        self.layer.add_rect(rect);
        self.dirty = true;
    }

    fn fill_rect(&mut self, x: f32, top: f32, w: f32, h: f32, color: Rgb) {
        self.layer.set_fill_color(pdf_color(color));
        self.rect(x, top, w, h, PaintMode::Fill);
    }

    fn stroke_rect(&mut self, x: f32, top: f32, w: f32, h: f32, color: Rgb) {
        self.layer.set_outline_color(pdf_color(color));
        self.layer.set_outline_thickness(GRID_WIDTH);
        self.rect(x, top, w, h, PaintMode::Stroke);
    }

    // ── Paragraphs ───────────────────────────────────────────────────────

    fn paragraph(&mut self, text: &str, style: &ParagraphStyle) {
        if self.dirty {
            self.spacer(style.space_before);
        }

        let left = MARGIN + style.left_indent;
        let avail = FRAME_WIDTH - style.left_indent - style.right_indent;

        for hard_line in text.split('\n') {
            let lines = wrap(hard_line, style.font, style.size, avail);
            let last = lines.len().saturating_sub(1);
            for (i, line) in lines.iter().enumerate() {
                self.reserve(style.leading);
                let baseline = self.y - style.size;
                let justify = style.align == Align::Justify && i < last;
                self.draw_line(line, style, left, avail, baseline, justify);
                self.y -= style.leading;
            }
        }

        self.y -= style.space_after;
    }

    fn draw_line(
        &mut self,
        line: &str,
        style: &ParagraphStyle,
        left: f32,
        avail: f32,
        baseline: f32,
        justify: bool,
    ) {
        let width = text_width(line, style.font, style.size);
        let words: Vec<&str> = line.split(' ').filter(|w| !w.is_empty()).collect();

        if justify && words.len() > 1 {
            let words_width: f32 = words
                .iter()
                .map(|w| text_width(w, style.font, style.size))
                .sum();
            let gap = (avail - words_width) / (words.len() - 1) as f32;
            let mut x = left;
            for word in words {
                self.text(word, style.font, style.size, x, baseline, style.color);
                x += text_width(word, style.font, style.size) + gap;
            }
            return;
        }

        let x = match style.align {
            Align::Left | Align::Justify => left,
            Align::Center => left + (avail - width) / 2.0,
            Align::Right => left + avail - width,
        };
        self.text(line, style.font, style.size, x, baseline, style.color);
    }

    // ── Tables ───────────────────────────────────────────────────────────

    fn table(&mut self, table: &Table) {
        let table_width: f32 = TABLE_COLUMNS.iter().sum();
        let x0 = MARGIN + (FRAME_WIDTH - table_width) / 2.0;

        let header = TableRow {
            description: table.header[0].clone(),
            amount: table.header[1].clone(),
            indent: 0,
            is_total: false,
        };
        let last = table.rows.len();

        // Top edge of the part of the table on the current page.
        let mut segment_top = self.y;

        for (i, row) in std::iter::once(&header).chain(table.rows.iter()).enumerate() {
            let cell = RowLayout::new(row, i == 0);
            if self.y - cell.height < MARGIN && self.dirty {
                self.stroke_rect(x0, segment_top, table_width, segment_top - self.y, GREY);
                self.new_page();
                segment_top = self.y;
            }

            let top = self.y;
            let fill = match i {
                0 => Some(TABLE_HEADER_FILL),
                n if n == last => Some(TABLE_TOTAL_FILL),
                _ => None,
            };
            if let Some(color) = fill {
                self.fill_rect(x0, top, table_width, cell.height, color);
            }
            self.stroke_rect(x0, top, TABLE_COLUMNS[0], cell.height, LIGHT_GREY);
            let amount_x = x0 + TABLE_COLUMNS[0];
            self.stroke_rect(amount_x, top, TABLE_COLUMNS[1], cell.height, LIGHT_GREY);

            let line_height = cell.style.size * CELL_LINE_FACTOR;
            let mut baseline = top - CELL_PAD_Y - cell.style.size;
            for line in &cell.description {
                self.text(
                    line,
                    cell.desc_style.font,
                    cell.style.size,
                    x0 + cell.desc_x,
                    baseline,
                    cell.style.color,
                );
                baseline -= line_height;
            }

            let mut baseline = top - CELL_PAD_Y - cell.style.size;
            let right = x0 + table_width - CELL_PAD_X;
            for line in &cell.amount {
                let w = text_width(line, cell.style.font, cell.style.size);
                self.text(
                    line,
                    cell.style.font,
                    cell.style.size,
                    right - w,
                    baseline,
                    cell.style.color,
                );
                baseline -= line_height;
            }

            self.y -= cell.height;
        }

        self.stroke_rect(x0, segment_top, table_width, segment_top - self.y, GREY);
    }
}

/// Wrapped cell contents and height of one table row.
struct RowLayout {
    /// Style for the amount column, and the colour and size of the row.
    style: &'static ParagraphStyle,
    desc_style: &'static ParagraphStyle,
    desc_x: f32,
    description: Vec<String>,
    amount: Vec<String>,
    height: f32,
}

impl RowLayout {
    fn new(row: &TableRow, is_header: bool) -> Self {
        let (style, desc_style): (&'static ParagraphStyle, &'static ParagraphStyle) = if is_header {
            (&TABLE_HEADER, &TABLE_HEADER)
        } else if row.is_total {
            (&TABLE_TOTAL, &TABLE_TOTAL)
        } else {
            (&TABLE_AMOUNT, &TABLE_ITEM)
        };

        let desc_x = if is_header {
            CELL_PAD_X
        } else {
            CELL_PAD_X + row.indent as f32 * INDENT_STEP
        };
        let desc_avail = (TABLE_COLUMNS[0] - desc_x - CELL_PAD_X).max(style.size);
        let amount_avail = TABLE_COLUMNS[1] - 2.0 * CELL_PAD_X;

        let description = wrap(&row.description, desc_style.font, style.size, desc_avail);
        let amount = wrap(&row.amount, style.font, style.size, amount_avail);
        let lines = description.len().max(amount.len()) as f32;
        let height = 2.0 * CELL_PAD_Y + lines * style.size * CELL_LINE_FACTOR;

        Self {
            style,
            desc_style,
            desc_x,
            description,
            amount,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::document::build_story;
    use crate::layout::style::NORMAL;
    use chrono::NaiveDate;

    fn row(description: &str, amount: &str) -> TableRow {
        TableRow {
            description: description.into(),
            amount: amount.into(),
            indent: 0,
            is_total: false,
        }
    }

    #[test]
    fn single_line_row_height() {
        let layout = RowLayout::new(&row("Cassa", "€ 100"), false);
        assert_eq!(layout.description.len(), 1);
        assert!((layout.height - (4.0 + 8.0 * 1.2)).abs() < 1e-4);
    }

    #[test]
    fn long_description_wraps() {
        let long = "Crediti verso imprese controllate esigibili entro l'esercizio successivo ".repeat(4);
        let layout = RowLayout::new(&row(&long, "€ 1.000"), false);
        assert!(layout.description.len() > 1);
        assert!(layout.height > 4.0 + 8.0 * 1.2);
    }

    #[test]
    fn total_rows_are_bold() {
        let mut r = row("TOTALE ATTIVO", "€ 1");
        r.is_total = true;
        assert_eq!(RowLayout::new(&r, false).desc_style.font, FontFace::Bold);
        assert_eq!(RowLayout::new(&r, true).style.name, "TableHeader");
    }

    #[test]
    fn renders_pdf_bytes() {
        let story = vec![Block::Paragraph {
            text: "Attività € 1.000".into(),
            style: &NORMAL,
        }];
        let bytes = render_story(&story, "test").unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_tables_paginate() {
        let rows: Vec<TableRow> = (0..200).map(|i| row(&format!("Voce {i}"), "€ 1")).collect();
        let story = vec![Block::Table(Table {
            header: ["Voce".into(), "Importo (€)".into()],
            rows,
        })];
        let mut canvas = Canvas::new("t").unwrap();
        for block in &story {
            if let Block::Table(t) = block {
                canvas.table(t);
            }
        }
        assert!(canvas.pages > 1);
        assert!(canvas.y >= MARGIN);
    }

    #[test]
    fn full_story_renders() {
        let text = "ALFA S.R.L.\nSTATO PATRIMONIALE - ATTIVO\nCassa € 10\nNOTA INTEGRATIVA\nPremessa\nil bilancio è redatto secondo OIC";
        let story = build_story(text, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        let bytes = render_story(&story, "Bilancio").unwrap();
        assert!(bytes.len() > 500);
    }
}
