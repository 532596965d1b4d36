//! Paragraph styles and table colours.
//!
//! All distances are in PDF points (1/72 in). [`mm`] converts the
//! millimetre values the layout is specified in.

/// Millimetres to points.
pub const fn mm(v: f32) -> f32 {
    v * 72.0 / 25.4
}

/// The three built-in Helvetica faces the renderer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFace {
    Regular,
    Bold,
    Oblique,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
    Justify,
}

/// An RGB colour with 0–1 channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    /// `0x1a237e` → `Rgb { r: 0.102, … }`.
    pub const fn hex(v: u32) -> Self {
        Self {
            r: ((v >> 16) & 0xff) as f32 / 255.0,
            g: ((v >> 8) & 0xff) as f32 / 255.0,
            b: (v & 0xff) as f32 / 255.0,
        }
    }
}

pub const BLACK: Rgb = Rgb::hex(0x000000);
pub const WHITE: Rgb = Rgb::hex(0xffffff);
pub const GREY: Rgb = Rgb::hex(0x808080);
pub const LIGHT_GREY: Rgb = Rgb::hex(0xd3d3d3);
pub const TABLE_HEADER_FILL: Rgb = Rgb::hex(0x1a237e);
pub const TABLE_TOTAL_FILL: Rgb = Rgb::hex(0xe3f2fd);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParagraphStyle {
    pub name: &'static str,
    pub font: FontFace,
    pub size: f32,
    pub leading: f32,
    pub align: Align,
    pub color: Rgb,
    pub space_before: f32,
    pub space_after: f32,
    pub left_indent: f32,
    pub right_indent: f32,
}

const BASE: ParagraphStyle = ParagraphStyle {
    name: "Normal",
    font: FontFace::Regular,
    size: 10.0,
    leading: 12.0,
    align: Align::Left,
    color: BLACK,
    space_before: 0.0,
    space_after: 0.0,
    left_indent: 0.0,
    right_indent: 0.0,
};

/// Body text; also used for the plain fallback document.
pub const NORMAL: ParagraphStyle = BASE;

pub const HEADER_TITLE: ParagraphStyle = ParagraphStyle {
    name: "HeaderTitle",
    font: FontFace::Bold,
    size: 16.0,
    leading: 18.0,
    align: Align::Center,
    color: Rgb::hex(0x1a237e),
    space_after: 6.0,
    ..BASE
};

pub const HEADER_SUBTITLE: ParagraphStyle = ParagraphStyle {
    name: "HeaderSubtitle",
    font: FontFace::Bold,
    size: 12.0,
    leading: 14.0,
    align: Align::Center,
    color: Rgb::hex(0x283593),
    space_after: 20.0,
    ..BASE
};

pub const COMPANY_INFO: ParagraphStyle = ParagraphStyle {
    name: "CompanyInfo",
    align: Align::Center,
    space_after: 15.0,
    ..BASE
};

pub const SECTION_MAIN: ParagraphStyle = ParagraphStyle {
    name: "SectionMain",
    font: FontFace::Bold,
    size: 12.0,
    leading: 14.0,
    color: Rgb::hex(0x0d47a1),
    space_before: 20.0,
    space_after: 10.0,
    ..BASE
};

pub const TABLE_HEADER: ParagraphStyle = ParagraphStyle {
    name: "TableHeader",
    font: FontFace::Bold,
    size: 9.0,
    leading: 10.0,
    color: WHITE,
    ..BASE
};

pub const TABLE_ITEM: ParagraphStyle = ParagraphStyle {
    name: "TableItem",
    size: 8.0,
    leading: 9.0,
    left_indent: mm(2.0),
    ..BASE
};

pub const TABLE_AMOUNT: ParagraphStyle = ParagraphStyle {
    name: "TableAmount",
    size: 8.0,
    leading: 9.0,
    align: Align::Right,
    ..BASE
};

/// Total rows keep the body size; only the face changes.
pub const TABLE_TOTAL: ParagraphStyle = ParagraphStyle {
    name: "TableTotal",
    font: FontFace::Bold,
    size: 8.0,
    leading: 9.0,
    align: Align::Right,
    ..BASE
};

pub const NOTE_SECTION: ParagraphStyle = ParagraphStyle {
    name: "NoteSection",
    font: FontFace::Bold,
    color: Rgb::hex(0x1565c0),
    space_before: 15.0,
    space_after: 8.0,
    ..BASE
};

pub const NOTE_TEXT: ParagraphStyle = ParagraphStyle {
    name: "NoteText",
    size: 8.0,
    leading: 10.0,
    align: Align::Justify,
    space_after: 4.0,
    left_indent: mm(5.0),
    right_indent: mm(5.0),
    ..BASE
};

pub const FOOTER: ParagraphStyle = ParagraphStyle {
    name: "Footer",
    font: FontFace::Oblique,
    size: 7.0,
    leading: 9.0,
    align: Align::Center,
    color: GREY,
    space_before: 20.0,
    ..BASE
};

// ── Table geometry ───────────────────────────────────────────────────────

/// Description and amount column widths.
pub const TABLE_COLUMNS: [f32; 2] = [mm(120.0), mm(40.0)];
pub const CELL_PAD_X: f32 = 3.0;
pub const CELL_PAD_Y: f32 = 2.0;
pub const GRID_WIDTH: f32 = 0.5;
/// Extra description indent per nesting level.
pub const INDENT_STEP: f32 = mm(3.0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colours() {
        let c = Rgb::hex(0x1a237e);
        assert!((c.r - 26.0 / 255.0).abs() < 1e-6);
        assert!((c.g - 35.0 / 255.0).abs() < 1e-6);
        assert!((c.b - 126.0 / 255.0).abs() < 1e-6);
        assert_eq!(WHITE, Rgb { r: 1.0, g: 1.0, b: 1.0 });
    }

    #[test]
    fn millimetres_to_points() {
        assert!((mm(25.4) - 72.0).abs() < 1e-4);
        assert!((TABLE_COLUMNS[0] + TABLE_COLUMNS[1] - mm(160.0)).abs() < 1e-3);
    }

    #[test]
    fn styles_inherit_base() {
        assert_eq!(COMPANY_INFO.font, FontFace::Regular);
        assert_eq!(COMPANY_INFO.size, 10.0);
        assert_eq!(NOTE_SECTION.leading, 12.0);
        assert_eq!(FOOTER.space_after, 0.0);
    }
}
