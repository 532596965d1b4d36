//! Helvetica advance widths and line breaking.
//!
//! The built-in PDF fonts carry no metrics in the file, so line breaking
//! needs the Adobe AFM widths. Widths are in 1/1000 em. Oblique shares the
//! regular widths. Accented letters take the width of their base letter.

use super::style::FontFace;

/// Advance width of `c` in 1/1000 em.
pub fn char_width(c: char, face: FontFace) -> u16 {
    let c = base_letter(c);
    match face {
        FontFace::Bold => bold_width(c),
        FontFace::Regular | FontFace::Oblique => regular_width(c),
    }
}

/// Width of `text` in points at `size`.
pub fn text_width(text: &str, face: FontFace, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| char_width(c, face) as u32).sum();
    units as f32 * size / 1000.0
}

/// Greedy word wrap to `max_width` points.
///
/// `\n` forces a break. A single word wider than the line is split between
/// characters. Always returns at least one line.
pub fn wrap(text: &str, face: FontFace, size: f32, max_width: f32) -> Vec<String> {
    let space = text_width(" ", face, size);
    let mut lines = Vec::new();

    for hard_line in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0.0;

        for word in hard_line.split_whitespace() {
            let word_width = text_width(word, face, size);

            if current.is_empty() {
                if word_width <= max_width {
                    current.push_str(word);
                    current_width = word_width;
                } else {
                    let mut pieces = split_long_word(word, face, size, max_width);
                    let last = pieces.pop().unwrap_or_default();
                    lines.extend(pieces);
                    current_width = text_width(&last, face, size);
                    current = last;
                }
                continue;
            }

            if current_width + space + word_width <= max_width {
                current.push(' ');
                current.push_str(word);
                current_width += space + word_width;
            } else {
                lines.push(std::mem::take(&mut current));
                if word_width <= max_width {
                    current.push_str(word);
                    current_width = word_width;
                } else {
                    let mut pieces = split_long_word(word, face, size, max_width);
                    let last = pieces.pop().unwrap_or_default();
                    lines.extend(pieces);
                    current_width = text_width(&last, face, size);
                    current = last;
                }
            }
        }
        lines.push(current);
    }

    lines
}

fn split_long_word(word: &str, face: FontFace, size: f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut width = 0.0;
    for c in word.chars() {
        let w = char_width(c, face) as f32 * size / 1000.0;
        if !current.is_empty() && width + w > max_width {
            pieces.push(std::mem::take(&mut current));
            width = 0.0;
        }
        current.push(c);
        width += w;
    }
    pieces.push(current);
    pieces
}

/// Replace characters the WinAnsi encoding cannot carry with `?`.
pub fn winansi_safe(text: &str) -> String {
    text.chars()
        .map(|c| {
            let code = c as u32;
            let in_latin1 = (0x20..0x7f).contains(&code) || (0xa0..=0xff).contains(&code);
            let in_extras = matches!(
                c,
                '€' | '‚' | 'ƒ' | '„' | '…' | '†' | '‡' | 'ˆ' | '‰' | 'Š' | '‹' | 'Œ' | 'Ž'
                    | '‘' | '’' | '“' | '”' | '•' | '–' | '—' | '˜' | '™' | 'š' | '›' | 'œ'
                    | 'ž' | 'Ÿ'
            );
            if in_latin1 || in_extras {
                c
            } else if c == '\t' {
                ' '
            } else {
                '?'
            }
        })
        .collect()
}

fn base_letter(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'È' | 'É' | 'Ê' | 'Ë' => 'E',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

fn regular_width(c: char) -> u16 {
    match c {
        ' ' | '!' | ',' | '.' | '/' | ':' | ';' | 'I' | '[' | '\\' | ']' | 'f' | 't' => 278,
        '"' => 355,
        '#' | '$' => 556,
        '%' => 889,
        '&' => 667,
        '\'' => 191,
        '(' | ')' | '-' | 'r' | '`' => 333,
        '*' => 389,
        '+' | '<' | '=' | '>' | '~' => 584,
        '0'..='9' | '?' | '_' | 'L' | 'a' | 'b' | 'd' | 'e' | 'g' | 'h' | 'n' | 'o' | 'p'
        | 'q' | 'u' => 556,
        '@' => 1015,
        'A' | 'B' | 'E' | 'K' | 'P' | 'S' | 'V' | 'X' | 'Y' => 667,
        'C' | 'D' | 'H' | 'N' | 'R' | 'U' | 'w' => 722,
        'F' | 'T' | 'Z' => 611,
        'G' | 'O' | 'Q' => 778,
        'J' | 'c' | 'k' | 's' | 'v' | 'x' | 'y' | 'z' => 500,
        'M' | 'm' => 833,
        'W' => 944,
        '^' => 469,
        'i' | 'j' | 'l' => 222,
        '{' | '}' => 334,
        '|' => 260,
        '·' => 278,
        '€' => 556,
        '—' => 1000,
        _ => 556,
    }
}

fn bold_width(c: char) -> u16 {
    match c {
        ' ' | ',' | '.' | '/' | 'I' | '\\' | 'i' | 'j' | 'l' => 278,
        '!' | ':' | ';' | '(' | ')' | '-' | '`' | 'f' | 't' | '[' | ']' => 333,
        '"' => 474,
        '#' | '$' | '0'..='9' | '_' | 'a' | 'c' | 'e' | 'k' | 's' | 'v' | 'x' | 'y' | 'J' => 556,
        '%' => 889,
        '&' => 722,
        '\'' => 238,
        '*' | 'r' | '{' | '}' => 389,
        '+' | '<' | '=' | '>' | '^' | '~' => 584,
        '?' | 'F' | 'L' | 'T' | 'Z' | 'b' | 'd' | 'g' | 'h' | 'n' | 'o' | 'p' | 'q' | 'u' => 611,
        '@' => 975,
        'A' | 'B' | 'C' | 'D' | 'H' | 'K' | 'N' | 'R' | 'U' => 722,
        'E' | 'P' | 'S' | 'V' | 'X' | 'Y' => 667,
        'G' | 'O' | 'Q' => 778,
        'M' => 833,
        'W' => 944,
        'm' => 889,
        'w' => 778,
        'z' => 500,
        '|' => 280,
        '·' => 278,
        '€' => 556,
        '—' => 1000,
        _ => 556,
    }
}
