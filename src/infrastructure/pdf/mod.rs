//! RTI report documents.
//!
//! `layout_report` turns markdown-ish report text into positioned items on
//! A4 pages (millimetres, origin top-left). `render_pdf` writes those pages
//! with lopdf using the standard Helvetica faces.

use crate::domain::error::{AppError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const BOTTOM_LIMIT_MM: f32 = 30.0;
const FIRST_PAGE_START_MM: f32 = 70.0;
const NEXT_PAGE_START_MM: f32 = 30.0;
const FOOTER_OFFSET_MM: f32 = 10.0;
const BULLET_INDENT_MM: f32 = 5.0;

const MM_TO_PT: f32 = 72.0 / 25.4;
/// Average Helvetica advance width as a fraction of the font size.
const AVG_CHAR_WIDTH_EM: f32 = 0.5;

pub const FOOTER_NOTE: &str = "Generated under RTI Act 2005";
const HEADER_LINES: [(&str, f32, f32); 3] = [
    ("GOVERNMENT OF KERALA", 16.0, 30.0),
    ("RIGHT TO INFORMATION ACT, 2005", 14.0, 40.0),
    ("INFORMATION DISCLOSURE REPORT", 14.0, 50.0),
];
const HEADER_RULE_MM: f32 = 55.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    Regular,
    Bold,
}

impl FontFace {
    fn resource_name(&self) -> &'static str {
        match self {
            FontFace::Regular => "F1",
            FontFace::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutItem {
    Text {
        x: f32,
        y: f32,
        size: f32,
        face: FontFace,
        text: String,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
        width: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub number: usize,
    pub items: Vec<LayoutItem>,
}

impl PageLayout {
    fn new(number: usize) -> Self {
        Self {
            number,
            items: Vec::new(),
        }
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            LayoutItem::Text { text, .. } => Some(text.as_str()),
            LayoutItem::Rule { .. } => None,
        })
    }
}

fn text_width_mm(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * AVG_CHAR_WIDTH_EM / MM_TO_PT
}

/// Greedy word wrap by estimated glyph width. Words longer than a line are split.
pub fn wrap_text(text: &str, size: f32, max_width_mm: f32) -> Vec<String> {
    let max_chars = ((max_width_mm * MM_TO_PT) / (size * AVG_CHAR_WIDTH_EM)).floor().max(1.0) as usize;
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

enum Block<'a> {
    Heading(&'a str),
    SubHeading(&'a str),
    BoldLine(String),
    Bullet(String),
    Separator,
    Paragraph(String),
    Blank,
}

fn classify(line: &str) -> Block<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Block::Blank
    } else if let Some(rest) = trimmed.strip_prefix("###") {
        Block::SubHeading(rest.trim())
    } else if let Some(rest) = trimmed.strip_prefix("##") {
        Block::Heading(rest.trim_start_matches('#').trim())
    } else if trimmed.chars().all(|c| c == '-') && trimmed.len() >= 3 {
        Block::Separator
    } else if trimmed.starts_with("**") && trimmed.ends_with("**") && trimmed.len() > 4 {
        Block::BoldLine(trimmed.replace("**", ""))
    } else if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        Block::Bullet(format!("\u{2022} {}", rest.replace("**", "").trim()))
    } else {
        Block::Paragraph(trimmed.replace("**", ""))
    }
}

struct Cursor {
    pages: Vec<PageLayout>,
    y: f32,
}

impl Cursor {
    fn page(&mut self) -> &mut PageLayout {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn ensure_room(&mut self) {
        if self.y > PAGE_HEIGHT_MM - BOTTOM_LIMIT_MM {
            let number = self.pages.len() + 1;
            self.pages.push(PageLayout::new(number));
            self.y = NEXT_PAGE_START_MM;
        }
    }

    fn text(&mut self, x: f32, size: f32, face: FontFace, text: String, advance: f32) {
        self.ensure_room();
        let y = self.y;
        self.page().items.push(LayoutItem::Text {
            x,
            y,
            size,
            face,
            text,
        });
        self.y += advance;
    }
}

/// Lay out report text on A4 pages, header on page one, footer on every page.
pub fn layout_report(report: &str) -> Vec<PageLayout> {
    let mut first = PageLayout::new(1);
    for (text, size, y) in HEADER_LINES {
        first.items.push(LayoutItem::Text {
            x: (PAGE_WIDTH_MM - text_width_mm(text, size)) / 2.0,
            y,
            size,
            face: FontFace::Bold,
            text: text.to_string(),
        });
    }
    first.items.push(LayoutItem::Rule {
        x1: MARGIN_MM,
        x2: PAGE_WIDTH_MM - MARGIN_MM,
        y: HEADER_RULE_MM,
        width: 0.5,
    });

    let mut cursor = Cursor {
        pages: vec![first],
        y: FIRST_PAGE_START_MM,
    };
    let max_width = PAGE_WIDTH_MM - MARGIN_MM * 2.0;

    for line in report.lines() {
        match classify(line) {
            Block::Heading(text) => {
                for part in wrap_text(text, 14.0, max_width) {
                    cursor.text(MARGIN_MM, 14.0, FontFace::Bold, part, 10.0);
                }
            }
            Block::SubHeading(text) => {
                for part in wrap_text(text, 12.0, max_width) {
                    cursor.text(MARGIN_MM, 12.0, FontFace::Bold, part, 8.0);
                }
            }
            Block::BoldLine(text) => {
                for part in wrap_text(&text, 10.0, max_width) {
                    cursor.text(MARGIN_MM, 10.0, FontFace::Bold, part, 6.0);
                }
            }
            Block::Bullet(text) => {
                for part in wrap_text(&text, 10.0, max_width - 2.0 * BULLET_INDENT_MM) {
                    cursor.text(MARGIN_MM + BULLET_INDENT_MM, 10.0, FontFace::Regular, part, 5.0);
                }
            }
            Block::Paragraph(text) => {
                for part in wrap_text(&text, 10.0, max_width) {
                    cursor.text(MARGIN_MM, 10.0, FontFace::Regular, part, 5.0);
                }
            }
            Block::Separator => {
                cursor.ensure_room();
                let y = cursor.y;
                cursor.page().items.push(LayoutItem::Rule {
                    x1: MARGIN_MM,
                    x2: PAGE_WIDTH_MM - MARGIN_MM,
                    y,
                    width: 0.3,
                });
                cursor.y += 8.0;
            }
            Block::Blank => cursor.y += 4.0,
        }
    }

    let mut pages = cursor.pages;
    let total = pages.len();
    for page in &mut pages {
        let label = format!("Page {} of {}", page.number, total);
        let footer_y = PAGE_HEIGHT_MM - FOOTER_OFFSET_MM;
        page.items.push(LayoutItem::Text {
            x: PAGE_WIDTH_MM - MARGIN_MM - text_width_mm(&label, 8.0),
            y: footer_y,
            size: 8.0,
            face: FontFace::Regular,
            text: label,
        });
        page.items.push(LayoutItem::Text {
            x: MARGIN_MM,
            y: footer_y,
            size: 8.0,
            face: FontFace::Regular,
            text: FOOTER_NOTE.to_string(),
        });
    }
    pages
}

/// Map text into WinAnsi bytes for the standard fonts.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2022}' => out.push(0x95),
            '\u{2013}' => out.push(0x96),
            '\u{2014}' => out.push(0x97),
            '\u{2018}' => out.push(0x91),
            '\u{2019}' => out.push(0x92),
            '\u{201C}' => out.push(0x93),
            '\u{201D}' => out.push(0x94),
            '\u{20B9}' => out.extend_from_slice(b"Rs."),
            c if (c as u32) < 0x100 => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

fn pt(mm: f32) -> Object {
    Object::Integer((mm * MM_TO_PT).round() as i64)
}

fn page_operations(page: &PageLayout) -> Vec<Operation> {
    let mut ops = Vec::new();
    for item in &page.items {
        match item {
            LayoutItem::Text {
                x,
                y,
                size,
                face,
                text,
            } => {
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new(
                    "Tf",
                    vec![face.resource_name().into(), Object::Integer(size.round() as i64)],
                ));
                ops.push(Operation::new("Td", vec![pt(*x), pt(PAGE_HEIGHT_MM - y)]));
                ops.push(Operation::new("Tj", vec![Object::string_literal(encode_win_ansi(text))]));
                ops.push(Operation::new("ET", vec![]));
            }
            LayoutItem::Rule { x1, x2, y, width } => {
                let width_pt = (width * MM_TO_PT).round().max(1.0) as i64;
                ops.push(Operation::new("w", vec![Object::Integer(width_pt)]));
                ops.push(Operation::new("m", vec![pt(*x1), pt(PAGE_HEIGHT_MM - y)]));
                ops.push(Operation::new("l", vec![pt(*x2), pt(PAGE_HEIGHT_MM - y)]));
                ops.push(Operation::new("S", vec![]));
            }
        }
    }
    ops
}

fn font(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(base.as_bytes().to_vec()),
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Render a report to PDF bytes.
pub fn render_pdf(report: &str) -> Result<Vec<u8>> {
    let layout = layout_report(report);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(font("Helvetica"));
    let bold_id = doc.add_object(font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.len());
    for page in &layout {
        let content = Content {
            operations: page_operations(page),
        };
        let encoded = content
            .encode()
            .map_err(|e| AppError::Internal(format!("Failed to encode page {}: {}", page.number, e)))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![pt(0.0), pt(0.0), pt(PAGE_WIDTH_MM), pt(PAGE_HEIGHT_MM)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| AppError::IoError(format!("Failed to write PDF: {}", e)))?;

    debug!(pages = page_count, bytes = bytes.len(), "Rendered report PDF");
    Ok(bytes)
}
