//! PDF报告渲染
//!
//! A4纵向版面，超出页面时自动换页。先排版得到每页的文本位置，再写入PDF。
//! 中文字形来自配置的TrueType字体。

use crate::content::ReportContent;
use pathodx_core::{PathoError, Result};
use printpdf::{IndirectFontRef, Mm, PdfDocument};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 20.0;
const MARGIN_RIGHT: f32 = 20.0;
const TOP: f32 = 277.0;
const BOTTOM: f32 = 20.0;
const PT_TO_MM: f32 = 0.3528;

const TITLE_SIZE: f32 = 18.0;
const META_SIZE: f32 = 9.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 11.0;
const SMALL_SIZE: f32 = 9.0;

fn pdf_error(e: impl std::fmt::Display) -> PathoError {
    PathoError::ReportGeneration(format!("PDF生成错误: {e}"))
}

/// 估算文本宽度(毫米): 全角字符约等于字号, 半角约为一半
fn text_width(text: &str, size: f32) -> f32 {
    text.chars()
        .map(|c| if c.is_ascii() { size * 0.5 } else { size })
        .sum::<f32>()
        * PT_TO_MM
}

/// 按可用宽度折行
fn wrap_text(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        let mut width = 0.0;
        for c in paragraph.chars() {
            let w = text_width(c.encode_utf8(&mut [0; 4]), size);
            if width + w > max_width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                width = 0.0;
            }
            current.push(c);
            width += w;
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// 页面上的一行文本, 坐标单位为毫米, 原点在左下角
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlacedText {
    pub text: String,
    pub size: f32,
    pub x: f32,
    pub y: f32,
}

struct Layout {
    pages: Vec<Vec<PlacedText>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: TOP,
        }
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < BOTTOM {
            self.pages.push(Vec::new());
            self.y = TOP;
        }
    }

    fn line_height(size: f32) -> f32 {
        size * PT_TO_MM * 1.6
    }

    fn text_at(&mut self, text: &str, size: f32, x: f32) {
        let height = Self::line_height(size);
        self.ensure_space(height);
        let y = self.y;
        if let Some(page) = self.pages.last_mut() {
            page.push(PlacedText {
                text: text.to_string(),
                size,
                x,
                y,
            });
        }
        self.y -= height;
    }

    fn paragraph(&mut self, text: &str, size: f32, indent: f32) {
        let max_width = PAGE_WIDTH - MARGIN_LEFT - MARGIN_RIGHT - indent;
        for line in wrap_text(text, size, max_width) {
            self.text_at(&line, size, MARGIN_LEFT + indent);
        }
    }

    fn centered(&mut self, text: &str, size: f32) {
        let x = ((PAGE_WIDTH - text_width(text, size)) / 2.0).max(MARGIN_LEFT);
        self.text_at(text, size, x);
    }

    fn right_aligned(&mut self, text: &str, size: f32) {
        let x = (PAGE_WIDTH - MARGIN_RIGHT - text_width(text, size)).max(MARGIN_LEFT);
        self.text_at(text, size, x);
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }
}

/// 排版报告内容, 返回每页的文本行
pub(crate) fn layout_pages(content: &ReportContent) -> Vec<Vec<PlacedText>> {
    let mut layout = Layout::new();

    layout.centered(&content.title, TITLE_SIZE);
    layout.gap(2.0);
    for line in content.metadata() {
        layout.right_aligned(&line, META_SIZE);
    }
    layout.gap(4.0);

    for section in content.sections() {
        layout.gap(2.0);
        layout.text_at(&section.heading, HEADING_SIZE, MARGIN_LEFT);
        for line in &section.lines {
            layout.paragraph(line, BODY_SIZE, 5.0);
        }
    }

    layout.gap(6.0);
    layout.text_at("免责声明", HEADING_SIZE, MARGIN_LEFT);
    layout.paragraph(&content.disclaimer, SMALL_SIZE, 0.0);

    layout.gap(8.0);
    layout.centered(&content.footer, SMALL_SIZE);

    layout.pages
}

fn load_font(doc: &printpdf::PdfDocumentReference, font_path: &Path) -> Result<IndirectFontRef> {
    let file = File::open(font_path).map_err(|e| {
        PathoError::ReportGeneration(format!("无法打开字体文件 {}: {}", font_path.display(), e))
    })?;
    doc.add_external_font(file).map_err(pdf_error)
}

/// 使用指定字体渲染PDF报告, 返回文件字节
pub fn render_pdf(content: &ReportContent, font_path: &Path) -> Result<Vec<u8>> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(&content.title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = load_font(&doc, font_path)?;

    for (index, lines) in layout_pages(content).into_iter().enumerate() {
        let (page, layer) = if index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Layer {}", index + 1))
        };
        let layer = doc.get_page(page).get_layer(layer);
        for line in lines {
            layer.use_text(line.text, line.size, Mm(line.x), Mm(line.y), &font);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(pdf_error)?;
    buf.into_inner().map_err(pdf_error)
}
