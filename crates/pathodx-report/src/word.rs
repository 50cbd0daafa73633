//! Word报告渲染
//!
//! 直接生成 WordprocessingML (`.docx`) 压缩包，包含最小必需的部件。

use crate::content::ReportContent;
use pathodx_core::{PathoError, Result};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:docDefaults>
<w:rPrDefault><w:rPr><w:rFonts w:ascii="Times New Roman" w:hAnsi="Times New Roman" w:eastAsia="宋体"/><w:sz w:val="22"/></w:rPr></w:rPrDefault>
<w:pPrDefault><w:pPr><w:spacing w:after="120"/></w:pPr></w:pPrDefault>
</w:docDefaults>
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
<w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:pPr><w:jc w:val="center"/><w:spacing w:after="240"/></w:pPr><w:rPr><w:b/><w:sz w:val="36"/></w:rPr></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:pPr><w:spacing w:before="240" w:after="120"/></w:pPr><w:rPr><w:b/><w:sz w:val="26"/></w:rPr></w:style>
</w:styles>"#;

enum Align {
    Left,
    Center,
    Right,
}

#[derive(Default)]
struct DocumentBody {
    xml: String,
}

impl DocumentBody {
    fn paragraph(&mut self, text: &str, style: Option<&str>, align: Align, size_half_points: Option<u32>) {
        self.xml.push_str("<w:p>");
        let jc = match align {
            Align::Left => None,
            Align::Center => Some("center"),
            Align::Right => Some("right"),
        };
        if style.is_some() || jc.is_some() {
            self.xml.push_str("<w:pPr>");
            if let Some(style) = style {
                self.xml.push_str(&format!(r#"<w:pStyle w:val="{style}"/>"#));
            }
            if let Some(jc) = jc {
                self.xml.push_str(&format!(r#"<w:jc w:val="{jc}"/>"#));
            }
            self.xml.push_str("</w:pPr>");
        }
        self.xml.push_str("<w:r>");
        if let Some(size) = size_half_points {
            self.xml.push_str(&format!(r#"<w:rPr><w:sz w:val="{size}"/></w:rPr>"#));
        }
        self.xml.push_str(&format!(
            r#"<w:t xml:space="preserve">{}</w:t>"#,
            escape_xml(text)
        ));
        self.xml.push_str("</w:r></w:p>");
    }

    fn into_document(self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1134" w:bottom="1440" w:left="1134" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr></w:body></w:document>"#,
            self.xml
        )
    }
}

/// XML文本转义
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // XML 1.0 不允许的控制字符
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

fn document_xml(content: &ReportContent) -> String {
    let mut body = DocumentBody::default();

    body.paragraph(&content.title, Some("Title"), Align::Center, None);
    for line in content.metadata() {
        body.paragraph(&line, None, Align::Right, Some(18));
    }

    for section in content.sections() {
        body.paragraph(&section.heading, Some("Heading1"), Align::Left, None);
        for line in &section.lines {
            body.paragraph(line, None, Align::Left, None);
        }
    }

    body.paragraph("免责声明", Some("Heading1"), Align::Left, None);
    body.paragraph(&content.disclaimer, None, Align::Left, Some(18));
    body.paragraph(&content.footer, None, Align::Center, Some(18));

    body.into_document()
}

fn zip_error(e: impl std::fmt::Display) -> PathoError {
    PathoError::ReportGeneration(format!("Word文档生成错误: {e}"))
}

/// 渲染Word报告, 返回 `.docx` 文件字节
pub fn render_word(content: &ReportContent) -> Result<Vec<u8>> {
    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", PACKAGE_RELS.to_string()),
        ("word/document.xml", document_xml(content)),
        ("word/styles.xml", STYLES.to_string()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS.to_string()),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, xml) in parts {
        zip.start_file(name, options).map_err(zip_error)?;
        zip.write_all(xml.as_bytes()).map_err(zip_error)?;
    }

    let cursor = zip.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::content::tests::sample_content;
    use std::io::Read;

    pub(crate) fn read_document(bytes: &[u8]) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name("word/document.xml").unwrap();
        let mut xml = String::new();
        file.read_to_string(&mut xml).unwrap();
        xml
    }

    #[test]
    fn test_docx_contains_report_text() {
        let bytes = render_word(&sample_content()).unwrap();
        assert!(bytes.starts_with(b"PK"));

        let xml = read_document(&bytes);
        assert!(xml.contains("法医病理辅助诊断报告"));
        assert!(xml.contains("肺炎"));
        assert!(xml.contains("87.00%"));
        assert!(xml.contains("张三"));
    }

    #[test]
    fn test_docx_package_parts() {
        let bytes = render_word(&sample_content()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        for name in [
            "[Content_Types].xml",
            "_rels/.rels",
            "word/styles.xml",
            "word/_rels/document.xml.rels",
        ] {
            assert!(archive.by_name(name).is_ok(), "missing part {name}");
        }
    }

    #[test]
    fn test_user_text_is_escaped() {
        let mut content = sample_content();
        content.notes = Some("<b>R&D</b>\u{1}".to_string());
        let xml = read_document(&render_word(&content).unwrap());
        assert!(xml.contains("&lt;b&gt;R&amp;D&lt;/b&gt;"));
        assert!(!xml.contains("<b>R&D"));
    }
}
