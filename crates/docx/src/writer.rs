//! DOCX writer for rebuilt documents.
//!
//! Produces a minimal package: content types, package relationships, the main
//! document part and a styles part declaring every paragraph style in use.
//! Unset run properties are not written, so they keep inheriting.

use docex_core::{Error, Paragraph, RebuiltDocument, Result, Run, RunStyle};
use quick_xml::escape::escape;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
</Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// US Letter with one-inch margins, in twentieths of a point.
const SECTION_PROPERTIES: &str = r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr>"#;

/// Serializes [`RebuiltDocument`]s as DOCX packages.
#[derive(Debug)]
pub struct DocxWriter;

impl DocxWriter {
    /// Create a new DOCX writer.
    pub fn new() -> Self {
        Self
    }

    /// Write `document` to `path`, creating parent directories as needed.
    pub fn write(&self, document: &RebuiltDocument, path: &Path) -> Result<()> {
        let persist = |reason: String| Error::Persist {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| persist(format!("cannot create '{}': {}", parent.display(), e)))?;
        }

        let file = File::create(path).map_err(|e| persist(e.to_string()))?;
        let mut out = self
            .write_to(document, BufWriter::new(file))
            .map_err(|e| persist(e.to_string()))?;
        out.flush().map_err(|e| persist(e.to_string()))?;

        log::debug!(
            "Wrote {} paragraphs to {}",
            document.paragraphs.len(),
            path.display()
        );
        Ok(())
    }

    /// Serialize `document` into an in-memory package.
    pub fn to_bytes(&self, document: &RebuiltDocument) -> Result<Vec<u8>> {
        let cursor = self
            .write_to(document, Cursor::new(Vec::new()))
            .map_err(|e| Error::Encode(format!("Failed to build DOCX package: {}", e)))?;
        Ok(cursor.into_inner())
    }

    fn write_to<W: Write + Seek>(
        &self,
        document: &RebuiltDocument,
        writer: W,
    ) -> zip::result::ZipResult<W> {
        let mut zip = ZipWriter::new(writer);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES_XML.as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(ROOT_RELS_XML.as_bytes())?;

        zip.start_file("word/document.xml", options)?;
        zip.write_all(document_xml(document).as_bytes())?;

        zip.start_file("word/_rels/document.xml.rels", options)?;
        zip.write_all(DOCUMENT_RELS_XML.as_bytes())?;

        zip.start_file("word/styles.xml", options)?;
        zip.write_all(styles_xml(document).as_bytes())?;

        zip.finish()
    }
}

impl Default for DocxWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Build `word/document.xml`.
fn document_xml(document: &RebuiltDocument) -> String {
    let mut xml = String::with_capacity(256 + document.paragraphs.len() * 128);
    xml.push_str(XML_DECL);
    xml.push_str(&format!(r#"<w:document xmlns:w="{W_NS}"><w:body>"#));

    for paragraph in &document.paragraphs {
        push_paragraph(&mut xml, paragraph);
    }

    xml.push_str(SECTION_PROPERTIES);
    xml.push_str("</w:body></w:document>");
    xml
}

fn push_paragraph(xml: &mut String, paragraph: &Paragraph) {
    if paragraph.style_id.is_none() && paragraph.runs.is_empty() {
        xml.push_str("<w:p/>");
        return;
    }

    xml.push_str("<w:p>");
    if let Some(style_id) = &paragraph.style_id {
        xml.push_str(&format!(
            r#"<w:pPr><w:pStyle w:val="{}"/></w:pPr>"#,
            escape_xml(style_id)
        ));
    }
    for run in &paragraph.runs {
        push_run(xml, run);
    }
    xml.push_str("</w:p>");
}

fn push_run(xml: &mut String, run: &Run) {
    xml.push_str("<w:r>");
    push_run_properties(xml, &run.style);

    // Tabs and breaks are elements, not characters, inside a run.
    let mut pending = String::new();
    for ch in run.text.chars() {
        let element = match ch {
            '\t' => "<w:tab/>",
            '\n' => "<w:br/>",
            '\u{c}' => r#"<w:br w:type="page"/>"#,
            c if is_xml_char(c) && c != '\r' => {
                pending.push(c);
                continue;
            }
            _ => continue,
        };
        push_text(xml, &pending);
        pending.clear();
        xml.push_str(element);
    }
    push_text(xml, &pending);

    xml.push_str("</w:r>");
}

/// Characters allowed in XML 1.0 content.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Escape for content or attribute values, dropping characters XML cannot carry.
fn escape_xml(text: &str) -> String {
    if text.chars().all(is_xml_char) {
        return escape(text).into_owned();
    }
    let kept: String = text.chars().filter(|&c| is_xml_char(c)).collect();
    escape(kept.as_str()).into_owned()
}

fn push_text(xml: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    xml.push_str(r#"<w:t xml:space="preserve">"#);
    xml.push_str(&escape_xml(text));
    xml.push_str("</w:t>");
}

/// Write only the properties the source run set, in schema order.
fn push_run_properties(xml: &mut String, style: &RunStyle) {
    if style.is_inherited() {
        return;
    }

    xml.push_str("<w:rPr>");
    if let Some(name) = &style.font_name {
        let name = escape_xml(name);
        xml.push_str(&format!(
            r#"<w:rFonts w:ascii="{name}" w:hAnsi="{name}" w:cs="{name}"/>"#
        ));
    }
    push_toggle(xml, "b", style.bold);
    push_toggle(xml, "i", style.italic);
    if let Some(color) = style.color {
        xml.push_str(&format!(r#"<w:color w:val="{color}"/>"#));
    }
    if let Some(size) = style.font_size {
        xml.push_str(&format!(r#"<w:sz w:val="{}"/>"#, size.0));
    }
    match style.underline {
        Some(true) => xml.push_str(r#"<w:u w:val="single"/>"#),
        Some(false) => xml.push_str(r#"<w:u w:val="none"/>"#),
        None => {}
    }
    xml.push_str("</w:rPr>");
}

fn push_toggle(xml: &mut String, tag: &str, value: Option<bool>) {
    match value {
        Some(true) => xml.push_str(&format!("<w:{tag}/>")),
        Some(false) => xml.push_str(&format!(r#"<w:{tag} w:val="0"/>"#)),
        None => {}
    }
}

/// Build `word/styles.xml` with `Normal` plus every paragraph style referenced.
fn styles_xml(document: &RebuiltDocument) -> String {
    let used: BTreeSet<&str> = document
        .paragraphs
        .iter()
        .filter_map(|p| p.style_id.as_deref())
        .filter(|id| *id != "Normal")
        .collect();

    let mut xml = String::new();
    xml.push_str(XML_DECL);
    xml.push_str(&format!(r#"<w:styles xmlns:w="{W_NS}">"#));
    xml.push_str(
        r#"<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style>"#,
    );

    for id in used {
        let escaped = escape_xml(id);
        xml.push_str(&format!(
            r#"<w:style w:type="paragraph" w:styleId="{escaped}"><w:name w:val="{}"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/>"#,
            escape_xml(&style_display_name(id))
        ));
        if let Some(level) = heading_level(id) {
            xml.push_str(&format!(
                r#"<w:pPr><w:keepNext/><w:outlineLvl w:val="{}"/></w:pPr><w:rPr><w:b/></w:rPr>"#,
                level - 1
            ));
        }
        xml.push_str("</w:style>");
    }

    xml.push_str("</w:styles>");
    xml
}

/// Level of a built-in heading style id such as `Heading2`.
fn heading_level(style_id: &str) -> Option<u8> {
    style_id
        .strip_prefix("Heading")
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|n| (1..=9).contains(n))
}

/// Word's built-in display names are lower-case for headings.
fn style_display_name(style_id: &str) -> String {
    match heading_level(style_id) {
        Some(level) => format!("heading {level}"),
        None => style_id.to_string(),
    }
}
