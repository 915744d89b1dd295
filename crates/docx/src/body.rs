//! Paragraph and run reconstruction from `word/document.xml`.
//!
//! Only paragraphs that are direct children of `w:body` are returned; table
//! cells, text boxes and other nested containers are skipped. Runs inside
//! hyperlinks, insertions and smart tags belong to their paragraph. Deleted
//! runs are dropped.

use crate::package::attr_value;
use docex_core::{Error, HalfPoints, Paragraph, Result, Rgb, Run};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Namespaces that identify WordprocessingML elements.
const WORD_NAMESPACES: &[&[u8]] = &[
    b"http://schemas.openxmlformats.org/wordprocessingml/2006/main",
    b"http://purl.oclc.org/ooxml/wordprocessingml/main",
];

/// Parse the main document part into body paragraphs, in document order.
pub fn parse_body(xml: &str) -> Result<Vec<Paragraph>> {
    let mut reader = Reader::from_str(xml);

    let mut names = WordNames::default();
    let mut state = BodyState::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                state.depth += 1;
                if state.depth == 1 {
                    names = WordNames::from_root(e);
                }
                state.open(e, &names, false);
            }
            Ok(Event::Empty(ref e)) => {
                state.depth += 1;
                state.open(e, &names, true);
                state.close(e.name().as_ref(), &names);
                state.depth -= 1;
            }
            Ok(Event::End(ref e)) => {
                state.close(e.name().as_ref(), &names);
                state.depth = state.depth.saturating_sub(1);
            }
            Ok(Event::Text(ref e)) if state.in_text => {
                let text = e.unescape().map_err(|err| {
                    Error::ContainerOpen(format!("Bad text in document body: {}", err))
                })?;
                state.push_text(&text);
            }
            Ok(Event::CData(ref e)) if state.in_text => {
                state.push_text(&String::from_utf8_lossy(e));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ContainerOpen(format!(
                    "Malformed document body at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    log::debug!("Parsed {} body paragraphs", state.paragraphs.len());
    Ok(state.paragraphs)
}

/// Prefix bound to the WordprocessingML namespace in this document.
#[derive(Debug)]
struct WordNames {
    prefix: Vec<u8>,
}

impl Default for WordNames {
    fn default() -> Self {
        Self {
            prefix: b"w".to_vec(),
        }
    }
}

impl WordNames {
    /// Read namespace declarations from the root element.
    fn from_root(root: &BytesStart<'_>) -> Self {
        for attr in root.attributes().flatten() {
            if !WORD_NAMESPACES.contains(&attr.value.as_ref()) {
                continue;
            }
            let key = attr.key.as_ref();
            if key == b"xmlns" {
                return Self { prefix: Vec::new() };
            }
            if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                return Self {
                    prefix: prefix.to_vec(),
                };
            }
        }
        Self::default()
    }

    /// Local name of `qname` if it is a WordprocessingML element.
    fn word_local<'a>(&self, qname: &'a [u8]) -> Option<&'a [u8]> {
        match qname.iter().position(|&b| b == b':') {
            Some(pos) => (qname[..pos] == self.prefix[..]).then(|| &qname[pos + 1..]),
            None => self.prefix.is_empty().then_some(qname),
        }
    }
}

#[derive(Debug, Default)]
struct BodyState {
    depth: usize,
    body_depth: Option<usize>,

    paragraph: Option<Paragraph>,
    paragraph_depth: usize,
    /// Paragraphs opened inside the current one (text boxes).
    nested_paragraphs: usize,
    /// Open `w:del` elements inside the current paragraph.
    deleted: usize,
    in_paragraph_props: bool,

    run: Option<Run>,
    run_depth: usize,
    in_run_props: bool,
    in_text: bool,

    paragraphs: Vec<Paragraph>,
}

impl BodyState {
    /// Inside a body paragraph and not inside a nested or deleted region.
    fn in_live_paragraph(&self) -> bool {
        self.paragraph.is_some() && self.nested_paragraphs == 0 && self.deleted == 0
    }

    /// Run content elements should be captured.
    fn capturing_run(&self) -> bool {
        self.run.is_some() && self.in_live_paragraph() && !self.in_run_props
    }

    fn open(&mut self, e: &BytesStart<'_>, names: &WordNames, empty: bool) {
        let qname = e.name();
        let Some(local) = names.word_local(qname.as_ref()) else {
            return;
        };

        match local {
            b"body" if self.body_depth.is_none() => {
                self.body_depth = Some(self.depth);
            }
            b"p" => {
                if self.paragraph.is_some() {
                    self.nested_paragraphs += 1;
                } else if self.body_depth.map(|d| d + 1) == Some(self.depth) {
                    self.paragraph = Some(Paragraph::new());
                    self.paragraph_depth = self.depth;
                }
            }
            b"del" if self.paragraph.is_some() => {
                self.deleted += 1;
            }
            b"pPr" if self.in_live_paragraph() && self.depth == self.paragraph_depth + 1 => {
                self.in_paragraph_props = true;
            }
            b"pStyle" if self.in_paragraph_props && self.depth == self.paragraph_depth + 2 => {
                if let (Some(paragraph), Some(id)) = (self.paragraph.as_mut(), attr_value(e, b"val")) {
                    paragraph.style_id = Some(id);
                }
            }
            b"r" if self.in_live_paragraph() && self.run.is_none() => {
                self.run = Some(Run::plain(String::new()));
                self.run_depth = self.depth;
            }
            b"rPr" if self.run.is_some() && self.depth == self.run_depth + 1 => {
                self.in_run_props = true;
            }
            _ if self.in_run_props && self.depth == self.run_depth + 2 => {
                self.read_run_property(local, e);
            }
            b"t" if self.capturing_run() => {
                self.in_text = !empty;
            }
            b"tab" if self.capturing_run() => self.push_text("\t"),
            b"br" | b"cr" if self.capturing_run() => self.push_text("\n"),
            b"noBreakHyphen" if self.capturing_run() => self.push_text("-"),
            _ => {}
        }
    }

    fn close(&mut self, qname: &[u8], names: &WordNames) {
        let Some(local) = names.word_local(qname) else {
            return;
        };

        match local {
            b"t" => self.in_text = false,
            b"rPr" if self.in_run_props && self.depth == self.run_depth + 1 => {
                self.in_run_props = false;
            }
            b"pPr" if self.depth == self.paragraph_depth + 1 => self.in_paragraph_props = false,
            b"r" if self.run.is_some() && self.depth == self.run_depth => {
                if let (Some(run), Some(paragraph)) = (self.run.take(), self.paragraph.as_mut()) {
                    paragraph.add_run(run);
                }
                self.in_run_props = false;
                self.in_text = false;
            }
            b"del" if self.paragraph.is_some() && self.deleted > 0 => {
                self.deleted -= 1;
            }
            b"p" if self.paragraph.is_some() => {
                if self.depth == self.paragraph_depth {
                    if let Some(paragraph) = self.paragraph.take() {
                        self.paragraphs.push(paragraph);
                    }
                    self.nested_paragraphs = 0;
                    self.deleted = 0;
                    self.in_paragraph_props = false;
                } else if self.nested_paragraphs > 0 {
                    self.nested_paragraphs -= 1;
                }
            }
            _ => {}
        }
    }

    fn read_run_property(&mut self, local: &[u8], e: &BytesStart<'_>) {
        let Some(run) = self.run.as_mut() else {
            return;
        };
        let style = &mut run.style;

        match local {
            b"b" => style.bold = Some(toggle(e)),
            b"i" => style.italic = Some(toggle(e)),
            b"u" => {
                let on = attr_value(e, b"val").map_or(true, |v| v != "none");
                style.underline = Some(on);
            }
            b"rFonts" => {
                if let Some(name) = attr_value(e, b"ascii").or_else(|| attr_value(e, b"hAnsi")) {
                    style.font_name = Some(name);
                }
            }
            b"sz" => {
                if let Some(size) = attr_value(e, b"val").and_then(|v| v.trim().parse().ok()) {
                    style.font_size = Some(HalfPoints(size));
                }
            }
            b"color" => {
                if let Some(value) = attr_value(e, b"val") {
                    if !value.eq_ignore_ascii_case("auto") {
                        match value.parse::<Rgb>() {
                            Ok(rgb) => style.color = Some(rgb),
                            Err(err) => log::debug!("Ignoring run color: {}", err),
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(run) = self.run.as_mut() {
            run.text.push_str(text);
        }
    }
}

/// Value of an on/off property such as `<w:b/>` or `<w:i w:val="0"/>`.
fn toggle(e: &BytesStart<'_>) -> bool {
    match attr_value(e, b"val") {
        Some(v) => !matches!(v.as_str(), "0" | "false" | "off"),
        None => true,
    }
}
