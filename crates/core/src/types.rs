//! Domain types for representing extracted document content.

use crate::format::SourceFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// An RGB color as carried by a run's `w:color` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl FromStr for Rgb {
    type Err = String;

    /// Parse a six-digit hex color such as `"1F3864"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('#');
        if s.len() != 6 || !s.is_ascii() {
            return Err(format!("not a hex RGB value: {s:?}"));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| format!("bad hex in {s:?}: {e}"))
        };
        Ok(Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// Font size in half-points, the unit used by `w:sz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfPoints(pub u32);

/// Character formatting of a run.
///
/// Every field is `None` when the source run does not set it, meaning the
/// value is inherited from the paragraph or document style. A rebuilt document
/// must leave such fields unset rather than writing an explicit `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStyle {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub font_name: Option<String>,
    pub font_size: Option<HalfPoints>,
    pub color: Option<Rgb>,
}

impl RunStyle {
    /// True when nothing is set at the run level.
    pub fn is_inherited(&self) -> bool {
        *self == RunStyle::default()
    }
}

/// A span of text sharing one formatting state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Text content; tabs and line breaks appear as `\t` and `\n`.
    pub text: String,
    pub style: RunStyle,
}

impl Run {
    /// A run with inherited formatting.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: RunStyle::default(),
        }
    }

    /// A run with explicit formatting.
    pub fn styled(text: impl Into<String>, style: RunStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// An ordered sequence of runs plus the paragraph style identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Paragraph style id such as `"Heading1"`; `None` means the default style.
    pub style_id: Option<String>,

    /// Runs in source order.
    pub runs: Vec<Run>,
}

impl Paragraph {
    /// Create an empty paragraph with the default style.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a single-run paragraph holding unformatted text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            style_id: None,
            runs: vec![Run::plain(text)],
        }
    }

    /// Set the paragraph style.
    pub fn with_style(mut self, style_id: impl Into<String>) -> Self {
        self.style_id = Some(style_id.into());
        self
    }

    /// Append a run.
    pub fn add_run(&mut self, run: Run) {
        self.runs.push(run);
    }

    /// Concatenated text of all runs.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// True when the paragraph has no text at all.
    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|r| r.text.is_empty())
    }
}

/// A word-processing document to be written out, built from extracted content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuiltDocument {
    pub paragraphs: Vec<Paragraph>,
}

impl RebuiltDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a paragraph.
    pub fn add_paragraph(&mut self, paragraph: Paragraph) {
        self.paragraphs.push(paragraph);
    }

    /// Text of every non-empty paragraph, each followed by a newline.
    ///
    /// Blank paragraphs are skipped so that a document with separator
    /// paragraphs compares equal to one without.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for paragraph in self.paragraphs.iter().filter(|p| !p.is_empty()) {
            out.push_str(&paragraph.text());
            out.push('\n');
        }
        out
    }
}

/// What a document reader yields as its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceContent {
    /// Ordered paragraphs with run-level formatting.
    Paragraphs(Vec<Paragraph>),
    /// One plain string per page, in page order.
    Pages(Vec<String>),
}

/// Source-assigned identity of an embedded image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetId {
    /// Relationship id inside a DOCX package, e.g. `rId7`.
    Relationship(String),
    /// Image XObject on a PDF page.
    PageObject {
        /// 1-based page number.
        page: u32,
        /// 1-based position among the page's images.
        index: usize,
        /// Cross-reference object number and generation.
        object: (u32, u16),
    },
}

impl AssetId {
    /// Page number for page-document assets.
    pub fn page(&self) -> Option<u32> {
        match self {
            AssetId::Relationship(_) => None,
            AssetId::PageObject { page, .. } => Some(*page),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Relationship(id) => write!(f, "{id}"),
            AssetId::PageObject {
                page,
                index,
                object,
            } => write!(f, "page {page} image {index} (obj {} {})", object.0, object.1),
        }
    }
}

/// Color model of raw image samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// Anything else (indexed, ICC based, separation, ...), kept by name.
    Other(String),
}

impl ColorSpace {
    /// Map a PDF color space name.
    pub fn from_pdf_name(name: &str) -> Self {
        match name {
            "DeviceGray" | "G" | "CalGray" => ColorSpace::Gray,
            "DeviceRGB" | "RGB" | "CalRGB" => ColorSpace::Rgb,
            "DeviceCMYK" | "CMYK" => ColorSpace::Cmyk,
            other => ColorSpace::Other(other.to_string()),
        }
    }

    /// Number of components per pixel, if known.
    pub fn components(&self) -> Option<usize> {
        match self {
            ColorSpace::Gray => Some(1),
            ColorSpace::Rgb => Some(3),
            ColorSpace::Cmyk => Some(4),
            ColorSpace::Other(_) => None,
        }
    }
}

/// Uncompressed or deflated pixel samples with their layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSamples {
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    pub bits_per_component: u8,
    /// Samples are zlib-deflated and must be inflated first.
    pub deflated: bool,
    pub bytes: Vec<u8>,
}

/// The payload of an embedded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageData {
    /// A self-describing encoded image file (PNG, JPEG, GIF, ...).
    Encoded(Vec<u8>),
    /// Bare pixel samples that need their layout to be decoded.
    Samples(RawSamples),
}

impl ImageData {
    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        match self {
            ImageData::Encoded(bytes) => bytes.len(),
            ImageData::Samples(samples) => samples.bytes.len(),
        }
    }

    /// True when there are no payload bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An embedded image discovered while walking a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub id: AssetId,
    /// Media type declared by the container, e.g. `image/png`.
    pub media_type: String,
    pub data: ImageData,
}

/// Outcome of a completed extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Detected source format.
    pub format: SourceFormat,
    /// Style-preserving document; only produced for Word sources.
    pub styled_path: Option<PathBuf>,
    /// Plain-text document.
    pub plain_path: PathBuf,
    /// Directory the images were written into.
    pub image_dir: PathBuf,
    /// Image files written, in discovery order.
    pub image_files: Vec<PathBuf>,
    /// Flattened text for preview.
    pub text: String,
    pub images_written: usize,
    pub images_attempted: usize,
    /// Non-fatal notices raised during the run.
    pub warnings: Vec<String>,
}

impl ExtractionResult {
    /// The document a user should open first: the styled one when present.
    pub fn primary_document(&self) -> &Path {
        self.styled_path.as_deref().unwrap_or(&self.plain_path)
    }

    /// Number of images that were discovered but not written.
    pub fn images_failed(&self) -> usize {
        self.images_attempted.saturating_sub(self.images_written)
    }
}
