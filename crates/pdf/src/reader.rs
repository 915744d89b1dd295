//! PDF reader: per-page text and per-page image XObjects.

use docex_core::{
    AssetId, ColorSpace, DocumentSource, Error, ImageAsset, ImageAssets, ImageData, RawSamples,
    Result, SourceContent, SourceFormat,
};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::path::Path;

/// Parent chain depth limit when looking up inherited page resources.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Nesting limit for form XObjects drawn inside other forms.
const MAX_FORM_DEPTH: usize = 16;

/// Opens PDF documents.
pub struct PdfReader;

impl PdfReader {
    /// Create a new PDF reader.
    pub fn new() -> Self {
        Self
    }

    /// Open a PDF from disk.
    pub fn open(&self, path: &Path) -> Result<PdfDocument> {
        log::debug!("Opening PDF {}", path.display());
        let doc = Document::load(path).map_err(|e| {
            Error::ContainerOpen(format!("Failed to open PDF '{}': {}", path.display(), e))
        })?;
        Self::checked(doc)
    }

    /// Open a PDF held in memory.
    pub fn from_bytes(&self, bytes: &[u8]) -> Result<PdfDocument> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| Error::ContainerOpen(format!("Failed to open PDF: {}", e)))?;
        Self::checked(doc)
    }

    fn checked(doc: Document) -> Result<PdfDocument> {
        if doc.is_encrypted() {
            return Err(Error::ContainerOpen(
                "PDF is encrypted; decrypt it before extraction".to_string(),
            ));
        }
        let page_count = doc.get_pages().len();
        log::debug!("PDF has {} pages", page_count);
        Ok(PdfDocument { doc })
    }
}

impl Default for PdfReader {
    fn default() -> Self {
        Self::new()
    }
}

/// An opened PDF document.
pub struct PdfDocument {
    doc: Document,
}

impl PdfDocument {
    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Text of every page, in page order.
    ///
    /// Text comes out in content-stream order, which is not reading order for
    /// multi-column layouts. A page whose text cannot be decoded yields an
    /// empty string and a warning.
    pub fn page_texts(&self) -> Vec<String> {
        self.doc
            .get_pages()
            .into_keys()
            .map(|page| match self.doc.extract_text(&[page]) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Failed to extract text from page {}: {}", page, e);
                    String::new()
                }
            })
            .collect()
    }

    /// Image XObjects of every page, in page order then resource order.
    pub fn page_images(&self) -> ImageAssets<'_> {
        Box::new(
            self.doc
                .get_pages()
                .into_iter()
                .flat_map(move |(page, page_id)| self.images_on_page(page, page_id)),
        )
    }

    /// Resolve each image XObject of one page through the cross-reference table.
    ///
    /// Images drawn through form XObjects count as images of the page. Each
    /// object is visited once per page, which also breaks form cycles.
    fn images_on_page(&self, page: u32, page_id: ObjectId) -> Vec<Result<ImageAsset>> {
        let Some(xobjects) = self.page_xobjects(page_id) else {
            return Vec::new();
        };

        let mut assets = Vec::new();
        let mut seen = HashSet::new();
        self.collect_images(page, xobjects, 0, &mut seen, &mut assets);

        log::debug!("Page {}: {} images", page, assets.len());
        assets
    }

    fn collect_images(
        &self,
        page: u32,
        xobjects: &Dictionary,
        depth: usize,
        seen: &mut HashSet<ObjectId>,
        assets: &mut Vec<Result<ImageAsset>>,
    ) {
        for (name, value) in xobjects.iter() {
            let (object_id, stream) = match self.resolve_stream(value) {
                Some(found) => found,
                None => {
                    log::debug!(
                        "Page {}: XObject /{} is not a stream",
                        page,
                        String::from_utf8_lossy(name)
                    );
                    continue;
                }
            };
            if let Some(id) = object_id {
                if !seen.insert(id) {
                    continue;
                }
            }

            match stream.dict.get(b"Subtype").and_then(Object::as_name) {
                Ok(subtype) if subtype == b"Image" => {
                    let id = AssetId::PageObject {
                        page,
                        index: assets.len() + 1,
                        object: object_id.unwrap_or((0, 0)),
                    };
                    assets.push(Ok(self.image_asset(id, stream)));
                }
                Ok(subtype) if subtype == b"Form" => {
                    if depth >= MAX_FORM_DEPTH {
                        log::warn!(
                            "Page {}: form XObjects nested deeper than {}",
                            page,
                            MAX_FORM_DEPTH
                        );
                        continue;
                    }
                    if let Some(nested) = self.form_xobjects(stream) {
                        self.collect_images(page, nested, depth + 1, seen, assets);
                    }
                }
                _ => {}
            }
        }
    }

    /// The XObject dictionary in a form's own `/Resources`.
    fn form_xobjects<'a>(&'a self, form: &'a Stream) -> Option<&'a Dictionary> {
        let resources = form.dict.get(b"Resources").ok()?;
        let xobjects = self.resolve(resources).as_dict().ok()?.get(b"XObject").ok()?;
        self.resolve(xobjects).as_dict().ok()
    }

    /// The XObject dictionary of a page, following `/Parent` for inherited resources.
    fn page_xobjects(&self, page_id: ObjectId) -> Option<&Dictionary> {
        let mut node = self.doc.get_dictionary(page_id).ok()?;

        for _ in 0..MAX_INHERITANCE_DEPTH {
            if let Ok(resources) = node.get(b"Resources") {
                let resources = self.resolve(resources).as_dict().ok()?;
                return resources
                    .get(b"XObject")
                    .ok()
                    .and_then(|x| self.resolve(x).as_dict().ok());
            }
            let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
            node = self.doc.get_dictionary(parent).ok()?;
        }

        None
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> &'a Object {
        match object {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(object),
            other => other,
        }
    }

    fn resolve_stream<'a>(&'a self, object: &'a Object) -> Option<(Option<ObjectId>, &'a Stream)> {
        match object {
            Object::Reference(id) => {
                let stream = self.doc.get_object(*id).ok()?.as_stream().ok()?;
                Some((Some(*id), stream))
            }
            Object::Stream(stream) => Some((None, stream)),
            _ => None,
        }
    }

    /// Describe an image stream without decoding it.
    fn image_asset(&self, id: AssetId, stream: &Stream) -> ImageAsset {
        let dict = &stream.dict;
        let filters = self.filters(dict);
        let content = stream.content.clone();

        let (media_type, data) = match filters.as_slice() {
            [] => ("image/x-raw".to_string(), self.samples(dict, false, content)),
            [f] if f == "FlateDecode" => {
                ("image/x-raw".to_string(), self.samples(dict, true, content))
            }
            [f] if f == "DCTDecode" => ("image/jpeg".to_string(), ImageData::Encoded(content)),
            [f] if f == "JPXDecode" => ("image/jp2".to_string(), ImageData::Encoded(content)),
            other => {
                log::debug!("{}: unsupported filter chain {:?}", id, other);
                (format!("application/x-pdf-{}", other.join("+")), ImageData::Encoded(content))
            }
        };

        ImageAsset {
            id,
            media_type,
            data,
        }
    }

    fn samples(&self, dict: &Dictionary, deflated: bool, bytes: Vec<u8>) -> ImageData {
        let int = |key: &[u8]| {
            dict.get(key)
                .map(|o| self.resolve(o))
                .and_then(Object::as_i64)
                .ok()
        };

        ImageData::Samples(RawSamples {
            width: int(b"Width").and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
            height: int(b"Height").and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
            color_space: self.color_space(dict),
            bits_per_component: int(b"BitsPerComponent")
                .and_then(|v| u8::try_from(v).ok())
                .unwrap_or(8),
            deflated,
            bytes,
        })
    }

    /// Filter names of a stream, in application order.
    fn filters(&self, dict: &Dictionary) -> Vec<String> {
        let Ok(filter) = dict.get(b"Filter") else {
            return Vec::new();
        };
        match self.resolve(filter) {
            Object::Name(name) => vec![String::from_utf8_lossy(name).into_owned()],
            Object::Array(items) => items
                .iter()
                .filter_map(|o| self.resolve(o).as_name().ok())
                .map(|n| String::from_utf8_lossy(n).into_owned())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn color_space(&self, dict: &Dictionary) -> ColorSpace {
        let Ok(cs) = dict.get(b"ColorSpace") else {
            return ColorSpace::Other("unspecified".to_string());
        };

        match self.resolve(cs) {
            Object::Name(name) => ColorSpace::from_pdf_name(&String::from_utf8_lossy(name)),
            Object::Array(items) => {
                let family = items
                    .first()
                    .and_then(|o| self.resolve(o).as_name().ok())
                    .map(|n| String::from_utf8_lossy(n).into_owned())
                    .unwrap_or_default();

                if family == "ICCBased" {
                    // The ICC profile stream declares its component count.
                    let components = items
                        .get(1)
                        .and_then(|o| self.resolve_stream(o))
                        .and_then(|(_, s)| s.dict.get(b"N").and_then(Object::as_i64).ok());
                    match components {
                        Some(1) => ColorSpace::Gray,
                        Some(3) => ColorSpace::Rgb,
                        Some(4) => ColorSpace::Cmyk,
                        _ => ColorSpace::Other(family),
                    }
                } else {
                    ColorSpace::from_pdf_name(&family)
                }
            }
            _ => ColorSpace::Other("unknown".to_string()),
        }
    }
}

impl DocumentSource for PdfDocument {
    fn format(&self) -> SourceFormat {
        SourceFormat::PageDocument
    }

    fn content(&self) -> Result<SourceContent> {
        Ok(SourceContent::Pages(self.page_texts()))
    }

    fn image_assets(&self) -> ImageAssets<'_> {
        self.page_images()
    }
}
