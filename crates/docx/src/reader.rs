//! DOCX package reader.

use crate::body::parse_body;
use crate::package::{
    parse_relationships, read_part_bytes, read_part_string, rels_path_for, resolve_target,
    ContentTypes, Relationship, DEFAULT_MAIN_PART,
};
use docex_core::{
    AssetId, DocumentSource, Error, ImageAsset, ImageAssets, ImageData, Paragraph, Result,
    SourceContent, SourceFormat,
};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use zip::ZipArchive;

type PackageArchive = ZipArchive<Cursor<Arc<[u8]>>>;

/// Opens DOCX (Office Open XML) packages.
pub struct DocxReader;

impl DocxReader {
    /// Create a new DOCX reader.
    pub fn new() -> Self {
        Self
    }

    /// Open a package from disk.
    pub fn open(&self, path: &Path) -> Result<DocxDocument> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::ContainerOpen(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        log::debug!("Opening DOCX package {} ({} bytes)", path.display(), bytes.len());
        self.from_bytes(bytes)
    }

    /// Open a package held in memory.
    pub fn from_bytes(&self, bytes: impl Into<Arc<[u8]>>) -> Result<DocxDocument> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.into()))
            .map_err(|e| Error::ContainerOpen(format!("Not a valid DOCX package: {}", e)))?;

        let main_part = self.find_main_part(&mut archive)?;

        let content_types = match read_part_string(&mut archive, "[Content_Types].xml") {
            Ok(xml) => ContentTypes::parse(&xml)?,
            Err(e) => {
                log::warn!("Package has no usable content types table: {}", e);
                ContentTypes::default()
            }
        };

        let relationships = match read_part_string(&mut archive, &rels_path_for(&main_part)) {
            Ok(xml) => parse_relationships(&xml)?,
            Err(_) => {
                log::debug!("No relationships for {}", main_part);
                Vec::new()
            }
        };

        let body = read_part_string(&mut archive, &main_part)?;
        let paragraphs = parse_body(&body)?;

        Ok(DocxDocument {
            archive,
            main_part,
            content_types,
            relationships,
            paragraphs,
        })
    }

    /// Follow the package relationships to the main document part.
    fn find_main_part(&self, archive: &mut PackageArchive) -> Result<String> {
        let rels = match read_part_string(archive, "_rels/.rels") {
            Ok(xml) => parse_relationships(&xml)?,
            Err(_) => {
                log::warn!("Package has no root relationships; assuming {}", DEFAULT_MAIN_PART);
                return Ok(DEFAULT_MAIN_PART.to_string());
            }
        };

        rels.iter()
            .find(|r| r.is_office_document() && !r.external)
            .map(|r| resolve_target("", &r.target))
            .ok_or_else(|| {
                Error::ContainerOpen("Package has no main document relationship".to_string())
            })
    }
}

impl Default for DocxReader {
    fn default() -> Self {
        Self::new()
    }
}

/// An opened DOCX package.
///
/// Paragraphs are parsed when the package is opened. Image parts are read
/// lazily, one per iteration step.
pub struct DocxDocument {
    archive: PackageArchive,
    main_part: String,
    content_types: ContentTypes,
    relationships: Vec<Relationship>,
    paragraphs: Vec<Paragraph>,
}

impl DocxDocument {
    /// Body paragraphs in document order.
    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    /// Path of the main document part inside the package.
    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    /// Image relationships that point into the package.
    fn image_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(|r| {
            if r.is_image() && r.external {
                log::debug!("Skipping linked image {} -> {}", r.id, r.target);
            }
            r.is_image() && !r.external
        })
    }
}

impl DocumentSource for DocxDocument {
    fn format(&self) -> SourceFormat {
        SourceFormat::WordPackage
    }

    fn content(&self) -> Result<SourceContent> {
        Ok(SourceContent::Paragraphs(self.paragraphs.clone()))
    }

    fn image_assets(&self) -> ImageAssets<'_> {
        // The archive shares its backing buffer, so the clone is a fresh cursor.
        let mut archive = self.archive.clone();

        Box::new(self.image_relationships().map(move |rel| -> Result<ImageAsset> {
            let part = resolve_target(&self.main_part, &rel.target);
            let bytes = read_part_bytes(&mut archive, &part).map_err(|e| {
                Error::Decode(format!("Image part '{}' of {} is unreadable: {}", part, rel.id, e))
            })?;

            Ok(ImageAsset {
                id: AssetId::Relationship(rel.id.clone()),
                media_type: self.content_types.media_type_for(&part).to_string(),
                data: ImageData::Encoded(bytes),
            })
        }))
    }
}
