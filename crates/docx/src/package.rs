//! OPC package plumbing: relationship tables, content types, part paths.

use docex_core::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

/// Relationship type suffix of the main document part.
const OFFICE_DOCUMENT_SUFFIX: &str = "/officeDocument";

/// Relationship type suffix of embedded images (transitional and strict).
const IMAGE_SUFFIX: &str = "/image";

/// Largest part accepted from a package.
const MAX_PART_SIZE: u64 = 256 * 1024 * 1024;

/// Cap on the buffer reserved from a part's declared size.
const MAX_PREALLOC: u64 = 1024 * 1024;

/// Main document part used when the package relationships are missing.
pub const DEFAULT_MAIN_PART: &str = "word/document.xml";

/// One entry of a `.rels` relationship table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    /// `TargetMode="External"`: the target is a URI, not a package part.
    pub external: bool,
}

impl Relationship {
    /// Whether the relationship points at an image part.
    pub fn is_image(&self) -> bool {
        self.rel_type.ends_with(IMAGE_SUFFIX)
    }

    /// Whether the relationship points at the main document part.
    pub fn is_office_document(&self) -> bool {
        self.rel_type.ends_with(OFFICE_DOCUMENT_SUFFIX)
    }
}

/// Parse a relationship table, keeping document order.
pub fn parse_relationships(xml: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut relationships = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let mut rel = Relationship {
                    id: String::new(),
                    rel_type: String::new(),
                    target: String::new(),
                    external: false,
                };

                for attr in e.attributes().flatten() {
                    let value = attr
                        .unescape_value()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                    match attr.key.as_ref() {
                        b"Id" => rel.id = value,
                        b"Type" => rel.rel_type = value,
                        b"Target" => rel.target = value,
                        b"TargetMode" => rel.external = value.eq_ignore_ascii_case("External"),
                        _ => {}
                    }
                }

                relationships.push(rel);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ContainerOpen(format!(
                    "Error parsing relationships: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(relationships)
}

/// Path of the relationship table belonging to `part`.
///
/// `word/document.xml` → `word/_rels/document.xml.rels`
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/_rels/{name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns the relationship.
///
/// Absolute targets (`/word/media/a.png`) are taken from the package root;
/// relative ones are joined to the source part's directory and normalized.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    segments.join("/")
}

/// The `[Content_Types].xml` table.
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    /// Lower-case extension → media type.
    defaults: HashMap<String, String>,
    /// Part name without leading slash → media type.
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    /// Parse `[Content_Types].xml`.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut types = Self::default();

        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    match local_name(e.name().as_ref()) {
                        b"Default" => {
                            if let (Some(ext), Some(ct)) =
                                (attr_value(e, b"Extension"), attr_value(e, b"ContentType"))
                            {
                                types.defaults.insert(ext.to_ascii_lowercase(), ct);
                            }
                        }
                        b"Override" => {
                            if let (Some(part), Some(ct)) =
                                (attr_value(e, b"PartName"), attr_value(e, b"ContentType"))
                            {
                                types
                                    .overrides
                                    .insert(part.trim_start_matches('/').to_string(), ct);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::ContainerOpen(format!(
                        "Error parsing content types: {}",
                        e
                    )));
                }
                _ => {}
            }
        }

        Ok(types)
    }

    /// Declared media type of a part, falling back to `application/octet-stream`.
    pub fn media_type_for(&self, part: &str) -> &str {
        if let Some(ct) = self.overrides.get(part.trim_start_matches('/')) {
            return ct;
        }
        part.rsplit_once('.')
            .and_then(|(_, ext)| self.defaults.get(&ext.to_ascii_lowercase()))
            .map(String::as_str)
            .unwrap_or("application/octet-stream")
    }
}

/// Read a part as UTF-8 text.
pub fn read_part_string<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let file = archive
        .by_name(path)
        .map_err(|e| Error::ContainerOpen(format!("Part not found in package '{}': {}", path, e)))?;

    let declared = file.size();
    let bytes = read_limited(file, declared, MAX_PART_SIZE)
        .map_err(|e| Error::ContainerOpen(format!("Failed to read '{}': {}", path, e)))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::ContainerOpen(format!("Failed to read '{}': {}", path, e)))
}

/// Read a part as raw bytes.
pub fn read_part_bytes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> std::io::Result<Vec<u8>> {
    let file = archive.by_name(path)?;
    let declared = file.size();
    read_limited(file, declared, MAX_PART_SIZE)
}

/// Read at most `limit` bytes; the declared size only sizes the first buffer.
fn read_limited(reader: impl Read, declared: u64, limit: u64) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(declared.min(MAX_PREALLOC) as usize);
    reader.take(limit + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("part is larger than {} bytes", limit),
        ));
    }
    Ok(bytes)
}

/// Extract the local name from a potentially namespaced XML name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Value of the attribute whose local name is `key`.
pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| local_name(attr.key.as_ref()) == key)
        .map(|attr| {
            attr.unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned())
        })
}
