//! Input format sniffing and output image formats.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Warning raised for `.doc` inputs, which are only readable when they are
/// really packages with the wrong extension.
pub const LEGACY_DOC_WARNING: &str =
    "The .doc format may not be fully supported. Converting the file to DOCX is recommended.";

/// The kind of container an input file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    /// Office Open XML word-processing package (.docx).
    WordPackage,
    /// PDF page-description document.
    PageDocument,
}

/// Result of sniffing a supported input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniffed {
    pub format: SourceFormat,
    /// Non-fatal notice for the caller, e.g. for `.doc` files.
    pub warning: Option<String>,
}

impl SourceFormat {
    /// Map a file extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "docx" | "doc" => Some(Self::WordPackage),
            "pdf" => Some(Self::PageDocument),
            _ => None,
        }
    }

    /// Classify a path by its extension alone; the file is not touched.
    pub fn sniff(path: &Path) -> Result<Sniffed> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                Error::UnsupportedFormat(format!("'{}' has no file extension", path.display()))
            })?;

        let format = Self::from_extension(ext)
            .ok_or_else(|| Error::UnsupportedFormat(format!(".{ext}")))?;

        let warning = ext
            .eq_ignore_ascii_case("doc")
            .then(|| LEGACY_DOC_WARNING.to_string());

        if warning.is_some() {
            log::warn!("{}: {}", path.display(), LEGACY_DOC_WARNING);
        }

        Ok(Sniffed { format, warning })
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WordPackage => f.write_str("DOCX"),
            Self::PageDocument => f.write_str("PDF"),
        }
    }
}

/// Raster format images are re-encoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
}

impl ImageFormat {
    /// File extension used for written images.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Bmp => "bmp",
        }
    }

    /// Whether the quality setting affects the output.
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg)
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PNG" => Ok(Self::Png),
            "JPEG" | "JPG" => Ok(Self::Jpeg),
            "BMP" => Ok(Self::Bmp),
            other => Err(Error::InputValidation(format!(
                "Image format must be one of PNG, JPEG, BMP (got {other:?})"
            ))),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => f.write_str("PNG"),
            Self::Jpeg => f.write_str("JPEG"),
            Self::Bmp => f.write_str("BMP"),
        }
    }
}
