//! Core data model, format sniffing, error taxonomy and error journal for
//! extracting text and images from DOCX and PDF documents.

pub mod error;
pub mod format;
pub mod journal;
pub mod source;
pub mod types;

pub use error::{Error, Result};
pub use format::{ImageFormat, Sniffed, SourceFormat, LEGACY_DOC_WARNING};
pub use journal::{ErrorLog, FileErrorLog, MemoryErrorLog, DEFAULT_LOG_FILE};
pub use source::{DocumentSource, ImageAssets, ResultSink};
pub use types::{
    AssetId, ColorSpace, ExtractionResult, HalfPoints, ImageAsset, ImageData, Paragraph,
    RawSamples, RebuiltDocument, Rgb, Run, RunStyle, SourceContent,
};
