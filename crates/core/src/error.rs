//! Error types for document extraction.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can end an extraction run.
///
/// Per-image decode and encode failures are not represented here as terminal
/// errors; the image extractor recovers from them locally. `Decode` and
/// `Encode` exist so that readers can describe an asset they could not hand out.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing input path, missing output directory, or a malformed image setting.
    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// The file extension is not one we know how to open.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The container could not be opened: corrupt, truncated, encrypted, or not
    /// the format its extension claims.
    #[error("Failed to open document: {0}")]
    ContainerOpen(String),

    /// A rebuilt document could not be written.
    #[error("Failed to save '{}': {reason}", path.display())]
    Persist { path: PathBuf, reason: String },

    /// An output directory could not be created.
    #[error("Failed to create directory '{}': {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Raw asset bytes are not a recognizable raster image.
    #[error("Image decode error: {0}")]
    Decode(String),

    /// A decoded image could not be re-encoded.
    #[error("Image encode error: {0}")]
    Encode(String),

    /// Another run is already in flight on this pipeline.
    #[error("An extraction is already running")]
    Busy,

    /// The run was cancelled through its cancel token.
    #[error("Extraction cancelled")]
    Cancelled,

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from user input and was raised before any I/O.
    pub fn is_user_input(&self) -> bool {
        matches!(self, Error::InputValidation(_) | Error::UnsupportedFormat(_))
    }
}
