//! Seams between the extraction pipeline and its collaborators.

use crate::error::{Error, Result};
use crate::format::SourceFormat;
use crate::types::{ExtractionResult, ImageAsset, SourceContent};

/// Lazy, finite sequence of image assets in discovery order.
pub type ImageAssets<'a> = Box<dyn Iterator<Item = Result<ImageAsset>> + 'a>;

/// An opened document that can hand out its text and its embedded images.
///
/// Implemented once per container format; the pipeline picks an
/// implementation after sniffing and never branches on format again.
pub trait DocumentSource {
    /// Format of the underlying container.
    fn format(&self) -> SourceFormat;

    /// Text content: styled paragraphs or plain page texts.
    fn content(&self) -> Result<SourceContent>;

    /// Embedded images. Each call starts a fresh pass over the container.
    ///
    /// An `Err` item describes one asset that could not be read; it counts as
    /// an attempted image and does not end the sequence.
    fn image_assets(&self) -> ImageAssets<'_>;
}

/// Receives the outcome of a pipeline run; typically a front end.
pub trait ResultSink: Send + Sync {
    /// A non-fatal notice the user should see, e.g. a legacy-format warning.
    fn on_warning(&self, message: &str) {
        log::warn!("{message}");
    }

    /// The run completed. `text` is the flattened text for preview.
    fn on_success(&self, text: &str, result: &ExtractionResult);

    /// The run failed. `message` is the user-facing summary.
    fn on_failure(&self, error: &Error, message: &str);
}
