//! Extraction pipeline: turns a DOCX or PDF into rebuilt documents, flattened
//! text and re-encoded image files.

pub mod assemble;
pub mod images;
pub mod pipeline;

#[cfg(test)]
mod test_support;

pub use assemble::{AssemblyOptions, TextAssembler};
pub use images::{ImageError, ImageExtractor, ImageOutcome};
pub use pipeline::{
    CancelToken, ExtractionPipeline, ExtractionRequest, PipelineState, ValidatedRequest,
    IMAGE_DIR_NAME,
};
