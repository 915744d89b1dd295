//! PDF backend for document extraction.
//!
//! Walks the page tree with `lopdf`: plain text per page and the image
//! XObjects each page references, resolved through the cross-reference table.

pub mod reader;

pub use reader::{PdfDocument, PdfReader};
