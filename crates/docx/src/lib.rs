//! DOCX (Office Open XML) backend for document extraction.
//!
//! Reads .docx packages (ZIP archives of XML parts) into styled paragraphs and
//! image assets, and writes rebuilt documents back out as .docx.

pub mod body;
pub mod package;
pub mod reader;
pub mod writer;

pub use reader::{DocxDocument, DocxReader};
pub use writer::DocxWriter;
