//! Rebuilds extracted text into styled and plain documents.

use docex_core::{Paragraph, RebuiltDocument, Result, Run, SourceContent};
use docex_docx::DocxWriter;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How rebuilt documents are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyOptions {
    /// Insert a blank paragraph after every paragraph of the styled document.
    pub separate_paragraphs: bool,
}

/// Turns reader output into rebuilt documents plus flattened text.
#[derive(Debug, Default)]
pub struct TextAssembler {
    options: AssemblyOptions,
    writer: DocxWriter,
}

impl TextAssembler {
    pub fn new(options: AssemblyOptions) -> Self {
        Self {
            options,
            writer: DocxWriter::new(),
        }
    }

    /// Copy every paragraph and run with its formatting.
    ///
    /// Unset run properties stay unset so they keep inheriting from the
    /// paragraph style.
    pub fn build_styled(&self, paragraphs: &[Paragraph]) -> (RebuiltDocument, String) {
        let mut document = RebuiltDocument::new();
        let mut text = String::new();

        for source in paragraphs {
            let mut paragraph = Paragraph::new();
            paragraph.style_id = source.style_id.clone();
            for run in &source.runs {
                paragraph.add_run(Run::styled(run.text.clone(), run.style.clone()));
                text.push_str(&run.text);
            }
            text.push('\n');
            document.add_paragraph(paragraph);

            if self.options.separate_paragraphs {
                document.add_paragraph(Paragraph::new());
            }
        }

        (document, text)
    }

    /// Keep only raw text.
    ///
    /// Word sources give one paragraph per source paragraph. Page sources give
    /// a single paragraph holding every page, each followed by a newline.
    pub fn build_plain(&self, content: &SourceContent) -> (RebuiltDocument, String) {
        let mut document = RebuiltDocument::new();
        let mut text = String::new();

        match content {
            SourceContent::Paragraphs(paragraphs) => {
                for source in paragraphs {
                    let raw = source.text();
                    text.push_str(&raw);
                    text.push('\n');
                    document.add_paragraph(Paragraph::from_text(raw));
                }
            }
            SourceContent::Pages(pages) => {
                for page in pages {
                    text.push_str(page);
                    text.push('\n');
                }
                document.add_paragraph(Paragraph::from_text(text.clone()));
            }
        }

        (document, text)
    }

    /// Build and save the styled document; returns the flattened text.
    pub fn assemble_styled(&self, paragraphs: &[Paragraph], path: &Path) -> Result<String> {
        let (document, text) = self.build_styled(paragraphs);
        self.writer.write(&document, path)?;
        log::debug!(
            "Saved styled document {} ({} paragraphs)",
            path.display(),
            document.paragraphs.len()
        );
        Ok(text)
    }

    /// Build and save the plain document; returns the flattened text.
    pub fn assemble_plain(&self, content: &SourceContent, path: &Path) -> Result<String> {
        let (document, text) = self.build_plain(content);
        self.writer.write(&document, path)?;
        log::debug!("Saved plain document {}", path.display());
        Ok(text)
    }
}
