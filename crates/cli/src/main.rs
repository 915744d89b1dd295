//! CLI tool for extracting text and images from DOCX and PDF files.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use docex_core::{Error, ExtractionResult, FileErrorLog, ResultSink, DEFAULT_LOG_FILE};
use docex_pipeline::{AssemblyOptions, ExtractionPipeline, ExtractionRequest};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extract text and images from a Word (.docx) or PDF document.
#[derive(Parser, Debug)]
#[command(name = "docex")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input document (.docx, .doc or .pdf)
    input: PathBuf,

    /// Output directory for rebuilt documents and the Images folder
    #[arg(short, long)]
    output: PathBuf,

    /// Image output format: PNG, JPEG or BMP
    #[arg(short, long, default_value = "PNG")]
    format: String,

    /// Image quality from 1 to 100 (JPEG only)
    #[arg(short, long, default_value = "100")]
    quality: String,

    /// Insert a blank paragraph after each paragraph of the styled document
    #[arg(long)]
    separate_paragraphs: bool,

    /// Error log file, appended to
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Save the extracted text to this file
    #[arg(long)]
    preview_out: Option<PathBuf>,

    /// Print the result as JSON to stdout
    #[arg(long)]
    json: bool,

    /// Print the extracted text to stdout
    #[arg(short, long)]
    print: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Reports pipeline outcomes on the terminal.
struct TerminalSink {
    verbose: bool,
}

impl ResultSink for TerminalSink {
    fn on_warning(&self, message: &str) {
        eprintln!("Warning: {}", message);
    }

    fn on_success(&self, _text: &str, result: &ExtractionResult) {
        eprintln!("Extraction completed successfully.");
        eprintln!("  Text saved to: {}", result.primary_document().display());
        eprintln!(
            "  Images saved to: {} ({} of {} written)",
            result.image_dir.display(),
            result.images_written,
            result.images_attempted
        );
        if result.images_failed() > 0 {
            eprintln!("  Failed images are listed in the error log.");
        }
        if self.verbose {
            if let Some(styled) = &result.styled_path {
                eprintln!("  Plain text copy: {}", result.plain_path.display());
                eprintln!("  Styled copy: {}", styled.display());
            }
            for file in &result.image_files {
                eprintln!("    {}", file.display());
            }
        }
    }

    fn on_failure(&self, _error: &Error, message: &str) {
        eprintln!("Error: {}", message);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let log = FileErrorLog::open(&args.log_file)
        .with_context(|| format!("Failed to open log file {}", args.log_file.display()))?;
    let pipeline = Arc::new(ExtractionPipeline::with_options(
        Arc::new(log),
        AssemblyOptions {
            separate_paragraphs: args.separate_paragraphs,
        },
    ));

    let request = ExtractionRequest::new(&args.input, &args.output)
        .with_image_format(args.format.as_str())
        .with_image_quality(args.quality.as_str());

    if args.verbose {
        eprintln!("Processing: {}", args.input.display());
    }

    let sink = Arc::new(TerminalSink {
        verbose: args.verbose,
    });
    let result = match pipeline
        .spawn(request, sink)
        .join()
        .map_err(|_| anyhow!("Extraction worker panicked"))?
    {
        Ok(result) => result,
        // Already reported by the sink.
        Err(_) => std::process::exit(1),
    };

    if let Some(path) = &args.preview_out {
        write_output(path, &result.text)?;
        if args.verbose {
            eprintln!("Written to: {}", path.display());
        }
    }

    if args.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        println!("{}", json);
    } else if args.print {
        print!("{}", result.text);
    }

    Ok(())
}

/// Write output to a file.
fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;

    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write to {}", path.display()))?;

    Ok(())
}
