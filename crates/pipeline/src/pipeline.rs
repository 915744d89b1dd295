//! The extraction run: validate, sniff, read, assemble, extract images.

use crate::assemble::{AssemblyOptions, TextAssembler};
use crate::images::ImageExtractor;
use docex_core::{
    DocumentSource, Error, ErrorLog, ExtractionResult, ImageFormat, Result, ResultSink,
    SourceContent, SourceFormat,
};
use docex_docx::DocxReader;
use docex_pdf::PdfReader;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Name of the image folder inside the output directory.
pub const IMAGE_DIR_NAME: &str = "Images";

/// What the caller asked for, as entered.
///
/// Format and quality stay strings until validation so that bad input is
/// reported as a user error rather than a parse panic at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub image_format: String,
    pub image_quality: String,
}

impl ExtractionRequest {
    /// A request with PNG output at quality 100.
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            image_format: ImageFormat::default().to_string(),
            image_quality: "100".to_string(),
        }
    }

    pub fn with_image_format(mut self, format: impl Into<String>) -> Self {
        self.image_format = format.into();
        self
    }

    pub fn with_image_quality(mut self, quality: impl Into<String>) -> Self {
        self.image_quality = quality.into();
        self
    }

    /// Check the request without touching the filesystem.
    pub fn validate(&self) -> Result<ValidatedRequest> {
        if self.input.as_os_str().is_empty() {
            return Err(Error::InputValidation("No input file selected".to_string()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::InputValidation(
                "No output directory selected".to_string(),
            ));
        }

        let quality: i64 = self.image_quality.trim().parse().map_err(|_| {
            Error::InputValidation(format!(
                "Image quality must be a number, got {:?}",
                self.image_quality
            ))
        })?;
        if !(1..=100).contains(&quality) {
            return Err(Error::InputValidation(format!(
                "Image quality must be between 1 and 100, got {}",
                quality
            )));
        }

        Ok(ValidatedRequest {
            input: self.input.clone(),
            output_dir: self.output_dir.clone(),
            image_format: self.image_format.parse()?,
            image_quality: quality as u8,
        })
    }
}

/// A request whose settings have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub image_format: ImageFormat,
    pub image_quality: u8,
}

impl ValidatedRequest {
    fn stem(&self) -> String {
        self.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    pub fn styled_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_styled.docx", self.stem()))
    }

    pub fn plain_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_plain.docx", self.stem()))
    }

    pub fn image_dir(&self) -> PathBuf {
        self.output_dir.join(IMAGE_DIR_NAME)
    }
}

/// Where a pipeline is in its current or most recent run.
#[derive(Debug, Clone)]
pub enum PipelineState {
    Idle,
    Validating,
    Extracting,
    Done(Box<ExtractionResult>),
    Failed { message: String },
}

/// Cooperative cancellation flag, checked between stages and between images.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Clears the busy flag when a run ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs extractions one at a time.
pub struct ExtractionPipeline {
    log: Arc<dyn ErrorLog>,
    options: AssemblyOptions,
    busy: AtomicBool,
    state: Mutex<PipelineState>,
    cancel: CancelToken,
}

impl ExtractionPipeline {
    /// Create a pipeline that records errors in `log`.
    pub fn new(log: Arc<dyn ErrorLog>) -> Self {
        Self::with_options(log, AssemblyOptions::default())
    }

    pub fn with_options(log: Arc<dyn ErrorLog>, options: AssemblyOptions) -> Self {
        Self {
            log,
            options,
            busy: AtomicBool::new(false),
            state: Mutex::new(PipelineState::Idle),
            cancel: CancelToken::new(),
        }
    }

    /// State of the current or most recent run.
    pub fn state(&self) -> PipelineState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether a run is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Token that cancels the run in flight.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run one extraction to completion on the calling thread.
    ///
    /// The sink hears about the outcome before this returns. A call made while
    /// another run is in flight fails with [`Error::Busy`] and does nothing else.
    pub fn run(&self, request: &ExtractionRequest, sink: &dyn ResultSink) -> Result<ExtractionResult> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let err = Error::Busy;
            log::warn!("Rejected extraction of {}: {}", request.input.display(), err);
            sink.on_failure(&err, &err.to_string());
            return Err(err);
        }
        let _busy = BusyGuard(&self.busy);
        self.cancel.reset();

        self.set_state(PipelineState::Validating);
        let mut written = Vec::new();
        let outcome = request.validate().and_then(|validated| {
            self.set_state(PipelineState::Extracting);
            self.extract(&validated, sink, &mut written)
        });

        match outcome {
            Ok(result) => {
                log::info!(
                    "Extracted {} ({} of {} images)",
                    request.input.display(),
                    result.images_written,
                    result.images_attempted
                );
                self.set_state(PipelineState::Done(Box::new(result.clone())));
                sink.on_success(&result.text, &result);
                Ok(result)
            }
            Err(err) => {
                let message = failure_message(&err, &written);
                if err.is_user_input() {
                    log::warn!("{}", message);
                } else {
                    self.log.error(&format!(
                        "Extraction of '{}' failed: {}",
                        request.input.display(),
                        error_chain(&err)
                    ));
                }
                self.set_state(PipelineState::Failed {
                    message: message.clone(),
                });
                sink.on_failure(&err, &message);
                Err(err)
            }
        }
    }

    /// Run one extraction on a worker thread.
    pub fn spawn(
        self: &Arc<Self>,
        request: ExtractionRequest,
        sink: Arc<dyn ResultSink>,
    ) -> JoinHandle<Result<ExtractionResult>> {
        let pipeline = Arc::clone(self);
        thread::spawn(move || pipeline.run(&request, sink.as_ref()))
    }

    fn extract(
        &self,
        request: &ValidatedRequest,
        sink: &dyn ResultSink,
        written: &mut Vec<PathBuf>,
    ) -> Result<ExtractionResult> {
        let sniffed = SourceFormat::sniff(&request.input)?;
        let mut warnings = Vec::new();
        if let Some(warning) = sniffed.warning {
            sink.on_warning(&warning);
            warnings.push(warning);
        }

        self.cancel.check()?;
        let source = open_source(sniffed.format, &request.input)?;
        let content = source.content()?;
        let assembler = TextAssembler::new(self.options);

        self.cancel.check()?;
        let styled_path = match &content {
            SourceContent::Paragraphs(paragraphs) => {
                let path = request.styled_path();
                assembler.assemble_styled(paragraphs, &path)?;
                written.push(path.clone());
                Some(path)
            }
            SourceContent::Pages(_) => None,
        };

        self.cancel.check()?;
        let plain_path = request.plain_path();
        let text = assembler.assemble_plain(&content, &plain_path)?;
        written.push(plain_path.clone());

        self.cancel.check()?;
        let image_dir = request.image_dir();
        let extractor = ImageExtractor::new(
            request.image_format,
            request.image_quality,
            Arc::clone(&self.log),
        );
        let images = extractor.extract(source.image_assets(), &image_dir, &self.cancel)?;

        Ok(ExtractionResult {
            format: source.format(),
            styled_path,
            plain_path,
            image_dir,
            image_files: images.files,
            text,
            images_written: images.written,
            images_attempted: images.attempted,
            warnings,
        })
    }

    fn set_state(&self, next: PipelineState) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        log::debug!("Pipeline state: {:?}", next);
        *state = next;
    }
}

/// Open `path` with the reader for `format`.
fn open_source(format: SourceFormat, path: &Path) -> Result<Box<dyn DocumentSource>> {
    Ok(match format {
        SourceFormat::WordPackage => Box::new(DocxReader::new().open(path)?),
        SourceFormat::PageDocument => Box::new(PdfReader::new().open(path)?),
    })
}

/// User-facing summary of a failed run, listing artifacts already on disk.
fn failure_message(err: &Error, written: &[PathBuf]) -> String {
    let mut message = format!("Extraction failed: {}", err);
    if !written.is_empty() {
        let paths: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
        message.push_str(&format!(". Already written: {}", paths.join(", ")));
    }
    message
}

/// An error followed by each of its sources.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(&format!(": caused by: {}", cause));
        source = cause.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{page_document, png, word_package, THREE_PARAGRAPHS};
    use docex_core::{MemoryErrorLog, LEGACY_DOC_WARNING};
    use std::sync::mpsc;

    #[derive(Default)]
    struct RecordingSink {
        warnings: Mutex<Vec<String>>,
        successes: Mutex<Vec<String>>,
        failures: Mutex<Vec<String>>,
    }

    impl ResultSink for RecordingSink {
        fn on_warning(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }

        fn on_success(&self, text: &str, _result: &ExtractionResult) {
            self.successes.lock().unwrap().push(text.to_string());
        }

        fn on_failure(&self, _error: &Error, message: &str) {
            self.failures.lock().unwrap().push(message.to_string());
        }
    }

    /// Cancels the run as soon as it raises a warning.
    struct CancellingSink(CancelToken);

    impl ResultSink for CancellingSink {
        fn on_warning(&self, _message: &str) {
            self.0.cancel();
        }

        fn on_success(&self, _text: &str, _result: &ExtractionResult) {}

        fn on_failure(&self, _error: &Error, _message: &str) {}
    }

    /// Holds the run in `on_success` until released.
    struct BlockingSink {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ResultSink for BlockingSink {
        fn on_success(&self, _text: &str, _result: &ExtractionResult) {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }

        fn on_failure(&self, _error: &Error, _message: &str) {}
    }

    fn pipeline() -> (ExtractionPipeline, Arc<MemoryErrorLog>) {
        let log = Arc::new(MemoryErrorLog::new());
        (ExtractionPipeline::new(log.clone()), log)
    }

    fn five_images_one_truncated() -> Vec<Vec<u8>> {
        let mut truncated = png(6, 6);
        truncated.truncate(24);
        vec![png(2, 2), png(3, 3), truncated, png(4, 4), png(5, 5)]
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_word_document_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.docx");
        std::fs::write(
            &input,
            word_package(THREE_PARAGRAPHS, &five_images_one_truncated()),
        )
        .unwrap();
        let out = dir.path().join("out");

        let (pipeline, log) = pipeline();
        let sink = RecordingSink::default();
        let result = pipeline
            .run(&ExtractionRequest::new(&input, &out), &sink)
            .unwrap();

        assert_eq!(result.format, SourceFormat::WordPackage);
        assert_eq!(result.text, "First\nXY\nThird\n");
        assert_eq!(result.styled_path.as_deref(), Some(out.join("report_styled.docx").as_path()));
        assert_eq!(result.plain_path, out.join("report_plain.docx"));
        assert_eq!(result.primary_document(), out.join("report_styled.docx"));

        let styled = DocxReader::new().open(&out.join("report_styled.docx")).unwrap();
        let second = &styled.paragraphs()[1];
        assert_eq!(second.runs[0].text, "X");
        assert_eq!(second.runs[0].style.bold, Some(true));
        assert_ne!(second.runs[1].style.bold, Some(true));
        assert_eq!(styled.paragraphs()[0].style_id.as_deref(), Some("Heading1"));

        let plain = DocxReader::new().open(&out.join("report_plain.docx")).unwrap();
        let styled_text: Vec<String> = styled.paragraphs().iter().map(|p| p.text()).collect();
        let plain_text: Vec<String> = plain.paragraphs().iter().map(|p| p.text()).collect();
        assert_eq!(styled_text, plain_text);

        assert_eq!(result.images_attempted, 5);
        assert_eq!(result.images_written, 4);
        assert_eq!(result.images_failed(), 1);
        assert_eq!(
            files_in(&out.join("Images")),
            vec!["image_001.png", "image_002.png", "image_004.png", "image_005.png"]
        );

        let lines = log.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("#3"));

        assert!(matches!(pipeline.state(), PipelineState::Done(_)));
        assert_eq!(sink.successes.lock().unwrap().as_slice(), ["First\nXY\nThird\n"]);
        assert!(sink.failures.lock().unwrap().is_empty());
        assert!(!pipeline.is_busy());
    }

    #[test]
    fn test_rerun_gives_same_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("again.docx");
        std::fs::write(&input, word_package(THREE_PARAGRAPHS, &[png(2, 2), png(3, 3)])).unwrap();
        let out = dir.path().join("out");

        let (pipeline, _log) = pipeline();
        let sink = RecordingSink::default();
        let request = ExtractionRequest::new(&input, &out).with_image_format("jpeg");

        let first = pipeline.run(&request, &sink).unwrap();
        let second = pipeline
            .run(&request.clone().with_image_quality("20"), &sink)
            .unwrap();

        assert_eq!(first.image_files, second.image_files);
        assert_eq!(files_in(&out.join("Images")), vec!["image_001.jpeg", "image_002.jpeg"]);
    }

    #[test]
    fn test_page_document_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.pdf");
        std::fs::write(&input, page_document()).unwrap();
        let out = dir.path().join("out");

        let (pipeline, log) = pipeline();
        let result = pipeline
            .run(&ExtractionRequest::new(&input, &out), &RecordingSink::default())
            .unwrap();

        assert_eq!(result.format, SourceFormat::PageDocument);
        assert!(result.styled_path.is_none());
        assert!(!out.join("scan_styled.docx").exists());
        assert_eq!(result.primary_document(), out.join("scan_plain.docx"));
        assert!(result.text.contains("Hello World!"));
        assert!(result.text.ends_with('\n'));

        let plain = DocxReader::new().open(&result.plain_path).unwrap();
        assert_eq!(plain.paragraphs().len(), 1);

        assert_eq!((result.images_written, result.images_attempted), (2, 2));
        assert_eq!(
            files_in(&out.join("Images")),
            vec!["image_1_001.png", "image_2_001.png"]
        );
        assert!(log.lines().is_empty());
    }

    #[test]
    fn test_corrupt_container_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.docx");
        std::fs::write(&input, b"definitely not a zip archive").unwrap();
        let out = dir.path().join("out");

        let (pipeline, log) = pipeline();
        let sink = RecordingSink::default();
        let err = pipeline
            .run(&ExtractionRequest::new(&input, &out), &sink)
            .unwrap_err();

        assert!(matches!(err, Error::ContainerOpen(_)));
        assert!(!out.exists());
        assert_eq!(log.lines().len(), 1);
        assert!(log.lines()[0].contains("broken.docx"));
        assert!(matches!(pipeline.state(), PipelineState::Failed { .. }));
        assert_eq!(sink.failures.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_non_numeric_quality_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.docx");
        std::fs::write(&input, word_package(THREE_PARAGRAPHS, &[])).unwrap();
        let out = dir.path().join("out");

        let (pipeline, log) = pipeline();
        let err = pipeline
            .run(
                &ExtractionRequest::new(&input, &out).with_image_quality("abc"),
                &RecordingSink::default(),
            )
            .unwrap_err();

        assert!(matches!(err, Error::InputValidation(_)));
        assert!(!out.exists());
        assert!(log.lines().is_empty());
        match pipeline.state() {
            PipelineState::Failed { message } => assert!(message.contains("abc")),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_request_validation() {
        let ok = ExtractionRequest::new("a.pdf", "out")
            .with_image_format("bmp")
            .with_image_quality(" 55 ")
            .validate()
            .unwrap();
        assert_eq!(ok.image_format, ImageFormat::Bmp);
        assert_eq!(ok.image_quality, 55);
        assert_eq!(ok.plain_path(), Path::new("out/a_plain.docx"));
        assert_eq!(ok.image_dir(), Path::new("out/Images"));

        for request in [
            ExtractionRequest::new("", "out"),
            ExtractionRequest::new("a.pdf", ""),
            ExtractionRequest::new("a.pdf", "out").with_image_quality("0"),
            ExtractionRequest::new("a.pdf", "out").with_image_quality("101"),
            ExtractionRequest::new("a.pdf", "out").with_image_format("gif"),
        ] {
            assert!(matches!(request.validate(), Err(Error::InputValidation(_))));
        }
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let (pipeline, log) = pipeline();
        let err = pipeline
            .run(
                &ExtractionRequest::new(dir.path().join("notes.txt"), &out),
                &RecordingSink::default(),
            )
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert!(!out.exists());
        assert!(log.lines().is_empty());
    }

    #[test]
    fn test_legacy_extension_warns_and_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("old.doc");
        std::fs::write(&input, word_package(THREE_PARAGRAPHS, &[])).unwrap();

        let (pipeline, _log) = pipeline();
        let sink = RecordingSink::default();
        let result = pipeline
            .run(&ExtractionRequest::new(&input, dir.path().join("out")), &sink)
            .unwrap();

        assert_eq!(sink.warnings.lock().unwrap().as_slice(), [LEGACY_DOC_WARNING]);
        assert_eq!(result.warnings, vec![LEGACY_DOC_WARNING.to_string()]);
        assert_eq!(result.images_attempted, 0);
    }

    #[test]
    fn test_persist_failure_discloses_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.docx");
        std::fs::write(&input, word_package(THREE_PARAGRAPHS, &[])).unwrap();
        let out = dir.path().join("out");
        // A directory where the plain document should go.
        std::fs::create_dir_all(out.join("report_plain.docx")).unwrap();

        let (pipeline, log) = pipeline();
        let sink = RecordingSink::default();
        let err = pipeline
            .run(&ExtractionRequest::new(&input, &out), &sink)
            .unwrap_err();

        assert!(matches!(err, Error::Persist { .. }));
        assert!(out.join("report_styled.docx").is_file());
        let failures = sink.failures.lock().unwrap();
        assert!(failures[0].contains("report_styled.docx"));
        assert_eq!(log.lines().len(), 1);
    }

    #[test]
    fn test_cancel_between_stages() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("old.doc");
        std::fs::write(&input, word_package(THREE_PARAGRAPHS, &[png(2, 2)])).unwrap();
        let out = dir.path().join("out");

        let (pipeline, _log) = pipeline();
        let sink = CancellingSink(pipeline.cancel_token());
        let err = pipeline
            .run(&ExtractionRequest::new(&input, &out), &sink)
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(!out.exists());
    }

    #[test]
    fn test_second_run_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("report.docx");
        std::fs::write(&input, word_package(THREE_PARAGRAPHS, &[])).unwrap();
        let request = ExtractionRequest::new(&input, dir.path().join("out"));

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let blocking = Arc::new(BlockingSink {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });

        let log = Arc::new(MemoryErrorLog::new());
        let pipeline = Arc::new(ExtractionPipeline::new(log));
        let worker = pipeline.spawn(request.clone(), blocking);

        entered_rx.recv().unwrap();
        assert!(pipeline.is_busy());

        let sink = RecordingSink::default();
        let err = pipeline.run(&request, &sink).unwrap_err();
        assert!(matches!(err, Error::Busy));
        assert_eq!(sink.failures.lock().unwrap().len(), 1);

        release_tx.send(()).unwrap();
        let result = worker.join().unwrap().unwrap();
        assert_eq!(result.text, "First\nXY\nThird\n");
        assert!(!pipeline.is_busy());

        // The pipeline is reusable once idle again.
        assert!(pipeline.run(&request, &sink).is_ok());
    }

    #[test]
    fn test_error_chain_walks_sources() {
        let err = Error::DirectoryCreate {
            path: PathBuf::from("out/Images"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let chain = error_chain(&err);
        assert!(chain.starts_with("Failed to create directory"));
        assert!(chain.ends_with("caused by: denied"));
    }
}
