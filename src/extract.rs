/// Text extraction seam.
///
/// Byte-level format parsers (PDF, DOCX, ...) live outside the engine; they
/// plug in through `TextExtractor` and are selected by file extension. Only
/// the plain-text extractor ships here.
use std::path::Path;

use crate::error::{EngineError, Result};

/// Turns a file into plain text. Implementations are selected by extension
/// and must fail with `ExtractionFailure` when the file has no usable text
/// layer (e.g. a scanned PDF).
pub trait TextExtractor: Send + Sync {
    /// Lowercase extensions this extractor handles, without the dot.
    fn extensions(&self) -> &[&'static str];

    fn extract(&self, path: &Path) -> Result<String>;
}

/// Extractor for plain text formats.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extensions(&self) -> &[&'static str] {
        &["txt", "md", "text"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .map_err(|e| EngineError::ExtractionFailure(format!("{}: {e}", path.display())))
    }
}

/// Registry of extractors keyed by extension.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Empty registry; useful when every format is registered externally.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Registry with the built-in plain-text extractor.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PlainTextExtractor));
        registry
    }

    pub fn register(&mut self, extractor: Box<dyn TextExtractor>) {
        self.extractors.push(extractor);
    }

    /// Select an extractor for a lowercase extension, or fail with
    /// `UnsupportedFormat`. Used by the pipeline before any side effects.
    pub fn select(&self, extension: &str) -> Result<&dyn TextExtractor> {
        self.extractors
            .iter()
            .find(|e| e.extensions().contains(&extension))
            .map(AsRef::as_ref)
            .ok_or_else(|| EngineError::UnsupportedFormat(extension.to_string()))
    }

    /// Whether any registered extractor handles the extension.
    #[must_use]
    pub fn supports(&self, extension: &str) -> bool {
        self.extractors
            .iter()
            .any(|e| e.extensions().contains(&extension))
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_plain_text_extraction() {
        let mut file = tempfile::NamedTempFile::with_suffix(".txt").unwrap();
        write!(file, "hello from a text file").unwrap();

        let registry = ExtractorRegistry::with_defaults();
        let extractor = registry.select("txt").unwrap();
        let text = extractor.extract(file.path()).unwrap();
        assert_eq!(text, "hello from a text file");
    }

    #[test]
    fn test_unsupported_extension() {
        let registry = ExtractorRegistry::with_defaults();
        let err = registry.select("xlsx").err().unwrap();
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
        assert!(!registry.supports("xlsx"));
        assert!(registry.supports("md"));
    }

    #[test]
    fn test_extraction_failure_on_missing_file() {
        let registry = ExtractorRegistry::with_defaults();
        let extractor = registry.select("txt").unwrap();
        let err = extractor.extract(Path::new("/nonexistent/file.txt")).unwrap_err();
        assert!(matches!(err, EngineError::ExtractionFailure(_)));
    }

    #[test]
    fn test_external_registration() {
        struct FakePdf;
        impl TextExtractor for FakePdf {
            fn extensions(&self) -> &[&'static str] {
                &["pdf"]
            }
            fn extract(&self, _path: &Path) -> Result<String> {
                Err(EngineError::ExtractionFailure("no text layer".into()))
            }
        }

        let mut registry = ExtractorRegistry::with_defaults();
        registry.register(Box::new(FakePdf));
        assert!(registry.supports("pdf"));

        // A registered extractor can still report an unreadable document
        let err = registry
            .select("pdf")
            .unwrap()
            .extract(Path::new("/scan.pdf"))
            .unwrap_err();
        assert!(matches!(err, EngineError::ExtractionFailure(_)));
    }
}
