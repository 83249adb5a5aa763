//! Converter adapter: typed bytes in, normalized text out.
//!
//! Text content passes straight through with lossy UTF-8 decoding; text is
//! best-effort and never blocks the pipeline. Every other recognized kind is
//! written to a uniquely named temporary artifact carrying the correct
//! extension and handed to the external converter command. The artifact
//! guard removes the file on every exit path, success or failure.

use std::io::Write;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use refsync_shared::kinds::{self, FileKind};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Normalized text produced by a successful conversion.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    pub text: String,
}

/// A failed conversion, with the root cause preserved for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum ConvertFailure {
    /// The content matched no known document family.
    #[error("unsupported format")]
    UnsupportedFormat,

    /// The converter ran but produced nothing usable.
    #[error("conversion produced no content")]
    NoContent,

    /// The external converter failed; `cause` chains the tool's own report.
    #[error("converter failed: {reason}")]
    Tool {
        reason: String,
        cause: Option<String>,
    },

    /// Writing the temporary artifact failed.
    #[error("artifact I/O failed: {0}")]
    Artifact(#[from] std::io::Error),
}

impl ConvertFailure {
    /// Full diagnostic text, including the chained cause when present.
    pub fn detail(&self) -> String {
        match self {
            Self::Tool {
                reason,
                cause: Some(cause),
            } => format!("converter failed: {reason}\ncause: {cause}"),
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Extractor seam
// ---------------------------------------------------------------------------

/// External text-extraction capability, invoked on an artifact path.
pub trait Extractor: Send + Sync {
    /// Extract normalized text from the artifact at `path`.
    fn extract(&self, path: &Path) -> Result<String, ConvertFailure>;
}

/// Runs the configured converter command on the artifact and captures stdout.
pub struct CommandExtractor {
    program: String,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Extractor for CommandExtractor {
    fn extract(&self, path: &Path) -> Result<String, ConvertFailure> {
        let output = Command::new(&self.program)
            .arg(path)
            .output()
            .map_err(|e| ConvertFailure::Tool {
                reason: format!("failed to run '{}'", self.program),
                cause: Some(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ConvertFailure::Tool {
                reason: format!("'{}' exited with status {}", self.program, output.status),
                cause: if stderr.is_empty() { None } else { Some(stderr) },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Dispatches classified content to the right conversion path.
pub struct Converter {
    extractor: Box<dyn Extractor>,
}

impl Converter {
    pub fn new(extractor: Box<dyn Extractor>) -> Self {
        Self { extractor }
    }

    /// Convert raw content into normalized text.
    pub fn convert(
        &self,
        bytes: &[u8],
        claimed_content_type: Option<&str>,
    ) -> Result<ConvertResult, ConvertFailure> {
        let Some(kind) = kinds::classify(bytes, claimed_content_type) else {
            return Err(ConvertFailure::UnsupportedFormat);
        };
        debug!(?kind, len = bytes.len(), "dispatching conversion");

        if kind == FileKind::Text {
            // Best-effort text: undecodable sequences are replaced, never fatal.
            return Ok(ConvertResult {
                text: String::from_utf8_lossy(bytes).into_owned(),
            });
        }

        let extension = kinds::resolve_extension(bytes, claimed_content_type)
            .unwrap_or(kind.spec().extensions[0]);

        // The guard owns the artifact: dropping it removes the file on every
        // exit path out of this function.
        let mut artifact = tempfile::Builder::new()
            .prefix("refsync-")
            .suffix(extension)
            .tempfile()?;
        artifact.write_all(bytes)?;
        debug!(artifact = %artifact.path().display(), "wrote conversion artifact");

        let text = self.extractor.extract(artifact.path())?;
        if text.trim().is_empty() {
            return Err(ConvertFailure::NoContent);
        }

        Ok(ConvertResult { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// What a fake extractor observed about its artifact.
    #[derive(Debug, Default)]
    struct Observed {
        path: Option<PathBuf>,
        existed_during_extract: bool,
    }

    /// Fake extractor that records the artifact path and returns a canned
    /// response.
    struct FakeExtractor {
        observed: Arc<Mutex<Observed>>,
        response: Result<String, String>,
    }

    impl FakeExtractor {
        fn returning(text: &str) -> (Self, Arc<Mutex<Observed>>) {
            let observed = Arc::new(Mutex::new(Observed::default()));
            (
                Self {
                    observed: observed.clone(),
                    response: Ok(text.to_string()),
                },
                observed,
            )
        }

        fn failing(reason: &str) -> (Self, Arc<Mutex<Observed>>) {
            let observed = Arc::new(Mutex::new(Observed::default()));
            (
                Self {
                    observed: observed.clone(),
                    response: Err(reason.to_string()),
                },
                observed,
            )
        }
    }

    impl Extractor for FakeExtractor {
        fn extract(&self, path: &Path) -> Result<String, ConvertFailure> {
            let mut observed = self.observed.lock().unwrap();
            observed.path = Some(path.to_path_buf());
            observed.existed_during_extract = path.exists();

            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(reason) => Err(ConvertFailure::Tool {
                    reason: reason.clone(),
                    cause: Some("root cause detail".into()),
                }),
            }
        }
    }

    #[test]
    fn text_passes_through_lossily() {
        let (fake, observed) = FakeExtractor::returning("never used");
        let converter = Converter::new(Box::new(fake));

        let bytes = b"caf\xC3\xA9 and caf\xE9"; // valid then invalid UTF-8
        let result = converter
            .convert(bytes, Some("text/plain"))
            .expect("text conversion");

        assert!(result.text.starts_with("café and caf"));
        assert!(result.text.contains('\u{FFFD}'));
        // Text never touches the extractor or the filesystem.
        assert!(observed.lock().unwrap().path.is_none());
    }

    #[test]
    fn unknown_content_is_unsupported() {
        let (fake, _) = FakeExtractor::returning("never used");
        let converter = Converter::new(Box::new(fake));

        let err = converter.convert(b"\x00\x01\x02", None).unwrap_err();
        assert!(matches!(err, ConvertFailure::UnsupportedFormat));
        assert_eq!(err.detail(), "unsupported format");
    }

    #[test]
    fn docx_artifact_gets_the_resolved_extension() {
        let (fake, observed) = FakeExtractor::returning("# Report\n\nbody");
        let converter = Converter::new(Box::new(fake));

        let bytes = b"PK\x03\x04zipped document bytes";
        let ct = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
        let result = converter.convert(bytes, Some(ct)).expect("docx conversion");
        assert_eq!(result.text, "# Report\n\nbody");

        let observed = observed.lock().unwrap();
        let artifact = observed.path.as_ref().expect("extractor invoked");
        assert!(artifact.to_string_lossy().ends_with(".docx"));
        assert!(observed.existed_during_extract);
        // Cleanup invariant: the artifact is gone once convert returns.
        assert!(!artifact.exists());
    }

    #[test]
    fn pdf_artifact_uses_kind_default_extension() {
        let (fake, observed) = FakeExtractor::returning("pdf text");
        let converter = Converter::new(Box::new(fake));

        converter
            .convert(b"%PDF-1.7 content", None)
            .expect("pdf conversion");

        let observed = observed.lock().unwrap();
        let artifact = observed.path.as_ref().unwrap();
        assert!(artifact.to_string_lossy().ends_with(".pdf"));
        assert!(!artifact.exists());
    }

    #[test]
    fn tool_failure_is_cleaned_up_and_keeps_cause() {
        let (fake, observed) = FakeExtractor::failing("parser exploded");
        let converter = Converter::new(Box::new(fake));

        let err = converter
            .convert(b"%PDF-1.7 content", None)
            .unwrap_err();

        let detail = err.detail();
        assert!(detail.contains("parser exploded"));
        assert!(detail.contains("root cause detail"));

        let observed = observed.lock().unwrap();
        assert!(!observed.path.as_ref().unwrap().exists());
    }

    #[test]
    fn empty_output_is_no_content() {
        let (fake, observed) = FakeExtractor::returning("   \n\t ");
        let converter = Converter::new(Box::new(fake));

        let err = converter
            .convert(b"%PDF-1.7 content", None)
            .unwrap_err();
        assert!(matches!(err, ConvertFailure::NoContent));
        assert_eq!(err.detail(), "conversion produced no content");

        let observed = observed.lock().unwrap();
        assert!(!observed.path.as_ref().unwrap().exists());
    }

    #[test]
    fn command_extractor_reports_missing_program() {
        let extractor = CommandExtractor::new("refsync-test-no-such-binary");
        let err = extractor
            .extract(Path::new("/tmp/whatever.pdf"))
            .unwrap_err();

        match err {
            ConvertFailure::Tool { reason, cause } => {
                assert!(reason.contains("failed to run"));
                assert!(cause.is_some());
            }
            other => panic!("expected tool failure, got {other:?}"),
        }
    }
}
