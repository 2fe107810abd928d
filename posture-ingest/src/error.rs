use posture_db::DbError;
use posture_extract::ExtractError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Unrecognized extension — fatal for the file, no retry.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    /// A structured decoder could not parse the declared format.
    #[error("malformed {format} input: {message}")]
    MalformedInput {
        format: &'static str,
        message: String,
    },
    /// The external extraction service failed; retryable by the caller.
    #[error("extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractError),
    /// Store write failure; surfaced, sibling files continue.
    #[error("persistence error: {0}")]
    Persistence(#[from] DbError),
}
