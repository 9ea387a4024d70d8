//! Error taxonomy for the tutoring core.
//!
//! Extraction and storage failures are kept as distinct variants so callers
//! can map them to user-facing outcomes (4xx-style for data-model violations,
//! 5xx-style for upstream/model failures). A failed model call is always an
//! error variant, never a string masquerading as a tutor answer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    /// Malformed document. Not retried; the offending filename travels with
    /// the error so training callers can report it.
    #[error("failed to decode '{filename}': {reason}")]
    Decode { filename: String, reason: String },

    /// OCR engine or runtime failure during the fallback path.
    #[error("OCR failed: {0}")]
    Ocr(String),

    /// Course does not exist or has never been trained.
    #[error("course context not found")]
    NotFound,

    /// No enrollment row for the (student, course) pair.
    #[error("student is not enrolled in this course")]
    NotEnrolled,

    /// Enrollment already exists; re-seeding requires an explicit reset.
    #[error("enrollment already exists")]
    Conflict,

    /// Upstream language-model call failed or timed out.
    #[error("model endpoint unavailable: {0}")]
    ModelUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = TutorError> = std::result::Result<T, E>;
