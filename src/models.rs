//! Core data models for the tutoring pipeline.
//!
//! These types represent the documents, courses, and enrollments that flow
//! through ingestion and the per-student context lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared format of an uploaded document.
///
/// Determined once at upload time and carried as metadata; pipeline stages
/// dispatch on this tag instead of re-sniffing filename suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentFormat {
    Pdf,
    SlideDeck,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::SlideDeck => "slide-deck",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(DocumentFormat::Pdf),
            "slide-deck" => Some(DocumentFormat::SlideDeck),
            _ => None,
        }
    }

    /// Guess a format from a filename, for the upload boundary only.
    /// The extension match is case-insensitive.
    pub fn from_filename(name: &str) -> Option<Self> {
        match name.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()) {
            Some(ext) if ext == "pdf" => Some(DocumentFormat::Pdf),
            Some(ext) if ext == "pptx" => Some(DocumentFormat::SlideDeck),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::SlideDeck => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata row for an uploaded document. Bytes live in the object store
/// under `object_key`; the row owns the format tag and content hash.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub course_id: i64,
    pub filename: String,
    pub format: DocumentFormat,
    pub object_key: String,
    pub size: i64,
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A course owned by a proctor's namespace. `context` is NULL until the
/// first training run assembles it.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: i64,
    pub proctor_id: i64,
    pub name: String,
    pub context: Option<String>,
    pub trained_at: Option<DateTime<Utc>>,
}

/// A student's enrollment in a course, with its independently evolving
/// learned context.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub student_id: i64,
    pub course_id: i64,
    pub learned_context: String,
    pub seeded_at: DateTime<Utc>,
}

/// Outcome of a tutoring turn.
///
/// `dirty` is set when the answer was produced but the updated context could
/// not be persisted; callers must surface that degradation.
#[derive(Debug, Clone)]
pub struct TutorAnswer {
    pub answer: String,
    pub dirty: bool,
}

/// A document skipped during corpus assembly, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub filename: String,
    pub reason: String,
}

/// Result of a training run over a course's document set.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub documents_ingested: u64,
    pub ocr_fallbacks: u64,
    pub skipped: Vec<SkippedDocument>,
    pub context_chars: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_round_trips_through_str() {
        for f in [DocumentFormat::Pdf, DocumentFormat::SlideDeck] {
            assert_eq!(DocumentFormat::parse(f.as_str()), Some(f));
        }
        assert_eq!(DocumentFormat::parse("docx"), None);
    }

    #[test]
    fn format_from_filename() {
        assert_eq!(
            DocumentFormat::from_filename("week1.pdf"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_filename("intro.pptx"),
            Some(DocumentFormat::SlideDeck)
        );
        assert_eq!(DocumentFormat::from_filename("notes.txt"), None);
    }

    #[test]
    fn format_from_filename_ignores_extension_case() {
        assert_eq!(
            DocumentFormat::from_filename("Week1.PDF"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_filename("Intro.PpTx"),
            Some(DocumentFormat::SlideDeck)
        );
    }
}
