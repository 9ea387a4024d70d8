//! # Course Tutor CLI (`tutor`)
//!
//! The `tutor` binary drives the course lifecycle end to end: database
//! initialization, course and document management, training, enrollment,
//! and tutoring turns.
//!
//! ## Usage
//!
//! ```bash
//! tutor --config ./config/tutor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tutor init` | Create the SQLite database and run schema migrations |
//! | `tutor course add <name>` | Register a course under a proctor |
//! | `tutor upload <course> <file>` | Upload a PDF or PPTX document |
//! | `tutor docs <course>` | List a course's documents |
//! | `tutor remove <course> <filename>` | Remove a document |
//! | `tutor train <course>` | Assemble the course context from its documents |
//! | `tutor enroll <student> <course>` | Seed a student's learned context |
//! | `tutor reset <student> <course>` | Re-copy the course context over a student's |
//! | `tutor ask <student> <course> "<question>"` | Run one tutoring turn |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use course_tutor::catalog::Catalog;
use course_tutor::config::{self, Config};
use course_tutor::context_store::{ContextStore, SqliteContextStore};
use course_tutor::corpus::CorpusAssembler;
use course_tutor::model::OpenAiChatClient;
use course_tutor::models::DocumentFormat;
use course_tutor::ocr::TesseractEngine;
use course_tutor::storage::{FsObjectStore, ObjectStore, S3ObjectStore};
use course_tutor::tutor::TutorSession;
use course_tutor::{db, migrate};

/// Course Tutor CLI — document ingestion and per-student tutoring contexts.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tutor.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tutor",
    about = "Course Tutor — course-material ingestion and AI tutoring backend",
    version,
    long_about = "Course Tutor ingests course documents (PDF and PowerPoint), assembles them \
    into a per-course tutor context with an OCR fallback for scanned PDFs, and runs tutoring \
    turns against each enrolled student's own diverging copy of that context."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tutor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Manage courses.
    Course {
        #[command(subcommand)]
        action: CourseAction,
    },

    /// Upload a document to a course.
    ///
    /// The format is decided from the filename suffix (`.pdf` or `.pptx`)
    /// at upload time. Re-uploading the same filename replaces it.
    Upload {
        /// Course id.
        course: i64,
        /// Path to the document file.
        file: PathBuf,
    },

    /// List a course's documents.
    Docs {
        /// Course id.
        course: i64,
    },

    /// Remove a document from a course.
    Remove {
        /// Course id.
        course: i64,
        /// Filename as shown by `tutor docs`.
        filename: String,
    },

    /// Assemble the course context from its uploaded documents.
    ///
    /// Extracts text from every document (falling back to OCR for scanned
    /// PDFs), concatenates the results behind the tutor persona preamble,
    /// and persists it as the course context. Re-running fully replaces
    /// the previous context; enrolled students keep their own copies.
    Train {
        /// Course id.
        course: i64,
    },

    /// Enroll a student: copy the course context into their own.
    Enroll {
        /// Student id.
        student: i64,
        /// Course id.
        course: i64,
    },

    /// Reset a student's context to the current course context.
    Reset {
        /// Student id.
        student: i64,
        /// Course id.
        course: i64,
    },

    /// Ask the tutor one question as a student.
    ///
    /// The exchange is appended to the student's learned context so later
    /// questions see the full conversation history.
    Ask {
        /// Student id.
        student: i64,
        /// Course id.
        course: i64,
        /// The question text.
        question: String,
    },
}

/// Course management subcommands.
#[derive(Subcommand)]
enum CourseAction {
    /// Register a new course under a proctor.
    Add {
        /// Course name, unique per proctor.
        name: String,
        /// Proctor id owning the course.
        #[arg(long, default_value_t = 1)]
        proctor: i64,
    },
}

fn build_store(cfg: &Config) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match cfg.storage.backend.as_str() {
        "fs" => {
            let fs = cfg
                .storage
                .fs
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("[storage.fs] section missing"))?;
            Ok(Arc::new(FsObjectStore::new(fs.root.clone())))
        }
        "s3" => {
            let s3 = cfg
                .storage
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("[storage.s3] section missing"))?;
            Ok(Arc::new(S3ObjectStore::new(s3.clone())))
        }
        other => anyhow::bail!("unknown storage backend: {}", other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "course_tutor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg.db).await?;
    let catalog = Arc::new(Catalog::new(pool.clone(), cfg.storage.namespace.clone()));
    let store = build_store(&cfg)?;
    let context_store = Arc::new(SqliteContextStore::new(pool.clone()));

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Course { action } => match action {
            CourseAction::Add { name, proctor } => {
                let id = catalog.create_course(proctor, &name).await?;
                println!("Created course {} (id {}).", name, id);
            }
        },
        Commands::Upload { course, file } => {
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("invalid file name: {}", file.display()))?
                .to_string();
            let format = DocumentFormat::from_filename(&filename).ok_or_else(|| {
                anyhow::anyhow!("unsupported file type: {} (expected .pdf or .pptx)", filename)
            })?;
            let bytes = tokio::fs::read(&file).await?;
            let record = catalog
                .add_document(store.as_ref(), course, &filename, format, &bytes)
                .await?;
            println!(
                "Uploaded {} ({}, {} bytes) to course {}.",
                record.filename, record.format, record.size, course
            );
        }
        Commands::Docs { course } => {
            let docs = catalog.list_documents(course).await?;
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                println!(
                    "{}  {}  {} bytes  uploaded {}",
                    doc.filename,
                    doc.format,
                    doc.size,
                    doc.uploaded_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Commands::Remove { course, filename } => {
            catalog
                .remove_document(store.as_ref(), course, &filename)
                .await?;
            println!("Removed {} from course {}.", filename, course);
        }
        Commands::Train { course } => {
            let ocr = Arc::new(TesseractEngine::new(&cfg.ocr));
            let assembler = CorpusAssembler::new(
                catalog.clone(),
                store.clone(),
                context_store.clone(),
                ocr,
            );
            let report = assembler.train_course(course).await?;
            println!(
                "Trained course {}: {} documents ingested ({} via OCR), context {} chars.",
                course, report.documents_ingested, report.ocr_fallbacks, report.context_chars
            );
            for skipped in &report.skipped {
                println!("  skipped {}: {}", skipped.filename, skipped.reason);
            }
        }
        Commands::Enroll { student, course } => {
            context_store.seed_student_context(student, course).await?;
            println!("Enrolled student {} in course {}.", student, course);
        }
        Commands::Reset { student, course } => {
            context_store.reset_student_context(student, course).await?;
            println!(
                "Reset student {}'s context to the current course {} context.",
                student, course
            );
        }
        Commands::Ask {
            student,
            course,
            question,
        } => {
            let model = Arc::new(OpenAiChatClient::new(cfg.model.clone())?);
            let session = TutorSession::new(context_store.clone(), model);
            let result = session.ask(student, course, &question).await?;
            println!("{}", result.answer);
            if result.dirty {
                eprintln!("warning: answer was not persisted to the student's context");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn every_command_parses() {
        Cli::try_parse_from(["tutor", "init"]).unwrap();
        Cli::try_parse_from(["tutor", "course", "add", "Statistics", "--proctor", "2"]).unwrap();
        Cli::try_parse_from(["tutor", "upload", "1", "notes/week1.pdf"]).unwrap();
        Cli::try_parse_from(["tutor", "docs", "1"]).unwrap();
        Cli::try_parse_from(["tutor", "remove", "1", "week1.pdf"]).unwrap();
        Cli::try_parse_from(["tutor", "train", "1"]).unwrap();
        Cli::try_parse_from(["tutor", "enroll", "7", "1"]).unwrap();
        Cli::try_parse_from(["tutor", "reset", "7", "1"]).unwrap();
        Cli::try_parse_from(["tutor", "ask", "7", "1", "Why squared error?"]).unwrap();
        assert!(Cli::try_parse_from(["tutor", "bogus"]).is_err());
    }
}
