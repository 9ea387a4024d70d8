//! # Course Tutor
//!
//! A course-material ingestion and AI tutoring backend.
//!
//! Proctors upload course documents (PDFs and PowerPoint decks), the
//! training pipeline extracts their text (with an OCR fallback for scanned
//! PDFs), and the assembled corpus becomes the course's tutor context. Each
//! enrolled student gets their own copy of that context, which grows with
//! every tutoring exchange.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────┐
//! │  Uploads  │──▶│   Training    │──▶│  SQLite    │
//! │ PDF/PPTX  │   │ Extract+OCR  │   │ contexts  │
//! └───────────┘   └──────────────┘   └────┬──────┘
//!      │                                  │
//!      ▼                                  ▼
//! ┌───────────┐                    ┌──────────────┐
//! │  Object   │                    │ Tutor turns  │
//! │  store    │                    │ (OpenAI chat)│
//! └───────────┘                    └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`catalog`] | Course and document registry |
//! | [`storage`] | Object storage backends (fs, S3, memory) |
//! | [`extract`] | Native text extraction (PDF, slide decks) |
//! | [`classify`] | Extracted-text validity check |
//! | [`ocr`] | OCR fallback for scanned PDFs |
//! | [`corpus`] | Corpus assembly and course training |
//! | [`context_store`] | Course and student context lifecycle |
//! | [`tutor`] | Tutoring turn loop |
//! | [`model`] | Chat model client |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod catalog;
pub mod classify;
pub mod config;
pub mod context_store;
pub mod corpus;
pub mod db;
pub mod error;
pub mod extract;
pub mod migrate;
pub mod model;
pub mod models;
pub mod ocr;
pub mod storage;
pub mod tutor;
