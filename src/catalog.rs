//! Course and document registry.
//!
//! Documents are identified by (course_id, filename). The format tag is
//! decided once, at upload, and stored alongside the object key so later
//! pipeline stages never re-sniff filename suffixes. Bytes go to the object
//! store; this module owns only the metadata rows.

use chrono::{TimeZone, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::error::TutorError;
use crate::models::{Course, DocumentFormat, DocumentRecord};
use crate::storage::ObjectStore;

pub struct Catalog {
    pool: SqlitePool,
    /// Opaque storage namespace, prepended to every object key.
    namespace: String,
}

impl Catalog {
    pub fn new(pool: SqlitePool, namespace: String) -> Self {
        Self { pool, namespace }
    }

    /// Storage prefix for a course's documents.
    pub fn course_prefix(&self, course_id: i64) -> String {
        format!("{}/{}", self.namespace, course_id)
    }

    pub async fn create_course(&self, proctor_id: i64, name: &str) -> Result<i64, TutorError> {
        let result = sqlx::query(
            "INSERT INTO courses (proctor_id, name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(proctor_id, name) DO NOTHING",
        )
        .bind(proctor_id)
        .bind(name)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TutorError::Conflict);
        }

        let id: i64 = sqlx::query_scalar("SELECT id FROM courses WHERE proctor_id = ? AND name = ?")
            .bind(proctor_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        info!(course_id = id, proctor_id, name, "created course");
        Ok(id)
    }

    pub async fn get_course(&self, course_id: i64) -> Result<Course, TutorError> {
        let row = sqlx::query(
            "SELECT id, proctor_id, name, context, trained_at FROM courses WHERE id = ?",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TutorError::NotFound)?;

        Ok(Course {
            id: row.get("id"),
            proctor_id: row.get("proctor_id"),
            name: row.get("name"),
            context: row.get("context"),
            trained_at: row
                .get::<Option<i64>, _>("trained_at")
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }

    /// Upload a document: bytes to the object store, metadata row here.
    /// Re-uploading the same filename replaces both.
    pub async fn add_document(
        &self,
        store: &dyn ObjectStore,
        course_id: i64,
        filename: &str,
        format: DocumentFormat,
        bytes: &[u8],
    ) -> Result<DocumentRecord, TutorError> {
        // Course must exist before accepting uploads
        self.get_course(course_id).await?;

        let object_key = format!("{}/{}", self.course_prefix(course_id), filename);
        store.put(&object_key, bytes).await?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let content_hash = format!("{:x}", hasher.finalize());
        let uploaded_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO documents (course_id, filename, format, object_key, size, content_hash, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(course_id, filename) DO UPDATE SET
                format = excluded.format,
                object_key = excluded.object_key,
                size = excluded.size,
                content_hash = excluded.content_hash,
                uploaded_at = excluded.uploaded_at
            "#,
        )
        .bind(course_id)
        .bind(filename)
        .bind(format.as_str())
        .bind(&object_key)
        .bind(bytes.len() as i64)
        .bind(&content_hash)
        .bind(uploaded_at.timestamp())
        .execute(&self.pool)
        .await?;

        info!(course_id, filename, %format, size = bytes.len(), "uploaded document");

        Ok(DocumentRecord {
            course_id,
            filename: filename.to_string(),
            format,
            object_key,
            size: bytes.len() as i64,
            content_hash,
            uploaded_at,
        })
    }

    /// Document metadata for a course, ordered by filename (the corpus
    /// assembly order).
    pub async fn list_documents(&self, course_id: i64) -> Result<Vec<DocumentRecord>, TutorError> {
        let rows = sqlx::query(
            "SELECT course_id, filename, format, object_key, size, content_hash, uploaded_at
             FROM documents WHERE course_id = ? ORDER BY filename",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let format_str: String = row.get("format");
            let format = DocumentFormat::parse(&format_str).ok_or_else(|| {
                TutorError::ObjectStore(format!("unknown stored format: {}", format_str))
            })?;
            records.push(DocumentRecord {
                course_id: row.get("course_id"),
                filename: row.get("filename"),
                format,
                object_key: row.get("object_key"),
                size: row.get("size"),
                content_hash: row.get("content_hash"),
                uploaded_at: Utc
                    .timestamp_opt(row.get::<i64, _>("uploaded_at"), 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            });
        }
        Ok(records)
    }

    /// Remove a document's bytes and metadata. Missing documents are a
    /// `NotFound` so callers can report them.
    pub async fn remove_document(
        &self,
        store: &dyn ObjectStore,
        course_id: i64,
        filename: &str,
    ) -> Result<(), TutorError> {
        let object_key: Option<String> = sqlx::query_scalar(
            "SELECT object_key FROM documents WHERE course_id = ? AND filename = ?",
        )
        .bind(course_id)
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        let object_key = object_key.ok_or(TutorError::NotFound)?;
        store.delete(&object_key).await?;

        sqlx::query("DELETE FROM documents WHERE course_id = ? AND filename = ?")
            .bind(course_id)
            .bind(filename)
            .execute(&self.pool)
            .await?;

        info!(course_id, filename, "removed document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::storage::MemoryObjectStore;

    async fn test_pool() -> SqlitePool {
        // One connection: every connection to sqlite::memory: is its own db
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn course_creation_is_unique_per_proctor() {
        let catalog = Catalog::new(test_pool().await, "t1".to_string());
        let id = catalog.create_course(1, "Statistics").await.unwrap();
        assert!(id > 0);
        assert!(matches!(
            catalog.create_course(1, "Statistics").await,
            Err(TutorError::Conflict)
        ));
        // Same name under another proctor is fine
        catalog.create_course(2, "Statistics").await.unwrap();
    }

    #[tokio::test]
    async fn upload_stores_bytes_and_format_tag() {
        let catalog = Catalog::new(test_pool().await, "t1".to_string());
        let store = MemoryObjectStore::new();
        let course_id = catalog.create_course(1, "Stats").await.unwrap();

        let record = catalog
            .add_document(&store, course_id, "week1.pdf", DocumentFormat::Pdf, b"bytes")
            .await
            .unwrap();
        assert_eq!(record.object_key, format!("t1/{}/week1.pdf", course_id));
        assert!(store.exists(&record.object_key).await.unwrap());

        let docs = catalog.list_documents(course_id).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].format, DocumentFormat::Pdf);
    }

    #[tokio::test]
    async fn documents_list_in_filename_order() {
        let catalog = Catalog::new(test_pool().await, "t1".to_string());
        let store = MemoryObjectStore::new();
        let course_id = catalog.create_course(1, "Stats").await.unwrap();

        for name in ["b.pptx", "a.pdf", "c.pdf"] {
            let format = DocumentFormat::from_filename(name).unwrap();
            catalog
                .add_document(&store, course_id, name, format, b"x")
                .await
                .unwrap();
        }
        let names: Vec<String> = catalog
            .list_documents(course_id)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.filename)
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pptx", "c.pdf"]);
    }

    #[tokio::test]
    async fn remove_deletes_bytes_and_row() {
        let catalog = Catalog::new(test_pool().await, "t1".to_string());
        let store = MemoryObjectStore::new();
        let course_id = catalog.create_course(1, "Stats").await.unwrap();

        catalog
            .add_document(&store, course_id, "week1.pdf", DocumentFormat::Pdf, b"x")
            .await
            .unwrap();
        catalog
            .remove_document(&store, course_id, "week1.pdf")
            .await
            .unwrap();

        assert!(catalog.list_documents(course_id).await.unwrap().is_empty());
        assert!(matches!(
            catalog.remove_document(&store, course_id, "week1.pdf").await,
            Err(TutorError::NotFound)
        ));
    }

    #[tokio::test]
    async fn upload_to_missing_course_fails() {
        let catalog = Catalog::new(test_pool().await, "t1".to_string());
        let store = MemoryObjectStore::new();
        assert!(matches!(
            catalog
                .add_document(&store, 42, "week1.pdf", DocumentFormat::Pdf, b"x")
                .await,
            Err(TutorError::NotFound)
        ));
    }
}
