//! Lifecycle of course-level and student-level context strings.
//!
//! One evolving context per course, and one per (student, course) pair that is
//! seeded from the course context at enrollment and diverges thereafter. All
//! operations are single-row, full-string reads and replacements; there is
//! no diff/patch surface.
//!
//! The store also hands out per-enrollment locks: a tutoring turn is a
//! read-modify-append-write sequence that is not atomic on its own, so two
//! concurrent turns from the same student must serialize or one answer is
//! silently lost (last-write-wins on the full string).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::error::TutorError;

/// Context lifecycle operations, injected into the assembler and tutor so
/// tests can substitute doubles.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Fails with `NotFound` if the course has never been trained.
    async fn read_course_context(&self, course_id: i64) -> Result<String, TutorError>;

    /// Idempotent full overwrite. `NotFound` if the course does not exist.
    async fn write_course_context(&self, course_id: i64, text: &str) -> Result<(), TutorError>;

    /// Copy the current course context into a new enrollment row.
    /// `Conflict` if the enrollment already exists.
    async fn seed_student_context(&self, student_id: i64, course_id: i64)
        -> Result<(), TutorError>;

    /// `NotEnrolled` when no enrollment row exists.
    async fn read_student_context(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<String, TutorError>;

    /// Full-string replace. `NotEnrolled` when no enrollment row exists.
    async fn write_student_context(
        &self,
        student_id: i64,
        course_id: i64,
        text: &str,
    ) -> Result<(), TutorError>;

    /// Explicitly re-copy the current course context over an existing
    /// enrollment, discarding the student's accumulated turns.
    async fn reset_student_context(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<(), TutorError>;

    /// Mutual exclusion for the turn sequence on one enrollment. Operations
    /// on different (student, course) keys never contend.
    async fn lock_turn(&self, student_id: i64, course_id: i64) -> OwnedMutexGuard<()>;
}

/// SQLite-backed store over the `courses` and `student_courses` tables.
pub struct SqliteContextStore {
    pool: SqlitePool,
    /// Weak entries so the map does not grow with every enrollment ever
    /// locked; dead entries are pruned on the next acquisition.
    turn_locks: Mutex<HashMap<(i64, i64), Weak<tokio::sync::Mutex<()>>>>,
}

impl SqliteContextStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn read_course_context(&self, course_id: i64) -> Result<String, TutorError> {
        let context: Option<Option<String>> =
            sqlx::query_scalar("SELECT context FROM courses WHERE id = ?")
                .bind(course_id)
                .fetch_optional(&self.pool)
                .await?;

        // Missing row and NULL context are the same outcome: never trained
        context.flatten().ok_or(TutorError::NotFound)
    }

    async fn write_course_context(&self, course_id: i64, text: &str) -> Result<(), TutorError> {
        let result = sqlx::query("UPDATE courses SET context = ?, trained_at = ? WHERE id = ?")
            .bind(text)
            .bind(Utc::now().timestamp())
            .bind(course_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(TutorError::NotFound);
        }
        debug!(course_id, chars = text.len(), "wrote course context");
        Ok(())
    }

    async fn seed_student_context(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<(), TutorError> {
        let context = self.read_course_context(course_id).await?;

        let result = sqlx::query(
            "INSERT INTO student_courses (student_id, course_id, learned_context, seeded_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(student_id, course_id) DO NOTHING",
        )
        .bind(student_id)
        .bind(course_id)
        .bind(&context)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TutorError::Conflict);
        }
        debug!(student_id, course_id, "seeded student context");
        Ok(())
    }

    async fn read_student_context(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<String, TutorError> {
        sqlx::query_scalar(
            "SELECT learned_context FROM student_courses WHERE student_id = ? AND course_id = ?",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TutorError::NotEnrolled)
    }

    async fn write_student_context(
        &self,
        student_id: i64,
        course_id: i64,
        text: &str,
    ) -> Result<(), TutorError> {
        let result = sqlx::query(
            "UPDATE student_courses SET learned_context = ? WHERE student_id = ? AND course_id = ?",
        )
        .bind(text)
        .bind(student_id)
        .bind(course_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TutorError::NotEnrolled);
        }
        Ok(())
    }

    async fn reset_student_context(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<(), TutorError> {
        let context = self.read_course_context(course_id).await?;
        self.write_student_context(student_id, course_id, &context)
            .await?;
        debug!(student_id, course_id, "reset student context");
        Ok(())
    }

    async fn lock_turn(&self, student_id: i64, course_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.turn_locks.lock().expect("lock poisoned");
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(&(student_id, course_id)).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert((student_id, course_id), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }
}
