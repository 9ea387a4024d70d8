//! Tutoring turns against a student's learned context.
//!
//! A turn is: lock the enrollment, read the student's context, ask the model
//! with the context as the system message, append the exchange, write the
//! context back. The lock makes concurrent turns from the same student
//! serialize instead of overwriting each other's appends.

use std::sync::Arc;

use tracing::{error, info};

use crate::context_store::ContextStore;
use crate::error::TutorError;
use crate::model::ModelClient;
use crate::models::TutorAnswer;

pub struct TutorSession {
    context_store: Arc<dyn ContextStore>,
    model: Arc<dyn ModelClient>,
}

impl TutorSession {
    pub fn new(context_store: Arc<dyn ContextStore>, model: Arc<dyn ModelClient>) -> Self {
        Self {
            context_store,
            model,
        }
    }

    /// Run one tutoring turn.
    ///
    /// If the model is unavailable the student's context is left untouched
    /// and the error propagates; an error string never becomes a turn. If
    /// the answer is produced but the write-back fails, the answer is still
    /// returned with `dirty` set so callers know the exchange was not
    /// persisted.
    pub async fn ask(
        &self,
        student_id: i64,
        course_id: i64,
        question: &str,
    ) -> Result<TutorAnswer, TutorError> {
        let _guard = self.context_store.lock_turn(student_id, course_id).await;

        let context = self
            .context_store
            .read_student_context(student_id, course_id)
            .await?;

        let answer = self.model.complete(&context, question).await?;

        let updated = format!("{}\n\nStudent: {}\n\nTutor: {}\n", context, question, answer);
        let dirty = match self
            .context_store
            .write_student_context(student_id, course_id, &updated)
            .await
        {
            Ok(()) => false,
            Err(e) => {
                error!(student_id, course_id, "failed to persist turn: {}", e);
                true
            }
        };

        info!(
            student_id,
            course_id,
            question_chars = question.chars().count(),
            answer_chars = answer.chars().count(),
            dirty,
            "tutoring turn"
        );
        Ok(TutorAnswer { answer, dirty })
    }
}
