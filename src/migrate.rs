use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema if it does not exist. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Courses: context is NULL until the first training run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            proctor_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            context TEXT,
            trained_at INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(proctor_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Document metadata; bytes live in the object store under object_key
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            course_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            format TEXT NOT NULL,
            object_key TEXT NOT NULL,
            size INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            PRIMARY KEY (course_id, filename),
            FOREIGN KEY (course_id) REFERENCES courses(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Enrollments: learned_context is seeded from the course context and
    // diverges per student thereafter
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS student_courses (
            student_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            learned_context TEXT NOT NULL,
            seeded_at INTEGER NOT NULL,
            PRIMARY KEY (student_id, course_id),
            FOREIGN KEY (course_id) REFERENCES courses(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_course ON documents(course_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_student_courses_course ON student_courses(course_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
