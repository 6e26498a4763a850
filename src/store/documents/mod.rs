
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, Pool, Sqlite, Type};
use std::path::Path;
use tracing::{debug, info};

pub type DbPool = Pool<Sqlite>;

/// Registry of ingested documents. Fragments in the vector store point back
/// at rows in this table through their `document_id`.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub owner: String,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub upload_date: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Indexed,
    Failed,
}

impl std::fmt::Display for DocumentStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            DocumentStatus::Processing => write!(f, "Processing"),
            DocumentStatus::Indexed => write!(f, "Indexed"),
            DocumentStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub filename: String,
    pub file_type: String,
    pub owner: String,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/store/documents/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub async fn create_document(&self, new_document: NewDocument) -> Result<Document> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO documents (id, filename, file_type, owner, status, upload_date)
             VALUES (?, ?, ?, ?, 'processing', ?)",
        )
        .bind(&id)
        .bind(&new_document.filename)
        .bind(&new_document.file_type)
        .bind(&new_document.owner)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create document")?;

        self.get_document(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(
            "SELECT id, filename, file_type, owner, status, error_message, upload_date
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get document by id")?;

        Ok(document)
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            "SELECT id, filename, file_type, owner, status, error_message, upload_date
             FROM documents ORDER BY upload_date DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list documents")?;

        Ok(documents)
    }

    pub async fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ?, error_message = ? WHERE id = ?")
            .bind(status)
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update document status")?;

        Ok(())
    }

    /// Remove a document row. The caller is responsible for also deleting
    /// the document's fragments from the vector store.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_documents(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count documents")?;

        Ok(count.0)
    }
}
