use super::{Db, models::Document};
use chrono::Utc;
use rusqlite::{OptionalExtension, Result, Row, params};

fn map_document(row: &Row<'_>) -> Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        source_type: row.get(2)?,
        source_path: row.get(3)?,
        file_size: row.get::<_, i64>(4)? as u64,
        chunk_count: row.get::<_, i64>(5)? as usize,
        is_indexed: row.get(6)?,
        index_progress: row.get::<_, f64>(7)? as f32,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const DOCUMENT_COLUMNS: &str = "id, title, source_type, source_path, file_size, chunk_count, is_indexed, index_progress, created_at, updated_at";

impl Db {
    /// Insert a new document record at ingestion start: not yet indexed,
    /// zero progress. Returns the full record with its assigned id.
    pub fn insert_document(
        &self,
        title: &str,
        source_type: &str,
        source_path: &str,
        file_size: u64,
    ) -> Result<Document> {
        let now = Utc::now();
        self.conn.execute(
            r#"
            INSERT INTO documents (title, source_type, source_path, file_size, chunk_count, is_indexed, index_progress, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, 0, 0.0, ?, ?)
            "#,
            params![title, source_type, source_path, file_size as i64, now, now],
        )?;
        let id = self.conn.last_insert_rowid();

        Ok(Document {
            id,
            title: title.to_string(),
            source_type: source_type.to_string(),
            source_path: source_path.to_string(),
            file_size,
            chunk_count: 0,
            is_indexed: false,
            index_progress: 0.0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch a single document by id.
    pub fn get_document(&self, id: i64) -> Result<Option<Document>> {
        self.conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"),
                params![id],
                map_document,
            )
            .optional()
    }

    /// List all documents, newest first.
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], map_document)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    /// Finalize a document's index status and chunk count.
    pub fn update_document_index_status(
        &self,
        id: i64,
        is_indexed: bool,
        chunk_count: usize,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE documents SET is_indexed = ?, chunk_count = ?, updated_at = ? WHERE id = ?",
            params![is_indexed, chunk_count as i64, Utc::now(), id],
        )?;
        Ok(())
    }

    /// Persist the current ingestion progress for a document.
    pub fn update_document_index_progress(&self, id: i64, progress: f32) -> Result<()> {
        self.conn.execute(
            "UPDATE documents SET index_progress = ?, updated_at = ? WHERE id = ?",
            params![progress as f64, Utc::now(), id],
        )?;
        Ok(())
    }

    /// Delete a document; its chunks cascade. Returns whether a row existed.
    pub fn delete_document_by_id(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }
}
