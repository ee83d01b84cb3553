use super::models::{ChunkDisplay, NewChunk, StoredChunk};
use super::{Db, decode_embedding, encode_embedding};
use rusqlite::types::Value;
use rusqlite::{Result, Row, params};

fn map_chunk(row: &Row<'_>) -> Result<StoredChunk> {
    let blob: Vec<u8> = row.get(4)?;
    let embedding = decode_embedding(&blob).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Blob, e.into())
    })?;

    Ok(StoredChunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        chunk_index: row.get::<_, i64>(2)? as usize,
        content: row.get(3)?,
        embedding,
        token_count: row.get::<_, i64>(5)? as usize,
        metadata: row.get(6)?,
    })
}

const CHUNK_COLUMNS: &str = "id, document_id, chunk_index, content, embedding, token_count, metadata";

impl Db {
    /// Insert a batch of chunks for a document inside one transaction.
    /// Callers bound the batch size to keep per-call payloads small.
    pub fn insert_chunks(&mut self, document_id: i64, chunks: &[NewChunk<'_>]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (document_id, chunk_index, content, embedding, token_count, metadata) VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    document_id,
                    chunk.chunk_index as i64,
                    chunk.content,
                    encode_embedding(chunk.embedding),
                    chunk.token_count as i64,
                    chunk.metadata,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All chunks in the store, in (document_id, chunk_index) order.
    pub fn get_all_chunks(&self) -> Result<Vec<StoredChunk>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks ORDER BY document_id, chunk_index"
        ))?;
        let rows = stmt.query_map([], map_chunk)?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }
        Ok(chunks)
    }

    /// Chunks restricted to the given document ids.
    pub fn get_chunks_by_document_ids(&self, document_ids: &[i64]) -> Result<Vec<StoredChunk>> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; document_ids.len()].join(", ");
        let query = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE document_id IN ({placeholders}) ORDER BY document_id, chunk_index"
        );
        let params: Vec<Value> = document_ids.iter().map(|id| Value::Integer(*id)).collect();
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), map_chunk)?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }
        Ok(chunks)
    }

    /// Join display metadata (document title, source path) for the given
    /// chunk ids.
    pub fn get_chunks_with_document_titles(&self, chunk_ids: &[i64]) -> Result<Vec<ChunkDisplay>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; chunk_ids.len()].join(", ");
        let query = format!(
            r#"
            SELECT c.id, d.title, d.source_path
            FROM chunks c
            JOIN documents d ON c.document_id = d.id
            WHERE c.id IN ({placeholders})
            "#
        );
        let params: Vec<Value> = chunk_ids.iter().map(|id| Value::Integer(*id)).collect();
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(ChunkDisplay {
                chunk_id: row.get(0)?,
                document_title: row.get(1)?,
                source_path: row.get(2)?,
            })
        })?;

        let mut displays = Vec::new();
        for row in rows {
            displays.push(row?);
        }
        Ok(displays)
    }

    /// Number of chunk rows persisted for a document.
    pub fn count_chunks_for_document(&self, document_id: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE document_id = ?",
            params![document_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
