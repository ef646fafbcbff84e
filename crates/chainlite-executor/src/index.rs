//! Snippet index: SQLite FTS5 (BM25) over chunked project documents.

use anyhow::{Context, Result};
use chainlite_core::model::Snippet;
use chainlite_core::text::{chunk_text, collapse_whitespace};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

/// Shared across concurrent requests; the connection is serialized behind a mutex.
pub struct SnippetIndex {
    conn: Mutex<Connection>,
}

impl SnippetIndex {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open index: {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        ensure_index(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("index connection lock poisoned"))
    }

    /// Chunk and index a document's text. Existing chunks for the same
    /// (project, source) are replaced. Returns the number of chunks written.
    pub fn index_document(
        &self,
        project: &str,
        source: &str,
        text: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<usize> {
        let normalized = collapse_whitespace(text);
        let chunks = chunk_text(&normalized, chunk_size, chunk_overlap);
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM snippet_fts WHERE project = ?1 AND source = ?2",
            rusqlite::params![project, source],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO snippet_fts(project, source, chunk_index, content) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (i, chunk) in chunks.iter().enumerate() {
                stmt.execute(rusqlite::params![project, source, i as i64, chunk])?;
            }
        }
        tx.commit()?;
        tracing::debug!(project, source, chunks = chunks.len(), "document indexed");
        Ok(chunks.len())
    }

    /// Top-`k` snippets for `query` within `project`, best first.
    pub fn search(&self, project: &str, query: &str, k: usize) -> Result<Vec<Snippet>> {
        let Some(match_expr) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT source, chunk_index, content, bm25(snippet_fts) AS rank
            FROM snippet_fts
            WHERE snippet_fts MATCH ?1 AND project = ?2
            ORDER BY rank
            LIMIT ?3
            "#,
        )?;
        let rows = stmt.query_map(rusqlite::params![match_expr, project, k as i64], |row| {
            Ok(Snippet {
                source: row.get(0)?,
                chunk_index: row.get::<_, i64>(1)? as usize,
                content: row.get(2)?,
                // bm25 is lower-is-better; negate so higher score means more relevant.
                score: -row.get::<_, f64>(3).unwrap_or(0.0),
            })
        })?;
        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(hits)
    }

    /// Number of indexed chunks for a project.
    pub fn count(&self, project: &str) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM snippet_fts WHERE project = ?1",
            rusqlite::params![project],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

fn ensure_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS snippet_fts USING fts5(
            project UNINDEXED,
            source UNINDEXED,
            chunk_index UNINDEXED,
            content,
            tokenize='porter'
        );
        "#,
    )?;
    Ok(())
}

/// Turn free text into an FTS5 OR-query of quoted terms. Punctuation in user
/// queries (`?`, `:`, `-`) is FTS syntax, so only word characters survive.
fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_query_strips_syntax() {
        assert_eq!(
            fts_query("what is the total?").as_deref(),
            Some("\"what\" OR \"is\" OR \"the\" OR \"total\"")
        );
        assert_eq!(fts_query("?? --"), None);
    }

    #[test]
    fn test_index_and_search_scoped_by_project() {
        let index = SnippetIndex::in_memory().unwrap();
        index
            .index_document("p1", "invoice.txt", "invoice   total is\n42", 1000, 200)
            .unwrap();
        index
            .index_document("p2", "other.txt", "the total is 7", 1000, 200)
            .unwrap();

        let hits = index.search("p1", "what is the total?", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "invoice.txt");
        assert_eq!(hits[0].content, "invoice total is 42");
        assert!(index.search("p3", "total", 5).unwrap().is_empty());
    }

    #[test]
    fn test_reindex_replaces_chunks() {
        let index = SnippetIndex::in_memory().unwrap();
        let long = "alpha beta gamma ".repeat(200);
        let n = index.index_document("p", "a.txt", &long, 100, 20).unwrap();
        assert!(n > 1);
        assert_eq!(index.count("p").unwrap(), n);
        index.index_document("p", "a.txt", "short", 100, 20).unwrap();
        assert_eq!(index.count("p").unwrap(), 1);
    }

    #[test]
    fn test_search_respects_k() {
        let index = SnippetIndex::in_memory().unwrap();
        for i in 0..8 {
            index
                .index_document("p", &format!("f{}.txt", i), "shared keyword here", 1000, 200)
                .unwrap();
        }
        assert_eq!(index.search("p", "keyword", 5).unwrap().len(), 5);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.sqlite");
        {
            let index = SnippetIndex::open(&path).unwrap();
            index.index_document("p", "a.txt", "persisted words", 1000, 200).unwrap();
        }
        let index = SnippetIndex::open(&path).unwrap();
        assert_eq!(index.search("p", "persisted", 5).unwrap().len(), 1);
    }
}
