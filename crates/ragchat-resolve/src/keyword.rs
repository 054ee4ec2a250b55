//! BM25 keyword retriever over an in-memory SQLite FTS5 index.

use async_trait::async_trait;
use parking_lot::Mutex;
use ragchat_core::{Error, Result};
use ragchat_ingest::TextChunk;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::types::{Fragment, Retriever};

const SCHEMA_SQL: &str = r#"
CREATE TABLE chunks (
    id INTEGER PRIMARY KEY,
    source TEXT NOT NULL,
    text TEXT NOT NULL
);

CREATE VIRTUAL TABLE chunks_fts USING fts5(
    text,
    content='chunks', content_rowid='id',
    tokenize='porter unicode61'
);

CREATE TRIGGER chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, text) VALUES (new.id, new.text);
END;
"#;

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

/// Keyword retriever ranking chunks by FTS5 BM25.
pub struct KeywordRetriever {
    conn: Mutex<Connection>,
    top_k: usize,
}

impl KeywordRetriever {
    /// Index `chunks` into a fresh in-memory database.
    pub fn build(chunks: &[TextChunk], top_k: usize) -> Result<Self> {
        let mut conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA_SQL).map_err(db_err)?;

        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO chunks (id, source, text) VALUES (?1, ?2, ?3)")
                .map_err(db_err)?;
            for chunk in chunks {
                stmt.execute(params![chunk.id as i64, chunk.source, chunk.text])
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;

        debug!("Keyword index built over {} chunks", chunks.len());
        Ok(Self {
            conn: Mutex::new(conn),
            top_k,
        })
    }

    /// Wrap each token in double quotes and join with OR.
    fn sanitize_fts_query(query: &str) -> String {
        query
            .split_whitespace()
            .map(|t| t.replace('"', ""))
            .filter(|t| t.chars().any(|c| c.is_alphanumeric()))
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// Top-k chunks for `query`, best first.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<Fragment>> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT c.id, c.source, c.text, chunks_fts.rank AS bm25_score \
                 FROM chunks_fts \
                 JOIN chunks c ON c.id = chunks_fts.rowid \
                 WHERE chunks_fts MATCH ?1 \
                 ORDER BY chunks_fts.rank \
                 LIMIT ?2",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![fts_query, top_k as i64], |row| {
                let id: i64 = row.get(0)?;
                let bm25_score: f64 = row.get(3)?;
                Ok(Fragment {
                    chunk_id: id as usize,
                    source: row.get(1)?,
                    text: row.get(2)?,
                    // FTS5 rank is negative; negate for positive.
                    score: -bm25_score,
                })
            })
            .map_err(db_err)?;

        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Fragment>> {
        self.search(query, self.top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: usize, text: &str) -> TextChunk {
        TextChunk {
            id,
            source: format!("doc{}.txt", id),
            text: text.into(),
        }
    }

    fn meal_index() -> KeywordRetriever {
        KeywordRetriever::build(
            &[
                chunk(0, "Monday dinner is lentil soup with crusty bread"),
                chunk(1, "Tuesday lunch is a chicken caesar salad"),
                chunk(2, "Wednesday dinner is mushroom risotto and a green salad"),
            ],
            4,
        )
        .unwrap()
    }

    #[test]
    fn test_sanitize_quotes_tokens() {
        assert_eq!(
            KeywordRetriever::sanitize_fts_query("what's \"for\" dinner ?"),
            "\"what's\" OR \"for\" OR \"dinner\""
        );
        assert_eq!(KeywordRetriever::sanitize_fts_query("  ?! "), "");
    }

    #[test]
    fn test_search_ranks_matching_chunks() {
        let index = meal_index();
        let hits = index.search("risotto dinner", 4).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, 2);
        assert!(hits.iter().all(|h| h.score > 0.0));
    }

    #[test]
    fn test_porter_stemming_matches_plural() {
        let index = meal_index();
        let hits = index.search("salads", 4).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.chunk_id).collect();
        assert!(ids.contains(&1) && ids.contains(&2));
    }

    #[test]
    fn test_no_match_and_punctuation_only_queries() {
        let index = meal_index();
        assert!(index.search("sushi", 4).unwrap().is_empty());
        assert!(index.search("???", 4).unwrap().is_empty());
    }

    #[test]
    fn test_top_k_limits_results() {
        let index = meal_index();
        assert_eq!(index.search("dinner lunch", 1).unwrap().len(), 1);
    }
}
