//! Recursive character splitting.
//!
//! Text is split on the first separator that occurs in it, pieces that are
//! still too large are split again with the next separator, and small pieces
//! are merged back up to `chunk_size` with `chunk_overlap` carried between
//! neighbouring chunks. Sizes are measured in bytes.

use std::collections::VecDeque;

use serde::Serialize;

use crate::file::Document;

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// A retrievable piece of a corpus document.
#[derive(Debug, Clone, Serialize)]
pub struct TextChunk {
    /// Position in the flattened chunk list of the whole corpus.
    pub id: usize,
    pub source: String,
    pub text: String,
}

/// Recursive splitter that respects document structure.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Split text into chunks of at most `chunk_size` bytes where possible.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_text(text, SEPARATORS)
    }

    fn split_text(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let idx = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(idx).copied().unwrap_or("");
        let remaining = separators.get(idx + 1..).unwrap_or(&[]);

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut small: Vec<String> = Vec::new();

        for piece in splits {
            if piece.len() < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge_splits(&small, separator));
                small.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_text(&piece, remaining));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge_splits(&small, separator));
        }

        chunks
    }

    /// Merge small pieces into chunks, keeping up to `chunk_overlap` bytes of
    /// trailing pieces at the head of the next chunk.
    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = separator.len();
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = piece.len();
            let joined_len = |current: &VecDeque<&str>| if current.is_empty() { 0 } else { sep_len };

            if total + len + joined_len(&current) > self.chunk_size && !current.is_empty() {
                push_joined(&mut chunks, &current, separator);

                while total > self.chunk_overlap
                    || (total + len + joined_len(&current) > self.chunk_size && total > 0)
                {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total -= first.len() + if current.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + joined_len(&current);
            current.push_back(piece.as_str());
        }

        push_joined(&mut chunks, &current, separator);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, parts: &VecDeque<&str>, separator: &str) {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split all documents into one flat, numbered chunk list.
pub fn split_documents(docs: &[Document], splitter: &RecursiveSplitter) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    for doc in docs {
        for text in splitter.split(&doc.text) {
            chunks.push(TextChunk {
                id: chunks.len(),
                source: doc.source.clone(),
                text,
            });
        }
    }
    chunks
}
