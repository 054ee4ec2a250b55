//! Plain-text corpus loading.

use std::collections::HashSet;
use std::path::Path;

use ragchat_core::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// A loaded corpus document.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// File name the text came from.
    pub source: String,
    pub text: String,
    pub content_hash: String,
}

fn is_txt(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}

/// SHA-256 of the document text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Load every `*.txt` file in `dir`, in path order.
///
/// Blank files and byte-identical duplicates are skipped. A missing
/// directory or a corpus with no usable text is an error.
pub fn load_txt_files(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(Error::Corpus(format!(
            "documents directory not found: {}",
            dir.display()
        )));
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_txt(p))
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        if text.trim().is_empty() {
            debug!("Skipping empty document {}", source);
            continue;
        }

        let hash = content_hash(&text);
        if !seen.insert(hash.clone()) {
            debug!("Duplicate content, skipping: {}", source);
            continue;
        }

        docs.push(Document {
            source,
            text,
            content_hash: hash,
        });
    }

    if docs.is_empty() {
        return Err(Error::Corpus(format!(
            "no .txt documents with content in {}",
            dir.display()
        )));
    }

    info!("Loaded {} documents from {}", docs.len(), dir.display());
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_only_txt_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_tuesday.txt"), "Tacos with salsa").unwrap();
        std::fs::write(dir.path().join("a_monday.TXT"), "Pasta primavera").unwrap();
        std::fs::write(dir.path().join("notes.md"), "# not loaded").unwrap();
        std::fs::write(dir.path().join("blank.txt"), "   \n").unwrap();

        let docs = load_txt_files(dir.path()).unwrap();
        let sources: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["a_monday.TXT", "b_tuesday.txt"]);
        assert_eq!(docs[0].text, "Pasta primavera");
    }

    #[test]
    fn test_duplicate_content_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), "Soup on Friday").unwrap();
        std::fs::write(dir.path().join("two.txt"), "Soup on Friday").unwrap();

        let docs = load_txt_files(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "one.txt");
    }

    #[test]
    fn test_missing_or_empty_corpus_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_txt_files(&dir.path().join("nope")),
            Err(Error::Corpus(_))
        ));
        assert!(matches!(load_txt_files(dir.path()), Err(Error::Corpus(_))));
    }
}
