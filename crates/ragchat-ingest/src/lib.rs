//! RAGChat Ingest: load the text corpus and split it into retrievable chunks.

pub mod chunking;
pub mod file;

pub use chunking::{split_documents, RecursiveSplitter, TextChunk};
pub use file::{load_txt_files, Document};
