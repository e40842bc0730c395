// Database module
// LanceDB vector storage for document chunks and their embeddings

pub mod vector_store;

pub use vector_store::{CollectionStats, ScoredChunk, VectorStore};
