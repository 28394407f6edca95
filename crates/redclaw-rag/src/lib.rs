//! # RedClaw RAG
//!
//! The knowledge base: a SQLite-backed vector document store.
//!
//! ## Design
//! - **One database** — collections are a column, not separate stores
//! - **Content-hash ids** — re-adding the same document is a no-op
//! - **Stringified metadata** — every metadata value is stored as a
//!   string; lists and objects become JSON strings
//! - **Cosine ranking** — embed the query, scan the collection, keep hits
//!   above the similarity threshold, sort descending
//! - **Paragraph-greedy chunking** — long documents are split on blank
//!   lines before insertion
//!
//! Embeddings come from the configured provider; with no API available a
//! deterministic feature-hashing embedder keeps everything working offline.

pub mod chunker;
pub mod embedder;
pub mod search;
pub mod store;

pub use embedder::{Embedder, HashEmbedder, ProviderEmbedder};
pub use store::{CollectionStats, RagStore};
