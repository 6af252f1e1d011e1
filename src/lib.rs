//! # Camellia
//!
//! A full-text search engine core providing a block-based terms dictionary
//! codec and a hidden-Markov-model Chinese word segmenter.
//!
//! ## Features
//!
//! - Pure Rust implementation
//! - Prefix-shared term blocks with lazy metadata decoding
//! - Fixed-gap (packed-array) and variable-gap (FST) terms indexes
//! - Checksummed, versioned file formats with corruption detection
//! - Pluggable storage backends (filesystem and in-memory)
//! - Dictionary-driven HMM segmentation with bigram shortest-path scoring

// Core modules
pub mod codec;
mod error;
pub mod segmenter;
pub mod storage;
mod util;

// Re-exports for the public API
pub use codec::block_terms::{BlockTermsReader, BlockTermsWriter};
pub use codec::postings::{FieldInfo, PostingsCodec, SimplePostingsCodec, TermStats};
pub use codec::terms_index::{IndexTermSelector, TermsIndexReader, TermsIndexWriter};
pub use error::{CamelliaError, Result};
pub use segmenter::{BigramDictionary, HhmmSegmenter, SegToken, WordDictionary};
pub use storage::{FsStorage, MemoryStorage, Storage, StorageInput, StorageOutput};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
