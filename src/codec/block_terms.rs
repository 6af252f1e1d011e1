//! Block-based term dictionary.
//!
//! Terms are grouped into blocks of a size chosen by the terms index
//! policy; each block stores one shared prefix plus per-term suffixes,
//! frequency stats, and opaque postings metadata, each as its own blob so
//! readers can decode lazily.

pub mod reader;
pub mod writer;

pub use reader::{BlockTermsEnum, BlockTermsReader, SeekStatus, TermState};
pub use writer::BlockTermsWriter;

pub const CODEC_NAME: &str = "camellia_block_terms";
pub const VERSION_START: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_START;
