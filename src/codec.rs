//! On-disk codec for the term dictionary.
//!
//! The dictionary is split into two cooperating files: the block file
//! (`.tib`) written by [`block_terms::BlockTermsWriter`], which holds every
//! term grouped into shared-prefix blocks, and a terms index that maps a
//! sparse sample of terms to block file offsets. Two index implementations
//! are provided: [`terms_index::fixed_gap`], which samples every Nth term
//! into packed arrays and supports ordinal lookups, and
//! [`terms_index::variable_gap`], which lets a pluggable selector choose
//! index terms and stores them in an FST.

pub mod block_terms;
pub mod format;
pub mod postings;
pub mod terms_index;

pub use block_terms::{BlockTermsReader, BlockTermsWriter};
pub use postings::{FieldInfo, PostingsCodec, SimplePostingsCodec, TermStats};
