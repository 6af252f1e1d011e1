//! Chinese word segmentation based on a hidden Markov model over a
//! word-frequency dictionary and a bigram transition model.
//!
//! The pipeline for one sentence:
//!
//! 1. [`graph::SegGraph`] collects every candidate token at every position:
//!    single hanzi, dictionary words, Latin/digit runs, delimiters.
//! 2. [`bigram_graph::BiSegGraph`] connects adjacent candidates and weights
//!    each transition with a smoothed log-space bigram cost.
//! 3. Shortest-path extraction picks the globally cheapest token sequence.
//! 4. [`filter::SegTokenFilter`] normalizes the chosen tokens.
//!
//! Dictionaries are caller-owned and shared; see [`WordDictionary::shared`]
//! and [`BigramDictionary::shared`] for the process-wide lazy singletons.

pub mod bigram_dict;
pub mod bigram_graph;
pub mod chars;
pub mod dictionary;
pub mod filter;
pub mod graph;
pub mod hhmm;
pub mod word_dict;

pub use bigram_dict::BigramDictionary;
pub use filter::SegTokenFilter;
pub use graph::{SegGraph, SegToken, WordType};
pub use hhmm::HhmmSegmenter;
pub use word_dict::WordDictionary;
