//! Terms index contracts shared by the fixed-gap and variable-gap
//! implementations.
//!
//! The index writer rides along with the block writer: for every term the
//! block writer asks `check_index_term` whether this term starts a new
//! block, and if so hands the block file position to `add_index_term`
//! after flushing the previous block. At read time a [`FieldIndexEnum`]
//! answers "largest indexed term <= target" so the block reader knows
//! which block to scan.

use crate::codec::postings::{FieldInfo, TermStats};
use crate::error::Result;

pub mod fixed_gap;
pub mod variable_gap;

pub use fixed_gap::{FixedGapTermsIndexReader, FixedGapTermsIndexWriter};
pub use variable_gap::{VariableGapTermsIndexReader, VariableGapTermsIndexWriter};

/// Writer side of a terms index file.
pub trait TermsIndexWriter {
    /// Begin a field. `terms_start` is the block file position where the
    /// field's first block will be written.
    fn start_field(&mut self, field: &FieldInfo, terms_start: u64) -> Result<()>;

    /// Decide whether `term` becomes an index term and therefore starts a
    /// new block. Called once per term, in sorted order.
    fn check_index_term(&mut self, term: &[u8], stats: &TermStats) -> Result<bool>;

    /// Record an index term at block file position `terms_fp`. Only called
    /// for terms `check_index_term` approved.
    fn add_index_term(&mut self, term: &[u8], terms_fp: u64) -> Result<()>;

    fn finish_field(&mut self) -> Result<()>;

    /// Write the field directory and footer and close the output.
    fn finish(&mut self) -> Result<()>;
}

/// Reader side of a terms index file. Shared read-only by all enumerators.
pub trait TermsIndexReader: Send + Sync {
    /// True when ordinal positioning ([`FieldIndexEnum::seek_ord`]) works.
    fn supports_ord(&self) -> bool;

    /// Read-time sub-sampling factor; 1 means the full index is loaded.
    fn divisor(&self) -> usize;

    fn field_enum(&self, field_number: u32) -> Result<Box<dyn FieldIndexEnum>>;
}

/// Cursor over one field's index terms.
pub trait FieldIndexEnum {
    /// Position on the largest indexed term <= `target` and return its
    /// block file pointer. Never fails to find one: the first term of a
    /// field (or the empty string) is always indexed.
    fn seek(&mut self, target: &[u8]) -> Result<u64>;

    /// Position on the index term covering term ordinal `ord`. Errors with
    /// `UnsupportedOperation` when the index has no ordinal support.
    fn seek_ord(&mut self, ord: u64) -> Result<u64>;

    /// Advance to the next index term, returning its block file pointer.
    fn next(&mut self) -> Result<Option<u64>>;

    /// Bytes of the current index term. May be a stored prefix of the
    /// actual term; always enough to cover the block's common prefix.
    fn term(&self) -> &[u8];

    /// Term ordinal of the current index term.
    fn ord(&self) -> Result<u64>;
}

/// Chooses which terms become index terms in the variable-gap index.
pub trait IndexTermSelector: Send {
    fn is_index_term(&mut self, term: &[u8], stats: &TermStats) -> bool;

    /// Reset per-field state.
    fn new_field(&mut self, field: &FieldInfo);
}

/// Indexes every Nth term. The counter starts at the threshold so the
/// first term of each field always fires.
#[derive(Debug)]
pub struct EveryNTermSelector {
    interval: u32,
    count: u32,
}

impl EveryNTermSelector {
    pub fn new(interval: u32) -> Self {
        Self {
            interval,
            count: interval,
        }
    }
}

impl IndexTermSelector for EveryNTermSelector {
    fn is_index_term(&mut self, _term: &[u8], _stats: &TermStats) -> bool {
        if self.count >= self.interval {
            self.count = 1;
            true
        } else {
            self.count += 1;
            false
        }
    }

    fn new_field(&mut self, _field: &FieldInfo) {
        self.count = self.interval;
    }
}

/// Indexes every Nth term, plus any term whose document frequency meets a
/// threshold, so frequently queried terms get an exact index entry.
#[derive(Debug)]
pub struct EveryNOrDocFreqTermSelector {
    doc_freq_threshold: u32,
    interval: u32,
    count: u32,
}

impl EveryNOrDocFreqTermSelector {
    pub fn new(doc_freq_threshold: u32, interval: u32) -> Self {
        Self {
            doc_freq_threshold,
            interval,
            count: interval,
        }
    }
}

impl IndexTermSelector for EveryNOrDocFreqTermSelector {
    fn is_index_term(&mut self, _term: &[u8], stats: &TermStats) -> bool {
        if stats.doc_freq >= self.doc_freq_threshold || self.count >= self.interval {
            self.count = 1;
            true
        } else {
            self.count += 1;
            false
        }
    }

    fn new_field(&mut self, _field: &FieldInfo) {
        self.count = self.interval;
    }
}

/// Length of the shortest prefix of `term` that still differs from
/// `prior`, capped at the term's own length. Index terms store only this
/// prefix; byte-ordered comparisons against it stay correct because any
/// term >= the full index term is also >= its stored prefix.
pub(crate) fn indexed_prefix_length(prior: &[u8], term: &[u8]) -> usize {
    let limit = prior.len().min(term.len());
    let mut idx = 0;
    while idx < limit && prior[idx] == term[idx] {
        idx += 1;
    }
    (idx + 1).min(term.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> FieldInfo {
        FieldInfo::new("body", 0, true)
    }

    #[test]
    fn test_every_n_first_term_fires() {
        let mut selector = EveryNTermSelector::new(3);
        let stats = TermStats::new(1, 1);
        let fired: Vec<bool> = (0..7)
            .map(|i| selector.is_index_term(format!("t{i}").as_bytes(), &stats))
            .collect();
        assert_eq!(fired, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn test_every_n_resets_per_field() {
        let mut selector = EveryNTermSelector::new(4);
        let stats = TermStats::new(1, 1);
        assert!(selector.is_index_term(b"a", &stats));
        assert!(!selector.is_index_term(b"b", &stats));
        selector.new_field(&field());
        assert!(selector.is_index_term(b"a", &stats));
    }

    #[test]
    fn test_doc_freq_threshold_forces_index_term() {
        let mut selector = EveryNOrDocFreqTermSelector::new(100, 4);
        assert!(selector.is_index_term(b"a", &TermStats::new(1, 1)));
        assert!(!selector.is_index_term(b"b", &TermStats::new(1, 1)));
        assert!(selector.is_index_term(b"c", &TermStats::new(100, 200)));
        assert!(!selector.is_index_term(b"d", &TermStats::new(99, 99)));
    }

    #[test]
    fn test_indexed_prefix_length() {
        assert_eq!(indexed_prefix_length(b"", b"abc"), 1);
        assert_eq!(indexed_prefix_length(b"abc", b"abd"), 3);
        assert_eq!(indexed_prefix_length(b"abc", b"abcd"), 4);
        assert_eq!(indexed_prefix_length(b"abczzz", b"abd"), 3);
        // prior is a long shared run; prefix capped at the term length
        assert_eq!(indexed_prefix_length(b"ab", b"ab"), 2);
    }
}
