//! Candidate-token graph over one input sentence.

use std::collections::BTreeMap;

/// Token class carried through graph construction and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordType {
    SentenceBegin,
    SentenceEnd,
    ChineseWord,
    LatinString,
    Number,
    Delimiter,
    FullwidthString,
    FullwidthNumber,
}

/// A candidate token spanning `[start, end)` of the sentence.
///
/// The synthetic begin marker spans `[-1, 0)` and the end marker
/// `[length, length + 1)`; offsets are therefore signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegToken {
    pub chars: Vec<char>,
    pub start: i32,
    pub end: i32,
    pub word_type: WordType,
    pub weight: i32,
}

impl SegToken {
    pub fn new(chars: Vec<char>, start: i32, end: i32, word_type: WordType, weight: i32) -> SegToken {
        SegToken { chars, start, end, word_type, weight }
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }
}

/// Start offset -> candidate tokens beginning there. Tokens are only ever
/// appended, so per-offset insertion order is stable.
#[derive(Debug)]
pub struct SegGraph {
    starts: BTreeMap<i32, Vec<SegToken>>,
    max_start: i32,
}

impl SegGraph {
    pub fn new() -> SegGraph {
        SegGraph { starts: BTreeMap::new(), max_start: -1 }
    }

    pub fn add_token(&mut self, token: SegToken) {
        let start = token.start;
        self.starts.entry(start).or_default().push(token);
        if start > self.max_start {
            self.max_start = start;
        }
    }

    /// Greatest start offset seen so far.
    pub fn max_start(&self) -> i32 {
        self.max_start
    }

    pub fn is_start_exist(&self, start: i32) -> bool {
        self.starts.contains_key(&start)
    }

    pub fn start_list(&self, start: i32) -> Option<&[SegToken]> {
        self.starts.get(&start).map(Vec::as_slice)
    }

    /// Flattens all tokens ordered by start offset (per-offset insertion
    /// order preserved). The position in the returned list is the token's
    /// dense ordinal.
    pub fn make_index(&self) -> Vec<SegToken> {
        self.starts.values().flatten().cloned().collect()
    }
}

impl Default for SegGraph {
    fn default() -> SegGraph {
        SegGraph::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, start: i32, end: i32) -> SegToken {
        SegToken::new(text.chars().collect(), start, end, WordType::ChineseWord, 1)
    }

    #[test]
    fn index_orders_by_start_then_insertion() {
        let mut graph = SegGraph::new();
        graph.add_token(token("b", 1, 2));
        graph.add_token(token("a", 0, 1));
        graph.add_token(token("ab", 0, 2));
        let flat = graph.make_index();
        let texts: Vec<String> = flat.iter().map(SegToken::text).collect();
        assert_eq!(texts, ["a", "ab", "b"]);
        assert_eq!(graph.max_start(), 1);
    }

    #[test]
    fn negative_starts_come_first() {
        let mut graph = SegGraph::new();
        graph.add_token(token("x", 0, 1));
        graph.add_token(token("begin", -1, 0));
        let flat = graph.make_index();
        assert_eq!(flat[0].text(), "begin");
        assert!(graph.is_start_exist(-1));
        assert_eq!(graph.max_start(), 0);
    }
}
