//! Bigram-weighted edge graph and shortest-path extraction.

use ahash::AHashMap;

use crate::error::{CamelliaError, Result};
use crate::segmenter::bigram_dict::{self, BigramDictionary};
use crate::segmenter::dictionary::MAX_FREQUENCY;
use crate::segmenter::graph::{SegGraph, SegToken};

const SMOOTH: f64 = 0.1;

/// One weighted edge between two token ordinals.
#[derive(Debug, Clone, PartialEq)]
pub struct SegTokenPair {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
}

/// Edges keyed by destination ordinal, over the dense token list produced by
/// [`SegGraph::make_index`]. Built once, consumed once by
/// [`BiSegGraph::shortest_path`].
#[derive(Debug)]
pub struct BiSegGraph {
    tokens: Vec<SegToken>,
    edges_to: AHashMap<usize, Vec<SegTokenPair>>,
}

impl BiSegGraph {
    /// Connects every token to all tokens at the nearest populated start
    /// offset at or after its end, weighting each edge by the smoothed
    /// log-space bigram cost.
    pub fn new(graph: &SegGraph, bigram_dict: &BigramDictionary) -> BiSegGraph {
        let tokens = graph.make_index();
        let mut edges_to: AHashMap<usize, Vec<SegTokenPair>> = AHashMap::new();
        let max_start = graph.max_start();
        let tiny = 1.0 / f64::from(MAX_FREQUENCY);

        // Ordinal of the first token at each populated start offset, in the
        // same flattening order as `tokens`.
        let mut first_ordinal: AHashMap<i32, usize> = AHashMap::new();
        for (ordinal, token) in tokens.iter().enumerate() {
            first_ordinal.entry(token.start).or_insert(ordinal);
        }

        let mut key = -1;
        while key <= max_start {
            let token_list = match graph.start_list(key) {
                Some(list) => list,
                None => {
                    key += 1;
                    continue;
                }
            };
            let base = first_ordinal.get(&key).copied().unwrap_or(0);
            for (idx, t1) in token_list.iter().enumerate() {
                let one_word_freq = f64::from(t1.weight);
                let mut next = t1.end;
                while next <= max_start && !graph.is_start_exist(next) {
                    next += 1;
                }
                let next_tokens = if next <= max_start { graph.start_list(next) } else { None };
                let Some(next_tokens) = next_tokens else {
                    // Nothing starts after this token; only the sentence-end
                    // marker legitimately reaches here. Later tokens in this
                    // start list would dead-end the same way.
                    break;
                };
                let next_base = first_ordinal.get(&next).copied().unwrap_or(0);
                for (offset, t2) in next_tokens.iter().enumerate() {
                    let pair = bigram_dict::join_bigram(&t1.chars, &t2.chars);
                    let word_pair_freq = f64::from(bigram_dict.get_frequency(&pair));
                    let weight = -(SMOOTH * (1.0 + one_word_freq) / f64::from(MAX_FREQUENCY)
                        + (1.0 - SMOOTH)
                            * ((1.0 - tiny) * word_pair_freq / (1.0 + one_word_freq) + tiny))
                        .ln();
                    let to = next_base + offset;
                    edges_to
                        .entry(to)
                        .or_default()
                        .push(SegTokenPair { from: base + idx, to, weight });
                }
            }
            key += 1;
        }

        BiSegGraph { tokens, edges_to }
    }

    /// Minimum-cost path from the begin marker (ordinal 0) to the last
    /// ordinal. Ties keep the first minimal predecessor encountered.
    ///
    /// Graph construction guarantees every non-begin ordinal has an incoming
    /// edge; a missing one means the graph is malformed and is reported as an
    /// error rather than a panic.
    pub fn shortest_path(&self) -> Result<Vec<SegToken>> {
        if self.tokens.is_empty() {
            return Ok(Vec::new());
        }
        let last = self.tokens.len() - 1;
        let mut weights = vec![0.0f64];
        let mut predecessors = vec![0usize];
        for current in 1..=last {
            let edges = self.edges_to.get(&current).filter(|e| !e.is_empty()).ok_or_else(|| {
                CamelliaError::illegal_state(format!(
                    "token {current} has no incoming edges; segmentation graph is disconnected"
                ))
            })?;
            let mut min_weight = f64::MAX;
            let mut min_from = 0usize;
            for edge in edges {
                let total = weights[edge.from] + edge.weight;
                if total < min_weight {
                    min_weight = total;
                    min_from = edge.from;
                }
            }
            weights.push(min_weight);
            predecessors.push(min_from);
        }
        let mut path = vec![last];
        let mut current = last;
        while current != 0 {
            current = predecessors[current];
            path.push(current);
        }
        path.reverse();
        Ok(path.into_iter().map(|ordinal| self.tokens[ordinal].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::graph::WordType;

    fn token(text: &str, start: i32, end: i32, weight: i32) -> SegToken {
        SegToken::new(text.chars().collect(), start, end, WordType::ChineseWord, weight)
    }

    fn four_node_graph() -> SegGraph {
        // Ordinals: 0 = begin, 1 = "ab", 2 = "a", 3 = "b", 4 = end.
        let mut graph = SegGraph::new();
        graph.add_token(token("begin", -1, 0, MAX_FREQUENCY));
        graph.add_token(token("ab", 0, 2, 10));
        graph.add_token(token("a", 0, 1, 1000));
        graph.add_token(token("b", 1, 2, 1000));
        graph.add_token(token("end", 2, 3, MAX_FREQUENCY));
        graph
    }

    #[test]
    fn prefers_analytically_cheaper_path() {
        // A strong bigram for "a"->"b" plus high unigram weights makes the
        // two-token split cheaper than the single compound token.
        let bigrams = BigramDictionary::from_entries([("a@b", 2_000_000)]);
        let bi = BiSegGraph::new(&four_node_graph(), &bigrams);
        let path = bi.shortest_path().unwrap();
        let texts: Vec<String> = path.iter().map(SegToken::text).collect();
        assert_eq!(texts, ["begin", "a", "b", "end"]);
    }

    #[test]
    fn falls_back_to_compound_without_bigram_evidence() {
        // With no observed bigrams, the path with fewer edges and the higher
        // unigram-smoothed terms is not automatic; verify against the hand
        // computation: both "ab" and "a" edges from begin cost the same
        // smoothed constant, but "a"->"b" adds a nearly-zero-probability hop
        // while "ab"->"end" and "b"->"end" tie, so the compound token wins.
        let bigrams = BigramDictionary::from_entries([] as [(&str, i32); 0]);
        let bi = BiSegGraph::new(&four_node_graph(), &bigrams);
        let path = bi.shortest_path().unwrap();
        let texts: Vec<String> = path.iter().map(SegToken::text).collect();
        assert_eq!(texts, ["begin", "ab", "end"]);
    }

    #[test]
    fn disconnected_graph_is_an_error() {
        // A token list with a gap no edge can bridge: the second start offset
        // begins before the first token ends, so nothing connects to it.
        let mut graph = SegGraph::new();
        graph.add_token(token("begin", -1, 0, MAX_FREQUENCY));
        graph.add_token(token("xyz", 0, 3, 10));
        graph.add_token(token("y", 1, 2, 10));
        graph.add_token(token("end", 3, 4, MAX_FREQUENCY));
        let bigrams = BigramDictionary::from_entries([] as [(&str, i32); 0]);
        let bi = BiSegGraph::new(&graph, &bigrams);
        assert!(bi.shortest_path().is_err());
    }
}
