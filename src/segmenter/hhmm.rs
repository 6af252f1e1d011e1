//! Hidden-Markov-model word segmenter: builds the candidate graph for a
//! sentence, scores token transitions with the bigram model, and extracts
//! the minimum-cost path.

use std::sync::Arc;

use log::trace;

use crate::error::Result;
use crate::segmenter::bigram_dict::BigramDictionary;
use crate::segmenter::bigram_graph::BiSegGraph;
use crate::segmenter::chars::{self, CharType};
use crate::segmenter::dictionary::MAX_FREQUENCY;
use crate::segmenter::filter::SegTokenFilter;
use crate::segmenter::graph::{SegGraph, SegToken, WordType};
use crate::segmenter::word_dict::WordDictionary;

/// Sentence segmenter over caller-supplied dictionaries. Cheap to clone;
/// the dictionaries are shared read-only.
#[derive(Debug, Clone)]
pub struct HhmmSegmenter {
    word_dict: Arc<WordDictionary>,
    bigram_dict: Arc<BigramDictionary>,
    filter: SegTokenFilter,
}

impl HhmmSegmenter {
    pub fn new(word_dict: Arc<WordDictionary>, bigram_dict: Arc<BigramDictionary>) -> HhmmSegmenter {
        HhmmSegmenter { word_dict, bigram_dict, filter: SegTokenFilter::new() }
    }

    /// Returns the raw minimum-cost path for one sentence, including the
    /// synthetic begin/end markers and with no normalization applied.
    pub fn process(&self, sentence: &str) -> Result<Vec<SegToken>> {
        let graph = self.build_graph(sentence);
        let bi_graph = BiSegGraph::new(&graph, &self.bigram_dict);
        let path = bi_graph.shortest_path()?;
        trace!("segmented {} chars into {} tokens", sentence.chars().count(), path.len());
        Ok(path)
    }

    /// Segments one sentence into normalized word tokens, dropping the
    /// sentence markers.
    pub fn segment(&self, sentence: &str) -> Result<Vec<SegToken>> {
        let mut path = self.process(sentence)?;
        path.pop();
        if !path.is_empty() {
            path.remove(0);
        }
        Ok(path.into_iter().map(|t| self.filter.filter(t)).collect())
    }

    /// Builds the candidate graph: every viable token for every position,
    /// plus the synthetic sentence markers at offsets -1 and `length`.
    fn build_graph(&self, sentence: &str) -> SegGraph {
        let chars: Vec<char> = sentence.chars().collect();
        let types: Vec<CharType> = chars.iter().map(|&c| chars::char_type(c)).collect();
        let length = chars.len();
        let mut graph = SegGraph::new();

        let mut i = 0;
        while i < length {
            match types[i] {
                CharType::SpaceLike => {
                    i += 1;
                }
                CharType::Hanzi => {
                    self.add_hanzi_candidates(&mut graph, &chars, &types, i);
                    i += 1;
                }
                CharType::Letter | CharType::FullwidthLetter => {
                    let mut has_fullwidth = types[i] == CharType::FullwidthLetter;
                    let mut j = i + 1;
                    while j < length
                        && matches!(types[j], CharType::Letter | CharType::FullwidthLetter)
                    {
                        if types[j] == CharType::FullwidthLetter {
                            has_fullwidth = true;
                        }
                        j += 1;
                    }
                    let word_type =
                        if has_fullwidth { WordType::FullwidthString } else { WordType::LatinString };
                    graph.add_token(SegToken::new(
                        chars[i..j].to_vec(),
                        i as i32,
                        j as i32,
                        word_type,
                        MAX_FREQUENCY,
                    ));
                    i = j;
                }
                CharType::Digit | CharType::FullwidthDigit => {
                    let mut has_fullwidth = types[i] == CharType::FullwidthDigit;
                    let mut j = i + 1;
                    while j < length
                        && matches!(types[j], CharType::Digit | CharType::FullwidthDigit)
                    {
                        if types[j] == CharType::FullwidthDigit {
                            has_fullwidth = true;
                        }
                        j += 1;
                    }
                    let word_type =
                        if has_fullwidth { WordType::FullwidthNumber } else { WordType::Number };
                    graph.add_token(SegToken::new(
                        chars[i..j].to_vec(),
                        i as i32,
                        j as i32,
                        word_type,
                        MAX_FREQUENCY,
                    ));
                    i = j;
                }
                CharType::Delimiter => {
                    graph.add_token(SegToken::new(
                        vec![chars[i]],
                        i as i32,
                        (i + 1) as i32,
                        WordType::Delimiter,
                        MAX_FREQUENCY,
                    ));
                    i += 1;
                }
                CharType::Other => {
                    graph.add_token(SegToken::new(
                        vec![chars[i]],
                        i as i32,
                        (i + 1) as i32,
                        WordType::LatinString,
                        MAX_FREQUENCY,
                    ));
                    i += 1;
                }
            }
        }

        graph.add_token(SegToken::new(
            chars::SENTENCE_BEGIN.chars().collect(),
            -1,
            0,
            WordType::SentenceBegin,
            MAX_FREQUENCY,
        ));
        graph.add_token(SegToken::new(
            chars::SENTENCE_END.chars().collect(),
            length as i32,
            (length + 1) as i32,
            WordType::SentenceEnd,
            MAX_FREQUENCY,
        ));
        graph
    }

    /// Adds the single-character token at `i` unconditionally, then every
    /// dictionary word starting there. Each prefix extension resumes the
    /// bucket scan from the previous match, so the whole expansion is one
    /// forward walk per head character.
    fn add_hanzi_candidates(
        &self,
        graph: &mut SegGraph,
        chars: &[char],
        types: &[CharType],
        i: usize,
    ) {
        let mut j = i + 1;
        let mut word = vec![chars[i]];
        let frequency = self.word_dict.get_frequency(&word);
        graph.add_token(SegToken::new(
            word.clone(),
            i as i32,
            j as i32,
            WordType::ChineseWord,
            frequency,
        ));

        let mut found = self.word_dict.get_prefix_match(&word, 0);
        while j <= chars.len() {
            let Some(found_index) = found else { break };
            if word.len() > 1 && self.word_dict.is_equal(&word, found_index) {
                let frequency = self.word_dict.get_frequency(&word);
                graph.add_token(SegToken::new(
                    word.clone(),
                    i as i32,
                    j as i32,
                    WordType::ChineseWord,
                    frequency,
                ));
            }
            while j < chars.len() && types[j] == CharType::SpaceLike {
                j += 1;
            }
            if j < chars.len() && types[j] == CharType::Hanzi {
                word.push(chars[j]);
                found = self.word_dict.get_prefix_match(&word, found_index);
                j += 1;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::bigram_dict::BigramDictionary;
    use crate::segmenter::word_dict::WordDictionary;

    fn segmenter() -> HhmmSegmenter {
        let words = WordDictionary::from_entries([
            ("天", 10_000),
            ("气", 8_000),
            ("天气", 50_000),
            ("很", 20_000),
            ("好", 30_000),
            ("很好", 40_000),
        ]);
        let bigrams = BigramDictionary::from_entries([
            ("始##始@天气", 5_000),
            ("天气@很好", 8_000),
            ("很好@末##末", 5_000),
        ]);
        HhmmSegmenter::new(Arc::new(words), Arc::new(bigrams))
    }

    fn texts(tokens: &[SegToken]) -> Vec<String> {
        tokens.iter().map(SegToken::text).collect()
    }

    #[test]
    fn dictionary_words_win_over_single_characters() {
        let seg = segmenter();
        let path = seg.process("天气很好").unwrap();
        assert_eq!(texts(&path), ["始##始", "天气", "很好", "末##末"]);
        let tokens = seg.segment("天气很好").unwrap();
        assert_eq!(texts(&tokens), ["天气", "很好"]);
    }

    #[test]
    fn segmentation_is_deterministic() {
        let seg = segmenter();
        let a = seg.segment("天气很好").unwrap();
        let b = seg.segment("天气很好").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ascii_runs_split_by_character_class() {
        let seg = segmenter();
        let tokens = seg.segment("Hello42world").unwrap();
        // Letters and digits form separate runs; no delimiters are present.
        assert_eq!(texts(&tokens), ["hello", "42", "world"]);
    }

    #[test]
    fn pure_letters_are_one_token() {
        let seg = segmenter();
        let tokens = seg.segment("HelloWorld").unwrap();
        assert_eq!(texts(&tokens), ["helloworld"]);
    }

    #[test]
    fn mixed_width_run_is_single_fullwidth_token() {
        let seg = segmenter();
        let tokens = seg.segment("aＢc").unwrap();
        assert_eq!(texts(&tokens), ["abc"]);
    }

    #[test]
    fn delimiters_are_canonicalized() {
        let seg = segmenter();
        let tokens = seg.segment("天气。很好").unwrap();
        assert_eq!(texts(&tokens), ["天气", ",", "很好"]);
    }

    #[test]
    fn spaces_are_skipped() {
        let seg = segmenter();
        let tokens = seg.segment("天气 很好").unwrap();
        assert_eq!(texts(&tokens), ["天气", "很好"]);
    }

    #[test]
    fn empty_input_yields_only_markers() {
        let seg = segmenter();
        let path = seg.process("").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].word_type, WordType::SentenceBegin);
        assert_eq!(path[1].word_type, WordType::SentenceEnd);
        assert!(seg.segment("").unwrap().is_empty());
    }
}
