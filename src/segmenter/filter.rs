//! Final-path token normalization.

use crate::segmenter::chars::COMMON_DELIMITER;
use crate::segmenter::graph::{SegToken, WordType};

/// Normalizes tokens on the chosen segmentation path: full-width digits and
/// letters fold to half-width, Latin letters lowercase, and every delimiter
/// collapses to the one canonical delimiter string. Applied after path
/// extraction only, never during graph construction.
#[derive(Debug, Clone, Default)]
pub struct SegTokenFilter;

impl SegTokenFilter {
    pub fn new() -> SegTokenFilter {
        SegTokenFilter
    }

    pub fn filter(&self, mut token: SegToken) -> SegToken {
        match token.word_type {
            WordType::FullwidthNumber | WordType::FullwidthString => {
                for c in token.chars.iter_mut() {
                    let mut u = *c as u32;
                    if u >= 0xFF10 {
                        u -= 0xFEE0;
                    }
                    if (0x41..=0x5A).contains(&u) {
                        u += 0x20;
                    }
                    *c = char::from_u32(u).unwrap_or(*c);
                }
            }
            WordType::LatinString => {
                for c in token.chars.iter_mut() {
                    *c = c.to_ascii_lowercase();
                }
            }
            WordType::Delimiter => {
                token.chars = vec![COMMON_DELIMITER];
            }
            _ => {}
        }
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, word_type: WordType) -> SegToken {
        SegToken::new(text.chars().collect(), 0, text.chars().count() as i32, word_type, 1)
    }

    #[test]
    fn fullwidth_digits_fold_to_ascii() {
        let out = SegTokenFilter::new().filter(token("０１２", WordType::FullwidthNumber));
        assert_eq!(out.text(), "012");
    }

    #[test]
    fn fullwidth_letters_fold_and_lowercase() {
        let out = SegTokenFilter::new().filter(token("ＡｂＣ", WordType::FullwidthString));
        assert_eq!(out.text(), "abc");
    }

    #[test]
    fn latin_lowercases_only() {
        let out = SegTokenFilter::new().filter(token("MiXeD42", WordType::LatinString));
        assert_eq!(out.text(), "mixed42");
    }

    #[test]
    fn any_delimiter_becomes_canonical() {
        for text in ["。", "!", "——"] {
            let out = SegTokenFilter::new().filter(token(text, WordType::Delimiter));
            assert_eq!(out.text(), ",");
        }
    }

    #[test]
    fn chinese_words_pass_through() {
        let out = SegTokenFilter::new().filter(token("天气", WordType::ChineseWord));
        assert_eq!(out.text(), "天气");
    }
}
