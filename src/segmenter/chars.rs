//! Character classification for the segmentation graph builder.

/// Spelling of the synthetic sentence-begin token.
pub const SENTENCE_BEGIN: &str = "始##始";

/// Spelling of the synthetic sentence-end token.
pub const SENTENCE_END: &str = "末##末";

/// Canonical replacement text for delimiter tokens.
pub const COMMON_DELIMITER: char = ',';

/// Coarse character classes driving candidate-token generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharType {
    Delimiter,
    Letter,
    Digit,
    Hanzi,
    SpaceLike,
    FullwidthLetter,
    FullwidthDigit,
    Other,
}

/// Classifies a single character. Range checks are ordered so the narrow
/// classes win over the broad punctuation ranges that contain them.
pub fn char_type(c: char) -> CharType {
    let u = c as u32;
    if (0x4E00..=0x9FA5).contains(&u) {
        CharType::Hanzi
    } else if (0x41..=0x5A).contains(&u) || (0x61..=0x7A).contains(&u) {
        CharType::Letter
    } else if (0x30..=0x39).contains(&u) {
        CharType::Digit
    } else if c == ' ' || c == '\t' || c == '\r' || c == '\n' || u == 0x3000 {
        CharType::SpaceLike
    } else if (0x21..=0xBB).contains(&u) || (0x2010..=0x2642).contains(&u) || (0x3001..=0x301E).contains(&u) {
        CharType::Delimiter
    } else if (0xFF21..=0xFF3A).contains(&u) || (0xFF41..=0xFF5A).contains(&u) {
        CharType::FullwidthLetter
    } else if (0xFF10..=0xFF19).contains(&u) {
        CharType::FullwidthDigit
    } else if (0xFE30..=0xFF63).contains(&u) {
        CharType::Delimiter
    } else {
        CharType::Other
    }
}
