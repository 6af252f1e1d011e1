//! Shared hashing and transcoding primitives for the segmentation
//! dictionaries.
//!
//! Both dictionary tables use open addressing with double hashing. The two
//! hash functions fold the low byte and then the high byte of each UTF-16
//! code unit into the running hash, so their values are stable across
//! platforms and match the historical on-disk tables bit for bit.

use std::cmp::Ordering;

use encoding_rs::GBK;

/// Capacity of the per-character word index table.
pub const PRIME_INDEX_LENGTH: usize = 12071;

/// Capacity of the bigram frequency table.
pub const PRIME_BIGRAM_LENGTH: usize = 402_137;

/// GB2312 id of the first hanzi slot in a `.dct` file.
pub const GB2312_FIRST_CHAR: usize = 1410;

/// Number of character slots stored in a `.dct` file.
pub const CHAR_NUM_IN_FILE: usize = 6768;

/// Total number of addressable GB2312 characters (87 rows of 94 cells).
pub const GB2312_CHAR_NUM: usize = 87 * 94;

/// GB2312 id of the shared delimiter bucket in a `.dct` file.
pub const DELIMITER_CHAR_ID: usize = 3755 + GB2312_FIRST_CHAR;

/// Corpus-size normalization constant for frequency smoothing.
pub const MAX_FREQUENCY: i32 = 2_079_997 + 80_000;

const FNV_PRIME: i64 = 1_099_511_628_211;
const FNV_BASIS: i64 = 0xcbf2_9ce4_8422_2325_u64 as i64;

fn utf16_unit(c: char) -> u32 {
    // Dictionary keys are BMP characters; folding the low 16 bits keeps the
    // hash identical to a UTF-16 based implementation for them.
    (c as u32) & 0xFFFF
}

/// FNV-1 style 64-bit hash with an avalanche-mixing tail.
pub fn hash1(chars: &[char]) -> i64 {
    let mut hash = FNV_BASIS;
    for &c in chars {
        let unit = utf16_unit(c);
        hash = (hash ^ (unit & 0xFF) as i64).wrapping_mul(FNV_PRIME);
        hash = (hash ^ (unit >> 8) as i64).wrapping_mul(FNV_PRIME);
    }
    hash = hash.wrapping_add(hash << 13);
    hash ^= hash >> 7;
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 17;
    hash.wrapping_add(hash << 5)
}

/// djb2 style 32-bit hash over the same byte sequence as [`hash1`].
pub fn hash2(chars: &[char]) -> i32 {
    let mut hash: i32 = 5381;
    for &c in chars {
        let unit = utf16_unit(c);
        hash = (hash << 5).wrapping_add(hash).wrapping_add((unit & 0xFF) as i32);
        hash = (hash << 5).wrapping_add(hash).wrapping_add((unit >> 8) as i32);
    }
    hash
}

/// Maps a character to its GB2312 id, or `None` when the character has no
/// two-byte GB2312 encoding.
pub fn gb2312_id(c: char) -> Option<usize> {
    let mut buf = [0u8; 4];
    let (bytes, _, had_errors) = GBK.encode(c.encode_utf8(&mut buf));
    if had_errors || bytes.len() != 2 {
        return None;
    }
    let b0 = bytes[0] as i32 - 161;
    let b1 = bytes[1] as i32 - 161;
    if (0..87).contains(&b0) && (0..94).contains(&b1) {
        Some((b0 * 94 + b1) as usize)
    } else {
        None
    }
}

/// Maps a GB2312 id back to its character.
///
/// Returns an empty string when the id is out of range or the runtime cannot
/// transcode the legacy encoding. This is a documented degradation, not an
/// error: callers skip the affected slot.
pub fn char_for_gb2312_id(ccid: usize) -> String {
    if ccid > GB2312_CHAR_NUM {
        return String::new();
    }
    let buffer = [(ccid / 94 + 161) as u8, (ccid % 94 + 161) as u8];
    let (text, _, had_errors) = GBK.decode(&buffer);
    if had_errors { String::new() } else { text.into_owned() }
}

/// Lexicographic comparison of two character slices starting at the given
/// offsets. A shorter slice that matches a prefix of the longer compares as
/// less.
pub fn compare_chars(l: &[char], l_start: usize, r: &[char], r_start: usize) -> Ordering {
    let mut li = l_start;
    let mut ri = r_start;
    while li < l.len() && ri < r.len() {
        match l[li].cmp(&r[ri]) {
            Ordering::Equal => {
                li += 1;
                ri += 1;
            }
            other => return other,
        }
    }
    match (li == l.len(), ri == r.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => unreachable!(),
    }
}

/// Prefix comparison: `Equal` when `prefix[prefix_start..]` is a prefix of
/// `word[word_start..]`, otherwise the ordering of the first mismatch. A word
/// that runs out before the prefix does compares as less than the prefix.
pub fn compare_prefix(prefix: &[char], prefix_start: usize, word: &[char], word_start: usize) -> Ordering {
    let mut pi = prefix_start;
    let mut wi = word_start;
    while pi < prefix.len() && wi < word.len() && prefix[pi] == word[wi] {
        pi += 1;
        wi += 1;
    }
    if pi == prefix.len() {
        Ordering::Equal
    } else if wi == word.len() {
        Ordering::Greater
    } else {
        prefix[pi].cmp(&word[wi])
    }
}

/// Double-hash probe over a table where `occupied(slot)` reports a used slot
/// and `matches(slot)` reports the key we are looking for. Returns the first
/// slot that is free or a match, or `None` when `P` probes are exhausted.
pub(crate) fn probe<O, M>(prime: usize, h1: i64, h2: i32, occupied: O, matches: M) -> Option<usize>
where
    O: Fn(usize) -> bool,
    M: Fn(usize) -> bool,
{
    let p = prime as i64;
    let mut start = h1 % p;
    if start < 0 {
        start += p;
    }
    let mut step = (h2 as i64) % p;
    if step < 0 {
        step += p;
    }
    let mut index = start as usize;
    let mut i: i64 = 1;
    while occupied(index) && !matches(index) && i < p {
        index = ((start + i * step) % p) as usize;
        i += 1;
    }
    if i < p && (!occupied(index) || matches(index)) {
        Some(index)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash1_differs_per_character_order() {
        let a = hash1(&['天', '气']);
        let b = hash1(&['气', '天']);
        assert_ne!(a, b);
        assert_eq!(a, hash1(&['天', '气']));
    }

    #[test]
    fn hash2_matches_djb2_by_hand() {
        // '0' is U+0030: low byte 0x30, high byte 0x00.
        let expected = {
            let h = 5381i32 * 33 + 0x30;
            h * 33
        };
        assert_eq!(hash2(&['0']), expected);
    }

    #[test]
    fn gb2312_round_trip() {
        let id = gb2312_id('中').unwrap();
        assert_eq!(char_for_gb2312_id(id), "中");
        assert!(gb2312_id('a').is_none());
    }

    #[test]
    fn compare_chars_offsets() {
        let full: Vec<char> = "天气".chars().collect();
        let tail: Vec<char> = "气".chars().collect();
        assert_eq!(compare_chars(&full, 1, &tail, 0), Ordering::Equal);
        assert_eq!(compare_chars(&full, 0, &tail, 0), Ordering::Less);
    }

    #[test]
    fn compare_prefix_semantics() {
        let word: Vec<char> = "abc".chars().collect();
        let prefix: Vec<char> = "xab".chars().collect();
        assert_eq!(compare_prefix(&prefix, 1, &word, 0), Ordering::Equal);
        let longer: Vec<char> = "xabcd".chars().collect();
        assert_eq!(compare_prefix(&longer, 1, &word, 0), Ordering::Greater);
    }

    #[test]
    fn probe_reaches_key_within_capacity() {
        // A tiny table with forced collisions still terminates.
        let table = [7i64, 7, 0, 7, 7];
        let slot = probe(5, 3, 4, |s| table[s] != 0, |_| false);
        assert_eq!(slot, Some(2));
        let none = probe(5, 0, 5, |_| true, |_| false);
        assert_eq!(none, None);
    }
}
