//! Core word dictionary: per-head-character buckets of word tails with their
//! corpus frequencies, addressed through a double-hashed character index.
//!
//! The canonical source is a `coredict.dct` file in the legacy double-byte
//! regional encoding. A binary cache (`coredict.mem`) is written after the
//! first successful build and preferred on later loads; cache problems fall
//! back to rebuilding from the source, never to an error.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::GBK;
use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::{CamelliaError, Result};
use crate::segmenter::dictionary::{
    self, CHAR_NUM_IN_FILE, DELIMITER_CHAR_ID, GB2312_CHAR_NUM, GB2312_FIRST_CHAR,
    PRIME_INDEX_LENGTH,
};

const SOURCE_FILE: &str = "coredict.dct";
const CACHE_FILE: &str = "coredict.mem";

static SHARED: Mutex<Option<Arc<WordDictionary>>> = Mutex::new(None);

/// Frequency dictionary of known words, bucketed by head character.
///
/// Words are stored as tails (head character stripped) sorted per bucket, so
/// prefix scans over all words sharing a head are contiguous range walks.
#[derive(Debug)]
pub struct WordDictionary {
    // Double-hash index mapping head character -> bucket id. A '\0' entry in
    // char_index marks a free slot.
    word_index: Vec<i16>,
    char_index: Vec<char>,
    words: Vec<Option<Vec<Vec<char>>>>,
    freqs: Vec<Option<Vec<i32>>>,
}

impl WordDictionary {
    fn empty() -> WordDictionary {
        WordDictionary {
            word_index: vec![-1; PRIME_INDEX_LENGTH],
            char_index: vec!['\0'; PRIME_INDEX_LENGTH],
            words: (0..GB2312_CHAR_NUM).map(|_| None).collect(),
            freqs: (0..GB2312_CHAR_NUM).map(|_| None).collect(),
        }
    }

    /// Loads the dictionary from `dir`, preferring the binary cache when it
    /// is present and readable.
    pub fn load(dir: &Path) -> Result<WordDictionary> {
        let cache_path = dir.join(CACHE_FILE);
        if cache_path.is_file() {
            match WordDictionary::load_cache(&cache_path) {
                Ok(dict) => {
                    debug!("loaded word dictionary cache from {}", cache_path.display());
                    return Ok(dict);
                }
                Err(err) => {
                    warn!("ignoring unreadable word dictionary cache: {err}");
                }
            }
        }
        let mut dict = WordDictionary::empty();
        dict.load_source(&dir.join(SOURCE_FILE))?;
        dict.expand_delimiter_bucket();
        dict.merge_same_words();
        dict.sort_buckets();
        if let Err(err) = dict.save_cache(&cache_path) {
            warn!("failed to write word dictionary cache: {err}");
        }
        Ok(dict)
    }

    /// Process-wide shared instance, built at most once under a mutex.
    /// Reads after construction are lock-free through the returned `Arc`.
    pub fn shared(dir: &Path) -> Result<Arc<WordDictionary>> {
        let mut guard = SHARED.lock();
        if let Some(dict) = guard.as_ref() {
            return Ok(Arc::clone(dict));
        }
        let dict = Arc::new(WordDictionary::load(dir)?);
        *guard = Some(Arc::clone(&dict));
        Ok(dict)
    }

    /// Builds a dictionary directly from `(word, frequency)` pairs.
    pub fn from_entries<I, S>(entries: I) -> WordDictionary
    where
        I: IntoIterator<Item = (S, i32)>,
        S: AsRef<str>,
    {
        let mut dict = WordDictionary::empty();
        for (word, freq) in entries {
            let chars: Vec<char> = word.as_ref().chars().collect();
            let Some(&head) = chars.first() else { continue };
            let bucket = match dict.char_slot(head) {
                Some(slot) => dict.word_index[slot] as usize,
                None => {
                    let Some(id) = dict.free_bucket_for(head) else {
                        warn!("no dictionary bucket available for {head:?}; entry dropped");
                        continue;
                    };
                    dict.words[id] = Some(Vec::new());
                    dict.freqs[id] = Some(Vec::new());
                    dict.set_table_index(head, id);
                    id
                }
            };
            if let (Some(w), Some(f)) = (&mut dict.words[bucket], &mut dict.freqs[bucket]) {
                w.push(chars[1..].to_vec());
                f.push(freq);
            }
        }
        dict.sort_buckets();
        dict.merge_same_words();
        dict
    }

    fn free_bucket_for(&self, head: char) -> Option<usize> {
        match dictionary::gb2312_id(head) {
            Some(id) if self.words[id].is_none() => Some(id),
            _ => (0..GB2312_CHAR_NUM).find(|&id| self.words[id].is_none()),
        }
    }

    fn load_source(&mut self, path: &Path) -> Result<()> {
        let mut reader = BufReader::new(File::open(path)?);
        for id in GB2312_FIRST_CHAR..GB2312_FIRST_CHAR + CHAR_NUM_IN_FILE {
            let count = reader.read_i32::<LittleEndian>()?;
            if count <= 0 {
                continue;
            }
            let mut bucket_words = Vec::with_capacity(count as usize);
            let mut bucket_freqs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let frequency = reader.read_i32::<LittleEndian>()?;
                let byte_len = reader.read_i32::<LittleEndian>()?;
                let _handle = reader.read_i32::<LittleEndian>()?;
                let word = if byte_len > 0 {
                    let mut buf = vec![0u8; byte_len as usize];
                    reader.read_exact(&mut buf)?;
                    let (text, _, had_errors) = GBK.decode(&buf);
                    if had_errors {
                        return Err(CamelliaError::encoding(format!(
                            "undecodable dictionary entry in character slot {id}"
                        )));
                    }
                    text.chars().collect()
                } else {
                    Vec::new()
                };
                bucket_freqs.push(frequency);
                bucket_words.push(word);
            }
            self.words[id] = Some(bucket_words);
            self.freqs[id] = Some(bucket_freqs);
            let head = dictionary::char_for_gb2312_id(id);
            if let Some(c) = head.chars().next() {
                self.set_table_index(c, id);
            }
        }
        Ok(())
    }

    /// The `.dct` source keeps all single-character delimiter words in one
    /// shared bucket. Redistribute them to their own per-character buckets so
    /// lookup goes through the same path as ordinary words.
    fn expand_delimiter_bucket(&mut self) {
        let Some(delims) = self.words[DELIMITER_CHAR_ID].take() else { return };
        let delim_freqs = self.freqs[DELIMITER_CHAR_ID].take().unwrap_or_default();
        let mut i = 0;
        while i < delims.len() {
            let Some(&head) = delims[i].first() else {
                i += 1;
                continue;
            };
            let mut run_end = i;
            while run_end < delims.len() && delims[run_end].first() == Some(&head) {
                run_end += 1;
            }
            match dictionary::gb2312_id(head) {
                Some(id) if self.words[id].is_none() => {
                    let mut bucket_words = Vec::with_capacity(run_end - i);
                    let mut bucket_freqs = Vec::with_capacity(run_end - i);
                    for k in i..run_end {
                        bucket_words.push(delims[k][1..].to_vec());
                        bucket_freqs.push(delim_freqs.get(k).copied().unwrap_or(0));
                    }
                    self.words[id] = Some(bucket_words);
                    self.freqs[id] = Some(bucket_freqs);
                    self.set_table_index(head, id);
                }
                _ => {
                    warn!("cannot relocate delimiter entries headed by {head:?}");
                }
            }
            i = run_end;
        }
    }

    /// Collapses adjacent duplicate words within each bucket, accumulating
    /// their frequencies.
    fn merge_same_words(&mut self) {
        for id in 0..self.words.len() {
            let Some(bucket) = &self.words[id] else { continue };
            let Some(freqs) = &self.freqs[id] else { continue };
            if bucket.len() < 2 {
                continue;
            }
            let mut merged_words: Vec<Vec<char>> = Vec::with_capacity(bucket.len());
            let mut merged_freqs: Vec<i32> = Vec::with_capacity(bucket.len());
            for (word, &freq) in bucket.iter().zip(freqs) {
                match merged_words.last() {
                    Some(last) if last == word => {
                        if let Some(f) = merged_freqs.last_mut() {
                            *f += freq;
                        }
                    }
                    _ => {
                        merged_words.push(word.clone());
                        merged_freqs.push(freq);
                    }
                }
            }
            if merged_words.len() < bucket.len() {
                self.words[id] = Some(merged_words);
                self.freqs[id] = Some(merged_freqs);
            }
        }
    }

    fn sort_buckets(&mut self) {
        for id in 0..self.words.len() {
            let (Some(bucket), Some(freqs)) = (&mut self.words[id], &mut self.freqs[id]) else {
                continue;
            };
            if bucket.len() < 2 {
                continue;
            }
            let mut order: Vec<usize> = (0..bucket.len()).collect();
            order.sort_by(|&a, &b| dictionary::compare_chars(&bucket[a], 0, &bucket[b], 0));
            let sorted_words: Vec<Vec<char>> = order.iter().map(|&k| bucket[k].clone()).collect();
            let sorted_freqs: Vec<i32> = order.iter().map(|&k| freqs[k]).collect();
            *bucket = sorted_words;
            *freqs = sorted_freqs;
        }
    }

    /// Registers `head -> bucket` in the character index. Probe exhaustion is
    /// logged and the entry dropped; lookups for it will simply miss.
    fn set_table_index(&mut self, head: char, bucket: usize) {
        let slot = dictionary::probe(
            PRIME_INDEX_LENGTH,
            dictionary::hash1(&[head]),
            dictionary::hash2(&[head]),
            |s| self.char_index[s] != '\0',
            |s| self.char_index[s] == head,
        );
        match slot {
            Some(s) => {
                self.char_index[s] = head;
                self.word_index[s] = bucket as i16;
            }
            None => warn!("character index full; dropping head {head:?}"),
        }
    }

    fn char_slot(&self, head: char) -> Option<usize> {
        dictionary::probe(
            PRIME_INDEX_LENGTH,
            dictionary::hash1(&[head]),
            dictionary::hash2(&[head]),
            |s| self.char_index[s] != '\0',
            |s| self.char_index[s] == head,
        )
        .filter(|&s| self.char_index[s] == head)
    }

    fn bucket_of(&self, head: char) -> Option<usize> {
        let slot = self.char_slot(head)?;
        let bucket = self.word_index[slot];
        if bucket < 0 { None } else { Some(bucket as usize) }
    }

    /// Corpus frequency of `word`, or 0 when it is unknown.
    pub fn get_frequency(&self, word: &[char]) -> i32 {
        let Some(&head) = word.first() else { return 0 };
        let Some(bucket) = self.bucket_of(head) else { return 0 };
        let (Some(words), Some(freqs)) = (&self.words[bucket], &self.freqs[bucket]) else {
            return 0;
        };
        match words.binary_search_by(|item| dictionary::compare_chars(item, 0, word, 1)) {
            Ok(item) => freqs.get(item).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// True when the bucket item at `item_index` spells exactly `word` (head
    /// character excluded, as stored).
    pub fn is_equal(&self, word: &[char], item_index: usize) -> bool {
        let Some(&head) = word.first() else { return false };
        let Some(bucket) = self.bucket_of(head) else { return false };
        let Some(words) = &self.words[bucket] else { return false };
        words
            .get(item_index)
            .is_some_and(|item| dictionary::compare_chars(word, 1, item, 0).is_eq())
    }

    /// Finds the first bucket item at or after `known_start` that `word` is a
    /// prefix of. Because buckets are sorted, a longer prefix can only match
    /// at or after the index its shorter form matched at.
    pub fn get_prefix_match(&self, word: &[char], known_start: usize) -> Option<usize> {
        let Some(&head) = word.first() else { return None };
        let bucket = self.bucket_of(head)?;
        let words = self.words[bucket].as_ref()?;
        let mut start = known_start as i64;
        let mut end = words.len() as i64 - 1;
        while start <= end {
            let mid = ((start + end) / 2) as usize;
            match dictionary::compare_prefix(word, 1, &words[mid], 0) {
                std::cmp::Ordering::Equal => {
                    // Walk back to the first matching item, never past
                    // `known_start`.
                    let mut first = mid;
                    while first > known_start
                        && dictionary::compare_prefix(word, 1, &words[first - 1], 0).is_eq()
                    {
                        first -= 1;
                    }
                    return Some(first);
                }
                std::cmp::Ordering::Less => end = mid as i64 - 1,
                std::cmp::Ordering::Greater => start = mid as i64 + 1,
            }
        }
        None
    }

    fn load_cache(path: &Path) -> Result<WordDictionary> {
        let mut r = BufReader::new(File::open(path)?);
        let index_len = r.read_i32::<LittleEndian>()?;
        if index_len != PRIME_INDEX_LENGTH as i32 {
            return Err(CamelliaError::corrupt(format!(
                "word dictionary cache {}: index length {index_len}",
                path.display()
            )));
        }
        let mut dict = WordDictionary::empty();
        for slot in dict.word_index.iter_mut() {
            *slot = r.read_i16::<LittleEndian>()?;
        }
        let char_len = r.read_i32::<LittleEndian>()?;
        if char_len != PRIME_INDEX_LENGTH as i32 {
            return Err(CamelliaError::corrupt(format!(
                "word dictionary cache {}: char index length {char_len}",
                path.display()
            )));
        }
        for slot in dict.char_index.iter_mut() {
            *slot = read_char16(&mut r)?;
        }
        let dim1 = r.read_i32::<LittleEndian>()?;
        if dim1 != GB2312_CHAR_NUM as i32 {
            return Err(CamelliaError::corrupt(format!(
                "word dictionary cache {}: bucket count {dim1}",
                path.display()
            )));
        }
        for id in 0..GB2312_CHAR_NUM {
            let dim2 = r.read_i32::<LittleEndian>()?;
            if dim2 < 0 {
                continue;
            }
            let mut bucket = Vec::with_capacity(dim2 as usize);
            for _ in 0..dim2 {
                let dim3 = r.read_i32::<LittleEndian>()?;
                let mut word = Vec::new();
                if dim3 > 0 {
                    word.reserve(dim3 as usize);
                    for _ in 0..dim3 {
                        word.push(read_char16(&mut r)?);
                    }
                }
                bucket.push(word);
            }
            dict.words[id] = Some(bucket);
        }
        let f_dim1 = r.read_i32::<LittleEndian>()?;
        if f_dim1 != GB2312_CHAR_NUM as i32 {
            return Err(CamelliaError::corrupt(format!(
                "word dictionary cache {}: frequency bucket count {f_dim1}",
                path.display()
            )));
        }
        for id in 0..GB2312_CHAR_NUM {
            let f_dim2 = r.read_i32::<LittleEndian>()?;
            if f_dim2 < 0 {
                continue;
            }
            let mut bucket = Vec::with_capacity(f_dim2 as usize);
            for _ in 0..f_dim2 {
                bucket.push(r.read_i32::<LittleEndian>()?);
            }
            dict.freqs[id] = Some(bucket);
        }
        Ok(dict)
    }

    fn save_cache(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_i32::<LittleEndian>(PRIME_INDEX_LENGTH as i32)?;
        for &slot in &self.word_index {
            w.write_i16::<LittleEndian>(slot)?;
        }
        w.write_i32::<LittleEndian>(PRIME_INDEX_LENGTH as i32)?;
        for &c in &self.char_index {
            w.write_u16::<LittleEndian>((c as u32 & 0xFFFF) as u16)?;
        }
        w.write_i32::<LittleEndian>(GB2312_CHAR_NUM as i32)?;
        for bucket in &self.words {
            match bucket {
                None => w.write_i32::<LittleEndian>(-1)?,
                Some(items) => {
                    w.write_i32::<LittleEndian>(items.len() as i32)?;
                    for word in items {
                        w.write_i32::<LittleEndian>(word.len() as i32)?;
                        for &c in word {
                            w.write_u16::<LittleEndian>((c as u32 & 0xFFFF) as u16)?;
                        }
                    }
                }
            }
        }
        w.write_i32::<LittleEndian>(GB2312_CHAR_NUM as i32)?;
        for bucket in &self.freqs {
            match bucket {
                None => w.write_i32::<LittleEndian>(-1)?,
                Some(freqs) => {
                    w.write_i32::<LittleEndian>(freqs.len() as i32)?;
                    for &f in freqs {
                        w.write_i32::<LittleEndian>(f)?;
                    }
                }
            }
        }
        w.flush()?;
        Ok(())
    }
}

fn read_char16<R: Read>(r: &mut R) -> Result<char> {
    let unit = r.read_u16::<LittleEndian>()?;
    char::from_u32(unit as u32).ok_or_else(|| {
        CamelliaError::corrupt(format!("invalid character unit {unit:#06x} in dictionary cache"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn sample() -> WordDictionary {
        WordDictionary::from_entries([
            ("天", 100),
            ("天气", 500),
            ("天空", 200),
            ("气", 80),
            ("空", 60),
        ])
    }

    #[test]
    fn frequency_lookup() {
        let dict = sample();
        assert_eq!(dict.get_frequency(&chars("天气")), 500);
        assert_eq!(dict.get_frequency(&chars("天")), 100);
        assert_eq!(dict.get_frequency(&chars("地")), 0);
    }

    #[test]
    fn duplicate_entries_accumulate() {
        let dict = WordDictionary::from_entries([("天气", 500), ("天气", 300)]);
        assert_eq!(dict.get_frequency(&chars("天气")), 800);
    }

    #[test]
    fn prefix_match_walks_extensions() {
        let dict = sample();
        let word = chars("天");
        let first = dict.get_prefix_match(&word, 0).unwrap();
        // The empty tail for "天" itself sorts first under its head.
        assert!(dict.is_equal(&word, first));
        let longer = chars("天气");
        let next = dict.get_prefix_match(&longer, first).unwrap();
        assert!(dict.is_equal(&longer, next));
        assert!(dict.get_prefix_match(&chars("天马"), 0).is_none());
    }

    #[test]
    fn prefix_match_never_returns_below_known_start() {
        let dict = sample();
        // "天" is a prefix of every item in its bucket ("", "气", "空" tails),
        // so an unbounded walk-back would always land on item 0.
        let word = chars("天");
        assert_eq!(dict.get_prefix_match(&word, 0), Some(0));
        assert_eq!(dict.get_prefix_match(&word, 1), Some(1));
        assert_eq!(dict.get_prefix_match(&word, 2), Some(2));
    }

    #[test]
    fn cache_round_trip() {
        let dict = sample();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coredict.mem");
        dict.save_cache(&path).unwrap();
        let reloaded = WordDictionary::load_cache(&path).unwrap();
        assert_eq!(reloaded.get_frequency(&chars("天气")), 500);
        assert_eq!(reloaded.get_frequency(&chars("空")), 60);
        assert_eq!(reloaded.get_frequency(&chars("雨")), 0);
    }

    #[test]
    fn corrupt_cache_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coredict.mem");
        std::fs::write(&path, [1, 2, 3, 4, 5]).unwrap();
        assert!(WordDictionary::load_cache(&path).is_err());
    }
}
