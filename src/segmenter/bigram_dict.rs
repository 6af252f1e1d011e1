//! Bigram frequency dictionary: open-addressed table keyed by the 64-bit
//! hash of `left @ right` word pairs.
//!
//! Only the hash and the accumulated frequency are kept, so distinct pairs
//! that collide on the full 64-bit hash share a slot. The table layout and
//! probe order match the historical binary cache exactly.

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
    self, CHAR_NUM_IN_FILE, DELIMITER_CHAR_ID, GB2312_FIRST_CHAR, PRIME_BIGRAM_LENGTH,
};

/// Separator placed between the two words of a bigram key.
pub const WORD_SEGMENT_CHAR: char = '@';

const SOURCE_FILE: &str = "bigramdict.dct";
const CACHE_FILE: &str = "bigramdict.mem";

static SHARED: Mutex<Option<Arc<BigramDictionary>>> = Mutex::new(None);

/// Word-pair frequency table. A zero hash value marks an empty slot.
#[derive(Debug)]
pub struct BigramDictionary {
    hash_table: Vec<i64>,
    freq_table: Vec<i32>,
}

impl BigramDictionary {
    fn empty() -> BigramDictionary {
        BigramDictionary {
            hash_table: vec![0; PRIME_BIGRAM_LENGTH],
            freq_table: vec![0; PRIME_BIGRAM_LENGTH],
        }
    }

    /// Loads the dictionary from `dir`, preferring the binary cache.
    pub fn load(dir: &Path) -> Result<BigramDictionary> {
        let cache_path = dir.join(CACHE_FILE);
        if cache_path.is_file() {
            match BigramDictionary::load_cache(&cache_path) {
                Ok(dict) => {
                    debug!("loaded bigram dictionary cache from {}", cache_path.display());
                    return Ok(dict);
                }
                Err(err) => {
                    warn!("ignoring unreadable bigram dictionary cache: {err}");
                }
            }
        }
        let mut dict = BigramDictionary::empty();
        dict.load_source(&dir.join(SOURCE_FILE))?;
        if let Err(err) = dict.save_cache(&cache_path) {
            warn!("failed to write bigram dictionary cache: {err}");
        }
        Ok(dict)
    }

    /// Process-wide shared instance, built at most once under a mutex.
    pub fn shared(dir: &Path) -> Result<Arc<BigramDictionary>> {
        let mut guard = SHARED.lock();
        if let Some(dict) = guard.as_ref() {
            return Ok(Arc::clone(dict));
        }
        let dict = Arc::new(BigramDictionary::load(dir)?);
        *guard = Some(Arc::clone(&dict));
        Ok(dict)
    }

    /// Builds a dictionary directly from `("left@right", frequency)` pairs.
    pub fn from_entries<I, S>(entries: I) -> BigramDictionary
    where
        I: IntoIterator<Item = (S, i32)>,
        S: AsRef<str>,
    {
        let mut dict = BigramDictionary::empty();
        for (key, freq) in entries {
            let chars: Vec<char> = key.as_ref().chars().collect();
            dict.insert(&chars, freq);
        }
        dict
    }

    fn load_source(&mut self, path: &Path) -> Result<()> {
        let mut reader = BufReader::new(File::open(path)?);
        for id in GB2312_FIRST_CHAR..GB2312_FIRST_CHAR + CHAR_NUM_IN_FILE {
            let count = reader.read_i32::<LittleEndian>()?;
            if count <= 0 {
                continue;
            }
            for _ in 0..count {
                let frequency = reader.read_i32::<LittleEndian>()?;
                let byte_len = reader.read_i32::<LittleEndian>()?;
                let _handle = reader.read_i32::<LittleEndian>()?;
                if byte_len <= 0 {
                    continue;
                }
                let mut buf = vec![0u8; byte_len as usize];
                reader.read_exact(&mut buf)?;
                let (text, _, had_errors) = GBK.decode(&buf);
                if had_errors {
                    return Err(CamelliaError::encoding(format!(
                        "undecodable bigram entry in character slot {id}"
                    )));
                }
                // Entries outside the shared delimiter slot store only the
                // key's tail; the slot's own character is the head.
                let key: Vec<char> = if id == DELIMITER_CHAR_ID {
                    text.chars().collect()
                } else {
                    dictionary::char_for_gb2312_id(id).chars().chain(text.chars()).collect()
                };
                self.insert(&key, frequency);
            }
        }
        Ok(())
    }

    fn insert(&mut self, key: &[char], frequency: i32) {
        let hash_id = dictionary::hash1(key);
        let slot = dictionary::probe(
            PRIME_BIGRAM_LENGTH,
            hash_id,
            dictionary::hash2(key),
            |s| self.hash_table[s] != 0,
            |s| self.hash_table[s] == hash_id,
        );
        match slot {
            Some(s) => {
                if self.hash_table[s] == 0 {
                    self.hash_table[s] = hash_id;
                }
                self.freq_table[s] += frequency;
            }
            None => warn!("bigram table full; dropping entry {:?}", key.iter().collect::<String>()),
        }
    }

    /// Frequency of the joined pair `key`, or 0 when it is unknown.
    pub fn get_frequency(&self, key: &[char]) -> i32 {
        let hash_id = dictionary::hash1(key);
        let slot = dictionary::probe(
            PRIME_BIGRAM_LENGTH,
            hash_id,
            dictionary::hash2(key),
            |s| self.hash_table[s] != 0,
            |s| self.hash_table[s] == hash_id,
        );
        match slot {
            Some(s) if self.hash_table[s] == hash_id => self.freq_table[s],
            _ => 0,
        }
    }

    fn load_cache(path: &Path) -> Result<BigramDictionary> {
        let mut r = BufReader::new(File::open(path)?);
        let table_len = r.read_i32::<LittleEndian>()?;
        if table_len != PRIME_BIGRAM_LENGTH as i32 {
            return Err(CamelliaError::corrupt(format!(
                "bigram cache {}: table length {table_len}",
                path.display()
            )));
        }
        let mut dict = BigramDictionary::empty();
        for slot in dict.hash_table.iter_mut() {
            *slot = r.read_i64::<LittleEndian>()?;
        }
        let freq_len = r.read_i32::<LittleEndian>()?;
        if freq_len != PRIME_BIGRAM_LENGTH as i32 {
            return Err(CamelliaError::corrupt(format!(
                "bigram cache {}: frequency table length {freq_len}",
                path.display()
            )));
        }
        for slot in dict.freq_table.iter_mut() {
            *slot = r.read_i32::<LittleEndian>()?;
        }
        Ok(dict)
    }

    fn save_cache(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_i32::<LittleEndian>(PRIME_BIGRAM_LENGTH as i32)?;
        for &h in &self.hash_table {
            w.write_i64::<LittleEndian>(h)?;
        }
        w.write_i32::<LittleEndian>(PRIME_BIGRAM_LENGTH as i32)?;
        for &f in &self.freq_table {
            w.write_i32::<LittleEndian>(f)?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Joins two token texts into a bigram key with the separator between them.
pub fn join_bigram(left: &[char], right: &[char]) -> Vec<char> {
    let mut key = Vec::with_capacity(left.len() + right.len() + 1);
    key.extend_from_slice(left);
    key.push(WORD_SEGMENT_CHAR);
    key.extend_from_slice(right);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn lookup_and_miss() {
        let dict = BigramDictionary::from_entries([("天气@很好", 120), ("始##始@天气", 40)]);
        assert_eq!(dict.get_frequency(&chars("天气@很好")), 120);
        assert_eq!(dict.get_frequency(&chars("始##始@天气")), 40);
        assert_eq!(dict.get_frequency(&chars("天气@不好")), 0);
    }

    #[test]
    fn repeated_pairs_accumulate() {
        let dict = BigramDictionary::from_entries([("天气@很好", 100), ("天气@很好", 50)]);
        assert_eq!(dict.get_frequency(&chars("天气@很好")), 150);
    }

    #[test]
    fn join_inserts_separator() {
        assert_eq!(join_bigram(&chars("天气"), &chars("很好")), chars("天气@很好"));
    }

    #[test]
    fn cache_round_trip() {
        let dict = BigramDictionary::from_entries([("天气@很好", 7)]);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bigramdict.mem");
        dict.save_cache(&path).unwrap();
        let reloaded = BigramDictionary::load_cache(&path).unwrap();
        assert_eq!(reloaded.get_frequency(&chars("天气@很好")), 7);
        assert_eq!(reloaded.get_frequency(&chars("很好@天气")), 0);
    }
}
