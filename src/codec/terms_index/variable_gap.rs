//! Terms index with a pluggable sampling policy, backed by an FST.
//!
//! Selected terms are truncated to their minimal distinguishing prefix
//! and inserted into a byte-keyed finite state transducer whose output is
//! the block file pointer. The empty string and the first term of each
//! field are always indexed, so a floor lookup always lands somewhere.
//! FST iteration order has no cheap mapping to term ordinals, so this
//! index reports `supports_ord() == false`.

use std::sync::Arc;

use ahash::AHashMap;
use fst::raw::{Fst, Node, Output};
use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use log::debug;

use crate::codec::format;
use crate::codec::postings::{FieldInfo, TermStats};
use crate::codec::terms_index::{
    indexed_prefix_length, FieldIndexEnum, IndexTermSelector, TermsIndexReader, TermsIndexWriter,
};
use crate::error::{CamelliaError, Result};
use crate::storage::{Storage, StorageOutput};
use crate::storage::structured::StructWriter;

pub const CODEC_NAME: &str = "camellia_variable_gap_index";
pub const VERSION_START: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_START;

struct FieldEntry {
    field_number: u32,
    index_start: u64,
    index_len: u64,
}

struct FieldState {
    field_number: u32,
    builder: MapBuilder<Vec<u8>>,
    /// The term seen just before the current one; index prefixes are
    /// truncated against it, which also keeps them above the previous
    /// block's common prefix.
    last_term: Vec<u8>,
    first: bool,
}

pub struct VariableGapTermsIndexWriter {
    out: StructWriter<Box<dyn StorageOutput>>,
    selector: Box<dyn IndexTermSelector>,
    fields: Vec<FieldEntry>,
    current: Option<FieldState>,
    closed: bool,
}

impl VariableGapTermsIndexWriter {
    pub fn new(
        storage: &dyn Storage,
        name: &str,
        selector: Box<dyn IndexTermSelector>,
    ) -> Result<Self> {
        let output = storage.create_output(name)?;
        let mut out = StructWriter::new(output);
        if let Err(err) = format::write_header(&mut out, CODEC_NAME, VERSION_CURRENT) {
            let _ = out.get_mut().close();
            return Err(err);
        }
        Ok(Self {
            out,
            selector,
            fields: Vec::new(),
            current: None,
            closed: false,
        })
    }
}

fn build_error(err: fst::Error) -> CamelliaError {
    CamelliaError::illegal_state(format!("index term trie build failed: {err}"))
}

impl TermsIndexWriter for VariableGapTermsIndexWriter {
    fn start_field(&mut self, field: &FieldInfo, terms_start: u64) -> Result<()> {
        if self.current.is_some() {
            return Err(CamelliaError::illegal_state(
                "previous field was not finished",
            ));
        }
        self.selector.new_field(field);
        let mut builder = MapBuilder::memory();
        // the empty string always points at the field's first block
        builder.insert([], terms_start).map_err(build_error)?;
        self.current = Some(FieldState {
            field_number: field.number,
            builder,
            last_term: Vec::new(),
            first: true,
        });
        Ok(())
    }

    fn check_index_term(&mut self, term: &[u8], stats: &TermStats) -> Result<bool> {
        let Some(state) = self.current.as_mut() else {
            return Err(CamelliaError::illegal_state("no field started"));
        };
        if term.is_empty() {
            // already covered by the entry added in start_field
            return Ok(true);
        }
        // the first term per field is always indexed, whatever the policy says
        if self.selector.is_index_term(term, stats) || state.first {
            state.first = false;
            Ok(true)
        } else {
            state.last_term.clear();
            state.last_term.extend_from_slice(term);
            Ok(false)
        }
    }

    fn add_index_term(&mut self, term: &[u8], terms_fp: u64) -> Result<()> {
        let Some(state) = self.current.as_mut() else {
            return Err(CamelliaError::illegal_state("no field started"));
        };
        if term.is_empty() {
            return Ok(());
        }
        let prefix_len = indexed_prefix_length(&state.last_term, term);
        state
            .builder
            .insert(&term[..prefix_len], terms_fp)
            .map_err(build_error)?;
        state.last_term.clear();
        state.last_term.extend_from_slice(term);
        Ok(())
    }

    fn finish_field(&mut self) -> Result<()> {
        let Some(state) = self.current.take() else {
            return Err(CamelliaError::illegal_state("no field started"));
        };
        let bytes = state.builder.into_inner().map_err(build_error)?;
        let index_start = self.out.position();
        self.out.write_bytes(&bytes)?;
        self.fields.push(FieldEntry {
            field_number: state.field_number,
            index_start,
            index_len: bytes.len() as u64,
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let dir_start = self.out.position();
        self.out.write_vint(self.fields.len() as u32)?;
        for field in &self.fields {
            self.out.write_vint(field.field_number)?;
            self.out.write_vlong(field.index_start)?;
            self.out.write_vlong(field.index_len)?;
        }
        self.out.write_u64(dir_start)?;
        format::write_footer(&mut self.out)?;
        self.out.flush()?;
        self.out.get_mut().close()?;
        debug!("wrote variable-gap terms index: {} fields", self.fields.len());
        Ok(())
    }
}

impl Drop for VariableGapTermsIndexWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.finish();
        }
    }
}

pub struct VariableGapTermsIndexReader {
    divisor: usize,
    fields: AHashMap<u32, Arc<Map<Vec<u8>>>>,
}

impl VariableGapTermsIndexReader {
    /// Loads every field's FST. `divisor > 1` rebuilds each FST keeping
    /// only every Nth entry (the empty-string entry is always kept).
    pub fn open(storage: &dyn Storage, name: &str, divisor: usize) -> Result<Self> {
        if divisor == 0 {
            return Err(CamelliaError::illegal_state("index divisor must be > 0"));
        }
        let input = storage.open_input(name)?;
        let mut reader = crate::storage::structured::StructReader::new(input);
        format::verify_checksum(&mut reader)?;
        reader.seek(0)?;
        format::check_header(&mut reader, CODEC_NAME, VERSION_START, VERSION_CURRENT)?;

        let len = reader.len()?;
        reader.seek(len - format::FOOTER_LENGTH - 8)?;
        let dir_start = reader.read_u64()?;
        if dir_start >= len {
            return Err(CamelliaError::corrupt(format!(
                "directory offset {dir_start} past end of file (resource={name})"
            )));
        }
        reader.seek(dir_start)?;
        let num_fields = reader.read_vint()?;
        let mut entries = Vec::with_capacity(num_fields as usize);
        for _ in 0..num_fields {
            entries.push(FieldEntry {
                field_number: reader.read_vint()?,
                index_start: reader.read_vlong()?,
                index_len: reader.read_vlong()?,
            });
        }

        let mut fields = AHashMap::new();
        for entry in entries {
            reader.seek(entry.index_start)?;
            let mut bytes = vec![0u8; entry.index_len as usize];
            reader.read_bytes(&mut bytes)?;
            let mut map = Map::new(bytes).map_err(|e| {
                CamelliaError::corrupt(format!(
                    "unreadable index trie for field {} (resource={name}): {e}",
                    entry.field_number
                ))
            })?;
            if divisor > 1 {
                map = Self::sub_sample(&map, divisor)?;
            }
            if fields.insert(entry.field_number, Arc::new(map)).is_some() {
                return Err(CamelliaError::corrupt(format!(
                    "duplicate field number {} (resource={name})",
                    entry.field_number
                )));
            }
        }
        debug!(
            "loaded variable-gap terms index {name}: {} fields, divisor {divisor}",
            fields.len()
        );
        Ok(Self { divisor, fields })
    }

    fn sub_sample(map: &Map<Vec<u8>>, divisor: usize) -> Result<Map<Vec<u8>>> {
        let mut builder = MapBuilder::memory();
        let mut stream = map.stream();
        let mut count = 0usize;
        while let Some((key, value)) = stream.next() {
            if count % divisor == 0 {
                builder.insert(key, value).map_err(build_error)?;
            }
            count += 1;
        }
        let bytes = builder.into_inner().map_err(build_error)?;
        Map::new(bytes).map_err(build_error)
    }
}

impl TermsIndexReader for VariableGapTermsIndexReader {
    fn supports_ord(&self) -> bool {
        false
    }

    fn divisor(&self) -> usize {
        self.divisor
    }

    fn field_enum(&self, field_number: u32) -> Result<Box<dyn FieldIndexEnum>> {
        let map = self.fields.get(&field_number).cloned().ok_or_else(|| {
            CamelliaError::illegal_state(format!("field {field_number} has no terms index"))
        })?;
        Ok(Box::new(VariableGapFieldEnum {
            map,
            term: Vec::new(),
            positioned: false,
        }))
    }
}

struct VariableGapFieldEnum {
    map: Arc<Map<Vec<u8>>>,
    term: Vec<u8>,
    positioned: bool,
}

impl FieldIndexEnum for VariableGapFieldEnum {
    fn seek(&mut self, target: &[u8]) -> Result<u64> {
        let (term, fp) = floor_lookup(self.map.as_fst(), target).ok_or_else(|| {
            CamelliaError::corrupt("terms index has no entry at or below the target")
        })?;
        self.term = term;
        self.positioned = true;
        Ok(fp)
    }

    fn seek_ord(&mut self, _ord: u64) -> Result<u64> {
        Err(CamelliaError::unsupported(
            "variable-gap terms index cannot seek by ordinal",
        ))
    }

    fn next(&mut self) -> Result<Option<u64>> {
        let found = {
            let mut stream = if self.positioned {
                self.map.range().gt(self.term.as_slice()).into_stream()
            } else {
                self.map.range().into_stream()
            };
            stream.next().map(|(key, value)| (key.to_vec(), value))
        };
        match found {
            Some((key, value)) => {
                self.term = key;
                self.positioned = true;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn term(&self) -> &[u8] {
        &self.term
    }

    fn ord(&self) -> Result<u64> {
        Err(CamelliaError::unsupported(
            "variable-gap terms index has no term ordinals",
        ))
    }
}

/// Largest key <= `target` in the FST, with its output.
fn floor_lookup(fst: &Fst<Vec<u8>>, target: &[u8]) -> Option<(Vec<u8>, u64)> {
    let mut node = fst.root();
    let mut out = Output::zero();
    let mut path: Vec<(Node<'_>, Output)> = vec![(node, out)];
    let mut matched = 0;
    while matched < target.len() {
        match node.find_input(target[matched]) {
            Some(i) => {
                let t = node.transition(i);
                out = out.cat(t.out);
                node = fst.node(t.addr);
                matched += 1;
                path.push((node, out));
            }
            None => break,
        }
    }
    if matched == target.len() && node.is_final() {
        return Some((target.to_vec(), out.cat(node.final_output()).value()));
    }

    // back out: at each depth, the largest branch strictly below the
    // target byte wins; failing that, a final state at the prefix itself
    let mut depth = matched;
    loop {
        let (n, acc) = path[depth];
        if depth < target.len() {
            let bound = target[depth];
            let mut pick = None;
            for i in 0..n.len() {
                let t = n.transition(i);
                if t.inp < bound {
                    pick = Some(t);
                } else {
                    break;
                }
            }
            if let Some(t) = pick {
                let mut prefix = target[..depth].to_vec();
                prefix.push(t.inp);
                return Some(descend_max(fst, fst.node(t.addr), acc.cat(t.out), prefix));
            }
        }
        if n.is_final() && depth < target.len() {
            return Some((target[..depth].to_vec(), acc.cat(n.final_output()).value()));
        }
        if depth == 0 {
            return None;
        }
        depth -= 1;
    }
}

/// Follow the largest transition from `node` all the way down.
fn descend_max<'a>(
    fst: &'a Fst<Vec<u8>>,
    mut node: Node<'a>,
    mut out: Output,
    mut prefix: Vec<u8>,
) -> (Vec<u8>, u64) {
    while node.len() > 0 {
        let t = node.transition(node.len() - 1);
        prefix.push(t.inp);
        out = out.cat(t.out);
        node = fst.node(t.addr);
    }
    (prefix, out.cat(node.final_output()).value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::terms_index::EveryNTermSelector;
    use crate::storage::MemoryStorage;

    fn build_map(entries: &[(&[u8], u64)]) -> Map<Vec<u8>> {
        let mut builder = MapBuilder::memory();
        for (key, value) in entries {
            builder.insert(key, *value).unwrap();
        }
        Map::new(builder.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_floor_lookup() {
        let map = build_map(&[
            (b"", 0),
            (b"cat", 10),
            (b"dog", 20),
            (b"dove", 30),
            (b"fish", 40),
        ]);
        let fst = map.as_fst();
        assert_eq!(floor_lookup(fst, b"dog"), Some((b"dog".to_vec(), 20)));
        assert_eq!(floor_lookup(fst, b"dot"), Some((b"dog".to_vec(), 20)));
        assert_eq!(floor_lookup(fst, b"dovetail"), Some((b"dove".to_vec(), 30)));
        assert_eq!(floor_lookup(fst, b"elk"), Some((b"dove".to_vec(), 30)));
        assert_eq!(floor_lookup(fst, b"aardvark"), Some((b"".to_vec(), 0)));
        assert_eq!(floor_lookup(fst, b"zebra"), Some((b"fish".to_vec(), 40)));
        assert_eq!(floor_lookup(fst, b""), Some((b"".to_vec(), 0)));
    }

    #[test]
    fn test_floor_lookup_without_empty_key() {
        let map = build_map(&[(b"mm", 1), (b"nn", 2)]);
        assert_eq!(floor_lookup(map.as_fst(), b"aa"), None);
        assert_eq!(floor_lookup(map.as_fst(), b"mz"), Some((b"mm".to_vec(), 1)));
    }

    fn build_index(interval: u32, terms: &[&[u8]]) -> (MemoryStorage, Vec<(Vec<u8>, u64)>) {
        let storage = MemoryStorage::new();
        let selector = Box::new(EveryNTermSelector::new(interval));
        let mut writer = VariableGapTermsIndexWriter::new(&storage, "f.tiv", selector).unwrap();
        let field = FieldInfo::new("body", 3, false);
        writer.start_field(&field, 50).unwrap();
        let stats = TermStats::new(1, 1);
        let mut indexed = Vec::new();
        for (i, term) in terms.iter().enumerate() {
            let fp = 50 + (i as u64) * 17;
            if writer.check_index_term(term, &stats).unwrap() {
                writer.add_index_term(term, fp).unwrap();
                indexed.push((term.to_vec(), fp));
            }
        }
        writer.finish_field().unwrap();
        writer.finish().unwrap();
        (storage, indexed)
    }

    #[test]
    fn test_round_trip_seek() {
        let terms: Vec<&[u8]> = vec![
            b"alpha", b"beta", b"delta", b"epsilon", b"gamma", b"zeta",
        ];
        let (storage, indexed) = build_index(2, &terms);
        // alpha, delta, gamma indexed
        assert_eq!(indexed.len(), 3);

        let reader = VariableGapTermsIndexReader::open(&storage, "f.tiv", 1).unwrap();
        assert!(!reader.supports_ord());
        let mut cursor = reader.field_enum(3).unwrap();

        assert_eq!(cursor.seek(b"gamma").unwrap(), indexed[2].1);
        // the stored key is the minimal prefix, not the full term
        assert_eq!(cursor.term(), b"g");
        assert_eq!(cursor.seek(b"aardvark").unwrap(), indexed[0].1);
        // nothing at or below a target before the whole field but the
        // forced empty-string entry
        assert_eq!(cursor.seek(b"A").unwrap(), 50);
        assert!(cursor.term().is_empty());
        assert!(cursor.seek_ord(0).is_err());
        assert!(cursor.ord().is_err());
    }

    #[test]
    fn test_next_walks_forward() {
        let terms: Vec<&[u8]> = vec![b"ant", b"bee", b"cow", b"dog"];
        let (storage, indexed) = build_index(2, &terms);
        let reader = VariableGapTermsIndexReader::open(&storage, "f.tiv", 1).unwrap();
        let mut cursor = reader.field_enum(3).unwrap();

        // empty string, then the two sampled terms
        assert_eq!(cursor.next().unwrap(), Some(50));
        assert_eq!(cursor.next().unwrap(), Some(indexed[0].1));
        assert_eq!(cursor.next().unwrap(), Some(indexed[1].1));
        assert_eq!(cursor.next().unwrap(), None);
    }

    #[test]
    fn test_divisor_rebuild_keeps_empty_key() {
        let terms: Vec<Vec<u8>> = (0..20).map(|i| format!("w{i:02}").into_bytes()).collect();
        let refs: Vec<&[u8]> = terms.iter().map(|t| t.as_slice()).collect();
        let (storage, _) = build_index(1, &refs);
        let reader = VariableGapTermsIndexReader::open(&storage, "f.tiv", 4).unwrap();
        let mut cursor = reader.field_enum(3).unwrap();
        assert_eq!(cursor.seek(b"a").unwrap(), 50);
    }
}
