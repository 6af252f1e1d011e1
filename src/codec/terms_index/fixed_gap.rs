//! Terms index that samples every Nth term.
//!
//! The writer keeps only the minimal distinguishing prefix of each sampled
//! term, packed into one shared byte blob per field, with two packed
//! integer arrays alongside: block file pointer deltas and offsets into
//! the blob. Because the sampling stride is fixed, term ordinals map
//! directly to index entries, so this index supports `seek_ord`.

use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::codec::format;
use crate::codec::postings::{FieldInfo, TermStats};
use crate::codec::terms_index::{
    indexed_prefix_length, FieldIndexEnum, TermsIndexReader, TermsIndexWriter,
};
use crate::error::{CamelliaError, Result};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageInput, StorageOutput};
use crate::util::packed::PackedLongs;

pub const CODEC_NAME: &str = "camellia_fixed_gap_index";
pub const VERSION_START: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_START;

struct FieldEntry {
    field_number: u32,
    num_index_terms: u64,
    terms_start: u64,
    index_start: u64,
    packed_index_start: u64,
    packed_offsets_start: u64,
}

struct FieldState {
    field_number: u32,
    terms_start: u64,
    num_terms: u64,
    /// The term written just before the next index term; index prefixes
    /// are truncated against it.
    last_term: Vec<u8>,
    term_bytes: Vec<u8>,
    fp_deltas: Vec<u64>,
    /// `num_index_terms + 1` offsets into `term_bytes`.
    offsets: Vec<u64>,
}

pub struct FixedGapTermsIndexWriter {
    out: StructWriter<Box<dyn StorageOutput>>,
    interval: u32,
    fields: Vec<FieldEntry>,
    current: Option<FieldState>,
    closed: bool,
}

impl FixedGapTermsIndexWriter {
    pub fn new(storage: &dyn Storage, name: &str, interval: u32) -> Result<Self> {
        if interval == 0 {
            return Err(CamelliaError::illegal_state(
                "index interval must be greater than 0",
            ));
        }
        let output = storage.create_output(name)?;
        let mut out = StructWriter::new(output);
        let header = format::write_header(&mut out, CODEC_NAME, VERSION_CURRENT)
            .and_then(|_| out.write_vint(interval));
        if let Err(err) = header {
            let _ = out.get_mut().close();
            return Err(err);
        }
        Ok(Self {
            out,
            interval,
            fields: Vec::new(),
            current: None,
            closed: false,
        })
    }
}

impl TermsIndexWriter for FixedGapTermsIndexWriter {
    fn start_field(&mut self, field: &FieldInfo, terms_start: u64) -> Result<()> {
        if self.current.is_some() {
            return Err(CamelliaError::illegal_state(
                "previous field was not finished",
            ));
        }
        self.current = Some(FieldState {
            field_number: field.number,
            terms_start,
            num_terms: 0,
            last_term: Vec::new(),
            term_bytes: Vec::new(),
            fp_deltas: Vec::new(),
            offsets: vec![0],
        });
        Ok(())
    }

    fn check_index_term(&mut self, term: &[u8], _stats: &TermStats) -> Result<bool> {
        let Some(state) = self.current.as_mut() else {
            return Err(CamelliaError::illegal_state("no field started"));
        };
        let fire = state.num_terms % u64::from(self.interval) == 0;
        state.num_terms += 1;
        if fire {
            Ok(true)
        } else {
            if state.num_terms % u64::from(self.interval) == 0 {
                // remember the term just before the next index term so its
                // prefix can be truncated against it
                state.last_term.clear();
                state.last_term.extend_from_slice(term);
            }
            Ok(false)
        }
    }

    fn add_index_term(&mut self, term: &[u8], terms_fp: u64) -> Result<()> {
        let Some(state) = self.current.as_mut() else {
            return Err(CamelliaError::illegal_state("no field started"));
        };
        if terms_fp < state.terms_start {
            return Err(CamelliaError::illegal_state(
                "block pointer is before the field's terms start",
            ));
        }
        let prefix_len = indexed_prefix_length(&state.last_term, term);
        state.term_bytes.extend_from_slice(&term[..prefix_len]);
        state.offsets.push(state.term_bytes.len() as u64);
        state.fp_deltas.push(terms_fp - state.terms_start);
        state.last_term.clear();
        state.last_term.extend_from_slice(term);
        Ok(())
    }

    fn finish_field(&mut self) -> Result<()> {
        let Some(state) = self.current.take() else {
            return Err(CamelliaError::illegal_state("no field started"));
        };
        if state.fp_deltas.is_empty() {
            return Ok(());
        }
        let index_start = self.out.position();
        self.out.write_bytes(&state.term_bytes)?;
        let packed_index_start = self.out.position();
        PackedLongs::from_slice(&state.fp_deltas).write_to(&mut self.out)?;
        let packed_offsets_start = self.out.position();
        PackedLongs::from_slice(&state.offsets).write_to(&mut self.out)?;
        self.fields.push(FieldEntry {
            field_number: state.field_number,
            num_index_terms: state.fp_deltas.len() as u64,
            terms_start: state.terms_start,
            index_start,
            packed_index_start,
            packed_offsets_start,
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
            self.out.write_vlong(field.num_index_terms)?;
            self.out.write_vlong(field.terms_start)?;
            self.out.write_vlong(field.index_start)?;
            self.out.write_vlong(field.packed_index_start)?;
            self.out.write_vlong(field.packed_offsets_start)?;
        }
        self.out.write_u64(dir_start)?;
        format::write_footer(&mut self.out)?;
        self.out.flush()?;
        self.out.get_mut().close()?;
        debug!(
            "wrote fixed-gap terms index: {} fields, interval {}",
            self.fields.len(),
            self.interval
        );
        Ok(())
    }
}

impl Drop for FixedGapTermsIndexWriter {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.finish();
        }
    }
}

struct FieldIndexData {
    num_index_terms: u64,
    terms_start: u64,
    term_offsets: PackedLongs,
    fp_deltas: PackedLongs,
    term_bytes: Vec<u8>,
}

impl FieldIndexData {
    fn term_at(&self, index: usize) -> &[u8] {
        let start = self.term_offsets.get(index) as usize;
        let end = self.term_offsets.get(index + 1) as usize;
        &self.term_bytes[start..end]
    }
}

pub struct FixedGapTermsIndexReader {
    divisor: usize,
    total_index_interval: u64,
    fields: AHashMap<u32, Arc<FieldIndexData>>,
}

impl FixedGapTermsIndexReader {
    /// Loads the whole index eagerly. `divisor > 1` keeps only every Nth
    /// sampled entry, trading memory for coarser seeks.
    pub fn open(storage: &dyn Storage, name: &str, divisor: usize) -> Result<Self> {
        if divisor == 0 {
            return Err(CamelliaError::illegal_state("index divisor must be > 0"));
        }
        let input = storage.open_input(name)?;
        let mut reader = StructReader::new(input);
        format::verify_checksum(&mut reader)?;
        reader.seek(0)?;
        format::check_header(&mut reader, CODEC_NAME, VERSION_START, VERSION_CURRENT)?;
        let interval = reader.read_vint()?;
        if interval == 0 {
            return Err(CamelliaError::corrupt(format!(
                "invalid index interval 0 (resource={name})"
            )));
        }
        let total_index_interval = u64::from(interval) * divisor as u64;

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
                num_index_terms: reader.read_vlong()?,
                terms_start: reader.read_vlong()?,
                index_start: reader.read_vlong()?,
                packed_index_start: reader.read_vlong()?,
                packed_offsets_start: reader.read_vlong()?,
            });
        }

        let mut fields = AHashMap::new();
        for entry in entries {
            let data = Self::load_field(&mut reader, &entry, divisor)?;
            if fields.insert(entry.field_number, Arc::new(data)).is_some() {
                return Err(CamelliaError::corrupt(format!(
                    "duplicate field number {} (resource={name})",
                    entry.field_number
                )));
            }
        }
        debug!(
            "loaded fixed-gap terms index {name}: {} fields, divisor {divisor}",
            fields.len()
        );
        Ok(Self {
            divisor,
            total_index_interval,
            fields,
        })
    }

    fn load_field(
        reader: &mut StructReader<Box<dyn StorageInput>>,
        entry: &FieldEntry,
        divisor: usize,
    ) -> Result<FieldIndexData> {
        let blob_len = (entry.packed_index_start - entry.index_start) as usize;
        reader.seek(entry.index_start)?;
        let mut term_bytes = vec![0u8; blob_len];
        reader.read_bytes(&mut term_bytes)?;
        reader.seek(entry.packed_index_start)?;
        let fp_deltas = PackedLongs::read_from(reader)?;
        reader.seek(entry.packed_offsets_start)?;
        let term_offsets = PackedLongs::read_from(reader)?;
        let num = entry.num_index_terms as usize;
        if fp_deltas.len() != num || term_offsets.len() != num + 1 {
            return Err(CamelliaError::corrupt(format!(
                "packed array lengths disagree with index term count {num}"
            )));
        }

        if divisor == 1 {
            return Ok(FieldIndexData {
                num_index_terms: entry.num_index_terms,
                terms_start: entry.terms_start,
                term_offsets,
                fp_deltas,
                term_bytes,
            });
        }

        // sub-sample the loaded index, keeping every divisor-th entry
        let mut sub_bytes = Vec::new();
        let mut sub_deltas = Vec::new();
        let mut sub_offsets = vec![0u64];
        let mut i = 0;
        while i < num {
            let start = term_offsets.get(i) as usize;
            let end = term_offsets.get(i + 1) as usize;
            sub_bytes.extend_from_slice(&term_bytes[start..end]);
            sub_offsets.push(sub_bytes.len() as u64);
            sub_deltas.push(fp_deltas.get(i));
            i += divisor;
        }
        Ok(FieldIndexData {
            num_index_terms: sub_deltas.len() as u64,
            terms_start: entry.terms_start,
            term_offsets: PackedLongs::from_slice(&sub_offsets),
            fp_deltas: PackedLongs::from_slice(&sub_deltas),
            term_bytes: sub_bytes,
        })
    }
}

impl TermsIndexReader for FixedGapTermsIndexReader {
    fn supports_ord(&self) -> bool {
        true
    }

    fn divisor(&self) -> usize {
        self.divisor
    }

    fn field_enum(&self, field_number: u32) -> Result<Box<dyn FieldIndexEnum>> {
        let data = self.fields.get(&field_number).cloned().ok_or_else(|| {
            CamelliaError::illegal_state(format!("field {field_number} has no terms index"))
        })?;
        Ok(Box::new(FixedGapFieldEnum {
            data,
            total_index_interval: self.total_index_interval,
            position: None,
            term: Vec::new(),
        }))
    }
}

struct FixedGapFieldEnum {
    data: Arc<FieldIndexData>,
    total_index_interval: u64,
    position: Option<usize>,
    term: Vec<u8>,
}

impl FixedGapFieldEnum {
    fn position_at(&mut self, index: usize) -> u64 {
        self.position = Some(index);
        self.term.clear();
        let term = self.data.term_at(index);
        self.term.extend_from_slice(term);
        self.data.terms_start + self.data.fp_deltas.get(index)
    }
}

impl FieldIndexEnum for FixedGapFieldEnum {
    fn seek(&mut self, target: &[u8]) -> Result<u64> {
        let num = self.data.num_index_terms as i64;
        if num == 0 {
            return Err(CamelliaError::corrupt("terms index has no entries"));
        }
        let mut lo = 0i64;
        let mut hi = num - 1;
        while hi >= lo {
            let mid = (lo + hi) >> 1;
            match target.cmp(self.data.term_at(mid as usize)) {
                std::cmp::Ordering::Less => hi = mid - 1,
                std::cmp::Ordering::Greater => lo = mid + 1,
                std::cmp::Ordering::Equal => return Ok(self.position_at(mid as usize)),
            }
        }
        // no exact match: hi is the largest entry below target, clamped to
        // the first entry when target precedes the whole index
        let index = hi.max(0) as usize;
        Ok(self.position_at(index))
    }

    fn seek_ord(&mut self, ord: u64) -> Result<u64> {
        let num = self.data.num_index_terms as usize;
        if num == 0 {
            return Err(CamelliaError::corrupt("terms index has no entries"));
        }
        let index = ((ord / self.total_index_interval) as usize).min(num - 1);
        Ok(self.position_at(index))
    }

    fn next(&mut self) -> Result<Option<u64>> {
        let next = match self.position {
            None => 0,
            Some(p) => p + 1,
        };
        if next >= self.data.num_index_terms as usize {
            return Ok(None);
        }
        Ok(Some(self.position_at(next)))
    }

    fn term(&self) -> &[u8] {
        &self.term
    }

    fn ord(&self) -> Result<u64> {
        match self.position {
            Some(p) => Ok(p as u64 * self.total_index_interval),
            None => Err(CamelliaError::illegal_state("index enum is unpositioned")),
        }
    }
}
