//! Reader for the block terms dictionary file.
//!
//! The reader loads the field directory up front and hands out
//! enumerators on demand. Each enumerator clones the underlying input,
//! so many can run over the same reader without sharing state. Postings
//! metadata decodes lazily: scans over term bytes never pay for decoding
//! frequencies or file pointers they do not ask for.

use std::cmp::Ordering;
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::codec::block_terms::{CODEC_NAME, VERSION_CURRENT, VERSION_START};
use crate::codec::format;
use crate::codec::postings::{FieldInfo, PostingsCodec, TermMeta, TermMetaReader};
use crate::codec::terms_index::{FieldIndexEnum, TermsIndexReader};
use crate::error::{CamelliaError, Result};
use crate::storage::structured::StructReader;
use crate::storage::{Storage, StorageInput};
use crate::util::bytes::BytesInput;

/// Outcome of [`BlockTermsEnum::seek_ceil`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// Positioned on the exact target term.
    Found,
    /// Positioned on the smallest term greater than the target.
    NotFound,
    /// The target is past the last term of the field.
    End,
}

/// Snapshot of an enumerator's position, cheap to clone and restore.
#[derive(Debug, Clone, Default)]
pub struct TermState {
    /// Term ordinal; meaningful only when the terms index supports ords.
    pub ord: i64,
    pub doc_freq: u32,
    pub total_term_freq: u64,
    pub meta: TermMeta,
    pub(crate) block_fp: u64,
    pub(crate) term_block_ord: usize,
}

/// Directory entry for one field, shared by all enumerators.
#[derive(Debug)]
pub struct FieldTerms {
    pub info: FieldInfo,
    pub num_terms: u64,
    pub sum_doc_freq: u64,
    /// Absent for fields indexed without frequencies.
    pub sum_total_term_freq: Option<u64>,
    pub doc_count: u32,
    terms_start: u64,
    longs_size: usize,
}

pub struct BlockTermsReader {
    input: Box<dyn StorageInput>,
    index_reader: Arc<dyn TermsIndexReader>,
    postings: Arc<dyn PostingsCodec>,
    fields: AHashMap<String, Arc<FieldTerms>>,
}

impl BlockTermsReader {
    pub fn open(
        storage: &dyn Storage,
        name: &str,
        field_infos: &[FieldInfo],
        max_doc: u32,
        postings: Arc<dyn PostingsCodec>,
        index_reader: Arc<dyn TermsIndexReader>,
    ) -> Result<Self> {
        let input = storage.open_input(name)?;
        let mut reader = StructReader::new(input);
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

        let mut fields: AHashMap<String, Arc<FieldTerms>> = AHashMap::new();
        for _ in 0..num_fields {
            let number = reader.read_vint()?;
            let info = field_infos
                .iter()
                .find(|f| f.number == number)
                .ok_or_else(|| {
                    CamelliaError::corrupt(format!(
                        "unknown field number {number} (resource={name})"
                    ))
                })?
                .clone();
            let num_terms = reader.read_vlong()?;
            if num_terms == 0 {
                return Err(CamelliaError::corrupt(format!(
                    "field {:?} has 0 terms (resource={name})",
                    info.name
                )));
            }
            let terms_start = reader.read_vlong()?;
            let sum_total_term_freq = if info.has_freqs {
                Some(reader.read_vlong()?)
            } else {
                None
            };
            let sum_doc_freq = reader.read_vlong()?;
            let doc_count = reader.read_vint()?;
            let longs_size = reader.read_vint()? as usize;

            if doc_count > max_doc {
                return Err(CamelliaError::corrupt(format!(
                    "invalid doc_count {doc_count} > max_doc {max_doc} for field {:?} (resource={name})",
                    info.name
                )));
            }
            if sum_doc_freq < u64::from(doc_count) {
                return Err(CamelliaError::corrupt(format!(
                    "invalid sum_doc_freq {sum_doc_freq} < doc_count {doc_count} for field {:?} (resource={name})",
                    info.name
                )));
            }
            if let Some(ttf) = sum_total_term_freq {
                if ttf < sum_doc_freq {
                    return Err(CamelliaError::corrupt(format!(
                        "invalid sum_total_term_freq {ttf} < sum_doc_freq {sum_doc_freq} for field {:?} (resource={name})",
                        info.name
                    )));
                }
            }

            let name_key = info.name.clone();
            let entry = Arc::new(FieldTerms {
                info,
                num_terms,
                sum_doc_freq,
                sum_total_term_freq,
                doc_count,
                terms_start,
                longs_size,
            });
            if fields.insert(name_key.clone(), entry).is_some() {
                return Err(CamelliaError::corrupt(format!(
                    "duplicate field {name_key:?} (resource={name})"
                )));
            }
        }
        debug!("opened term dictionary {name}: {} fields", fields.len());
        Ok(Self {
            input: reader.into_inner(),
            index_reader,
            postings,
            fields,
        })
    }

    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }

    /// Directory entry (term count, aggregate stats) for a field.
    pub fn terms(&self, field: &str) -> Option<&Arc<FieldTerms>> {
        self.fields.get(field)
    }

    /// A fresh enumerator over one field, with its own cloned input.
    pub fn terms_enum(&self, field: &str) -> Result<BlockTermsEnum> {
        let terms = self.fields.get(field).cloned().ok_or_else(|| {
            CamelliaError::illegal_state(format!("field {field:?} is not in the dictionary"))
        })?;
        let index_enum = self.index_reader.field_enum(terms.info.number)?;
        let mut input = StructReader::new(self.input.clone_input()?);
        input.seek(terms.terms_start)?;
        let longs_size = terms.longs_size;
        Ok(BlockTermsEnum {
            input,
            field: terms,
            index_enum,
            meta_reader: self.postings.term_reader(),
            divisor: self.index_reader.divisor(),
            supports_ord: self.index_reader.supports_ord(),
            term: Vec::new(),
            state: TermState {
                ord: -1,
                ..TermState::default()
            },
            index_is_current: false,
            did_index_next: false,
            next_index_term: None,
            seek_pending: false,
            exhausted: false,
            blocks_since_seek: 0,
            suffixes: BytesInput::new(),
            freqs: BytesInput::new(),
            meta_bytes: BytesInput::new(),
            longs: vec![0; longs_size],
            term_block_prefix: 0,
            block_term_count: 0,
            metadata_upto: 0,
        })
    }
}

/// Cursor over one field's terms. Supports forward iteration, ceiling
/// seeks by term, and (index permitting) exact seeks by ordinal.
pub struct BlockTermsEnum {
    input: StructReader<Box<dyn StorageInput>>,
    field: Arc<FieldTerms>,
    index_enum: Box<dyn FieldIndexEnum>,
    meta_reader: Box<dyn TermMetaReader>,
    divisor: usize,
    supports_ord: bool,

    term: Vec<u8>,
    state: TermState,

    /// True while the index enum still brackets the current block, so a
    /// forward seek within the same block can skip the index entirely.
    index_is_current: bool,
    did_index_next: bool,
    next_index_term: Option<Vec<u8>>,
    /// Set by `seek_exact_state`; the block is re-read only if the caller
    /// iterates onward.
    seek_pending: bool,
    exhausted: bool,
    blocks_since_seek: usize,

    suffixes: BytesInput,
    freqs: BytesInput,
    meta_bytes: BytesInput,
    longs: Vec<u64>,
    term_block_prefix: usize,
    block_term_count: usize,
    metadata_upto: usize,
}

impl BlockTermsEnum {
    pub fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let mut do_seek = true;

        // target after the current term but before the next index term
        // means it can only live in the block we are already in
        if self.index_is_current {
            match self.term.as_slice().cmp(target) {
                Ordering::Equal => return Ok(SeekStatus::Found),
                Ordering::Less => {
                    if !self.did_index_next {
                        self.next_index_term = match self.index_enum.next()? {
                            Some(_) => Some(self.index_enum.term().to_vec()),
                            None => None,
                        };
                        self.did_index_next = true;
                    }
                    match &self.next_index_term {
                        None => do_seek = false,
                        Some(next) if target < next.as_slice() => do_seek = false,
                        Some(_) => {}
                    }
                }
                Ordering::Greater => {}
            }
        }

        if do_seek {
            let fp = self.index_enum.seek(target)?;
            self.input.seek(fp)?;
            if !self.next_block()? {
                return Err(CamelliaError::corrupt(
                    "terms index points past the last block",
                ));
            }
            self.index_is_current = true;
            self.did_index_next = false;
            self.exhausted = false;
            self.blocks_since_seek = 0;
            if self.supports_ord {
                self.state.ord = self.index_enum.ord()? as i64 - 1;
            }
            self.term.clear();
            self.term.extend_from_slice(self.index_enum.term());
        } else if self.state.term_block_ord == self.block_term_count && !self.next_block()? {
            self.index_is_current = false;
            self.exhausted = true;
            return Ok(SeekStatus::End);
        }
        self.seek_pending = false;

        let mut common = 0usize;
        loop {
            // match the target against the block's shared prefix first
            if common < self.term_block_prefix {
                let cmp = match target.get(common) {
                    Some(byte) => self.term[common].cmp(byte),
                    // target shorter than the prefix sorts before the block
                    None => Ordering::Greater,
                };
                match cmp {
                    Ordering::Less => {
                        // every term here is below the target; scan to the
                        // end of the block so the next block's prefix has
                        // the right bytes to build on
                        if self.state.term_block_ord < self.block_term_count {
                            while self.state.term_block_ord < self.block_term_count - 1 {
                                self.state.term_block_ord += 1;
                                self.state.ord += 1;
                                let skip = self.suffixes.read_vint()? as usize;
                                self.suffixes.skip(skip)?;
                            }
                            let suffix = self.suffixes.read_vint()? as usize;
                            self.fill_term(suffix)?;
                        }
                        self.state.ord += 1;
                        if !self.next_block()? {
                            self.index_is_current = false;
                            self.exhausted = true;
                            return Ok(SeekStatus::End);
                        }
                        common = 0;
                    }
                    Ordering::Greater => {
                        // target sorts before this whole block; its first
                        // term is the ceiling
                        let suffix = self.suffixes.read_vint()? as usize;
                        self.state.term_block_ord += 1;
                        self.state.ord += 1;
                        self.fill_term(suffix)?;
                        return Ok(SeekStatus::NotFound);
                    }
                    Ordering::Equal => common += 1,
                }
                continue;
            }

            // prefix fully matched: compare suffixes term by term
            loop {
                self.state.term_block_ord += 1;
                self.state.ord += 1;
                let suffix = self.suffixes.read_vint()? as usize;
                if suffix > self.suffixes.remaining().len() {
                    return Err(CamelliaError::corrupt(format!(
                        "term suffix length {suffix} overruns the block suffix blob",
                    )));
                }
                let term_len = self.term_block_prefix + suffix;

                let mut keep_scanning = false;
                let mut after_target = false;
                {
                    let suffix_bytes = self.suffixes.remaining();
                    let limit = term_len.min(target.len());
                    let mut pos = self.term_block_prefix;
                    while pos < limit {
                        match suffix_bytes[pos - self.term_block_prefix].cmp(&target[pos]) {
                            Ordering::Less => {
                                keep_scanning = true;
                                break;
                            }
                            Ordering::Greater => {
                                after_target = true;
                                break;
                            }
                            Ordering::Equal => pos += 1,
                        }
                    }
                }
                if after_target {
                    self.fill_term(suffix)?;
                    return Ok(SeekStatus::NotFound);
                }
                if !keep_scanning && target.len() <= term_len {
                    self.fill_term(suffix)?;
                    return Ok(if target.len() == term_len {
                        SeekStatus::Found
                    } else {
                        SeekStatus::NotFound
                    });
                }
                if self.state.term_block_ord == self.block_term_count {
                    // carry the last term so the next block's prefix is valid
                    self.fill_term(suffix)?;
                    break;
                }
                self.suffixes.skip(suffix)?;
            }

            if !self.next_block()? {
                self.index_is_current = false;
                self.exhausted = true;
                return Ok(SeekStatus::End);
            }
            common = 0;
        }
    }

    /// Advances to the next term, returning its bytes, or `None` at the
    /// end of the field.
    pub fn next(&mut self) -> Result<Option<&[u8]>> {
        if self.seek_pending {
            // catch up: re-read the block that seek_exact_state pointed
            // into, then walk forward to the remembered position
            self.input.seek(self.state.block_fp)?;
            let pending_count = self.state.term_block_ord;
            self.exhausted = false;
            if !self.next_block()? {
                return Err(CamelliaError::corrupt(
                    "stale term state points past the last block",
                ));
            }
            let saved_ord = self.state.ord;
            while self.state.term_block_ord < pending_count {
                if !self.advance()? {
                    return Err(CamelliaError::corrupt(
                        "stale term state points past the end of its block",
                    ));
                }
            }
            self.seek_pending = false;
            self.state.ord = saved_ord;
        }
        if self.advance()? {
            Ok(Some(&self.term))
        } else {
            Ok(None)
        }
    }

    /// Positions on the term with ordinal `ord`. Requires an index with
    /// ordinal support.
    pub fn seek_exact_ord(&mut self, ord: u64) -> Result<()> {
        if !self.supports_ord {
            return Err(CamelliaError::unsupported(
                "terms index does not support ordinals",
            ));
        }
        if ord >= self.field.num_terms {
            return Err(CamelliaError::illegal_state(format!(
                "ordinal {ord} out of bounds (field has {} terms)",
                self.field.num_terms
            )));
        }
        let fp = self.index_enum.seek_ord(ord)?;
        self.input.seek(fp)?;
        self.exhausted = false;
        if !self.next_block()? {
            return Err(CamelliaError::corrupt(
                "terms index points past the last block",
            ));
        }
        self.index_is_current = true;
        self.did_index_next = false;
        self.blocks_since_seek = 0;
        self.seek_pending = false;

        self.state.ord = self.index_enum.ord()? as i64 - 1;
        self.term.clear();
        self.term.extend_from_slice(self.index_enum.term());

        let mut left = ord as i64 - self.state.ord;
        while left > 0 {
            if !self.advance()? {
                return Err(CamelliaError::corrupt(
                    "ran out of terms while scanning to an ordinal",
                ));
            }
            left -= 1;
        }
        Ok(())
    }

    /// Restores a position previously captured with [`Self::term_state`].
    /// The seek is deferred; metadata is served straight from the state
    /// and the block is only re-read if the caller iterates.
    pub fn seek_exact_state(&mut self, target: &[u8], state: &TermState) -> Result<()> {
        self.state = state.clone();
        self.seek_pending = true;
        self.index_is_current = false;
        self.exhausted = false;
        self.term.clear();
        self.term.extend_from_slice(target);
        Ok(())
    }

    pub fn term(&self) -> &[u8] {
        &self.term
    }

    /// Ordinal of the current term; requires an index with ordinal support.
    pub fn ord(&self) -> Result<i64> {
        if !self.supports_ord {
            return Err(CamelliaError::unsupported(
                "terms index does not support ordinals",
            ));
        }
        Ok(self.state.ord)
    }

    pub fn doc_freq(&mut self) -> Result<u32> {
        self.decode_metadata()?;
        Ok(self.state.doc_freq)
    }

    pub fn total_term_freq(&mut self) -> Result<Option<u64>> {
        if !self.field.info.has_freqs {
            return Ok(None);
        }
        self.decode_metadata()?;
        Ok(Some(self.state.total_term_freq))
    }

    /// Postings location of the current term.
    pub fn postings_meta(&mut self) -> Result<TermMeta> {
        self.decode_metadata()?;
        Ok(self.state.meta)
    }

    pub fn term_state(&mut self) -> Result<TermState> {
        self.decode_metadata()?;
        Ok(self.state.clone())
    }

    /// Reads the next term's bytes without touching metadata.
    fn advance(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        if self.state.term_block_ord == self.block_term_count && !self.next_block()? {
            self.index_is_current = false;
            self.exhausted = true;
            return Ok(false);
        }
        let suffix = self.suffixes.read_vint()? as usize;
        self.fill_term(suffix)?;
        self.state.term_block_ord += 1;
        self.state.ord += 1;
        Ok(true)
    }

    /// Loads the next block's blobs without decoding them. Returns false
    /// on the end-of-field marker.
    fn next_block(&mut self) -> Result<bool> {
        self.state.block_fp = self.input.position()?;
        self.block_term_count = self.input.read_vint()? as usize;
        if self.block_term_count == 0 {
            return Ok(false);
        }
        self.term_block_prefix = self.input.read_vint()? as usize;

        let len = self.input.read_vint()? as usize;
        self.input.read_bytes(self.suffixes.reset(len))?;
        let len = self.input.read_vint()? as usize;
        self.input.read_bytes(self.freqs.reset(len))?;
        let len = self.input.read_vint()? as usize;
        self.input.read_bytes(self.meta_bytes.reset(len))?;

        self.metadata_upto = 0;
        self.state.term_block_ord = 0;
        self.blocks_since_seek += 1;
        self.index_is_current = self.index_is_current && self.blocks_since_seek < self.divisor;
        Ok(true)
    }

    /// Replaces everything past the block prefix with `suffix` bytes read
    /// from the suffix blob.
    fn fill_term(&mut self, suffix: usize) -> Result<()> {
        if self.term.len() < self.term_block_prefix {
            return Err(CamelliaError::corrupt(
                "block prefix is longer than the carried term",
            ));
        }
        self.term.truncate(self.term_block_prefix);
        self.term.resize(self.term_block_prefix + suffix, 0);
        self.suffixes
            .read_bytes(&mut self.term[self.term_block_prefix..])?;
        Ok(())
    }

    /// Decodes frequency and postings metadata for every term between the
    /// last decoded one and the current position.
    fn decode_metadata(&mut self) -> Result<()> {
        if self.seek_pending {
            // state was restored wholesale; nothing to decode
            return Ok(());
        }
        let limit = self.state.term_block_ord;
        let mut absolute = self.metadata_upto == 0;
        while self.metadata_upto < limit {
            self.state.doc_freq = self.freqs.read_vint()?;
            if self.field.info.has_freqs {
                self.state.total_term_freq =
                    u64::from(self.state.doc_freq) + self.freqs.read_vlong()?;
            }
            for slot in 0..self.longs.len() {
                self.longs[slot] = self.meta_bytes.read_vlong()?;
            }
            self.meta_reader.decode_term(
                &self.longs,
                &mut self.meta_bytes,
                &mut self.state.meta,
                absolute,
            )?;
            self.metadata_upto += 1;
            absolute = false;
        }
        Ok(())
    }
}
