//! Storage abstraction for index files.
//!
//! All codec files go through the [`Storage`] trait so the same writer and
//! reader code runs over a real directory ([`file::FsStorage`]) or an
//! in-memory map ([`memory::MemoryStorage`]). Inputs are cloneable: every
//! terms enumerator owns an independent cursor over the same underlying
//! file, so enumerators never share mutable state.

use std::fmt::Debug;
use std::io::{Read, Seek, Write};

use crate::error::Result;

pub mod file;
pub mod memory;
pub mod structured;

pub use file::FsStorage;
pub use memory::MemoryStorage;

/// A writable index file.
///
/// Outputs are append-only; all Camellia file formats are written front to
/// back so a running checksum stays valid.
pub trait StorageOutput: Write + Send {
    /// Flush and finalize the file. Must be called for the contents to be
    /// visible to subsequent `open_input` calls on some backends.
    fn close(&mut self) -> Result<()>;
}

/// A readable, seekable index file.
pub trait StorageInput: Read + Seek + Send {
    /// Open an independent cursor over the same file.
    fn clone_input(&self) -> Result<Box<dyn StorageInput>>;

    /// Total length of the file in bytes.
    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// A flat namespace of index files.
pub trait Storage: Debug + Send + Sync {
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    fn file_exists(&self, name: &str) -> bool;

    fn list_files(&self) -> Result<Vec<String>>;

    fn delete_file(&self, name: &str) -> Result<()>;

    fn file_size(&self, name: &str) -> Result<u64>;
}
