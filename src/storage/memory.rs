//! In-memory storage backend, used by most tests.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::error::{CamelliaError, Result};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Keeps every file as a byte vector in a shared map.
///
/// A file becomes visible to readers when its output is closed; an
/// unclosed output never publishes partial contents.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    files: Arc<RwLock<AHashMap<String, Arc<Vec<u8>>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(Box::new(MemoryOutput {
            name: name.to_string(),
            buf: Vec::new(),
            files: Arc::clone(&self.files),
            closed: false,
        }))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let files = self.files.read();
        let data = files
            .get(name)
            .cloned()
            .ok_or_else(|| CamelliaError::storage(format!("file not found: {name}")))?;
        Ok(Box::new(MemoryInput { data, pos: 0 }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CamelliaError::storage(format!("file not found: {name}")))
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        let files = self.files.read();
        files
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| CamelliaError::storage(format!("file not found: {name}")))
    }
}

struct MemoryOutput {
    name: String,
    buf: Vec<u8>,
    files: Arc<RwLock<AHashMap<String, Arc<Vec<u8>>>>>,
    closed: bool,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "output is closed"));
        }
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let data = Arc::new(std::mem::take(&mut self.buf));
        self.files.write().insert(self.name.clone(), data);
        Ok(())
    }
}

struct MemoryInput {
    data: Arc<Vec<u8>>,
    pos: u64,
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.data.len() as u64;
        if self.pos >= len {
            return Ok(0);
        }
        let remaining = (len - self.pos) as usize;
        let n = buf.len().min(remaining);
        let start = self.pos as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.len() as i64;
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(delta) => len + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl StorageInput for MemoryInput {
    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        Ok(Box::new(MemoryInput {
            data: Arc::clone(&self.data),
            pos: 0,
        }))
    }

    fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let storage = MemoryStorage::new();
        let mut out = storage.create_output("a.bin").unwrap();
        out.write_all(b"hello world").unwrap();
        assert!(!storage.file_exists("a.bin"));
        out.close().unwrap();
        assert!(storage.file_exists("a.bin"));

        let mut input = storage.open_input("a.bin").unwrap();
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello world");
        assert_eq!(storage.file_size("a.bin").unwrap(), 11);
    }

    #[test]
    fn test_clone_input_independent_cursor() {
        let storage = MemoryStorage::new();
        let mut out = storage.create_output("b.bin").unwrap();
        out.write_all(&[1, 2, 3, 4]).unwrap();
        out.close().unwrap();

        let mut a = storage.open_input("b.bin").unwrap();
        let mut byte = [0u8; 1];
        a.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 1);

        let mut b = a.clone_input().unwrap();
        b.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 1);

        a.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 2);
    }

    #[test]
    fn test_missing_file() {
        let storage = MemoryStorage::new();
        assert!(storage.open_input("nope").is_err());
        assert!(storage.delete_file("nope").is_err());
    }

    #[test]
    fn test_list_and_delete() {
        let storage = MemoryStorage::new();
        for name in ["z.bin", "a.bin"] {
            let mut out = storage.create_output(name).unwrap();
            out.write_all(b"x").unwrap();
            out.close().unwrap();
        }
        assert_eq!(storage.list_files().unwrap(), vec!["a.bin", "z.bin"]);
        storage.delete_file("a.bin").unwrap();
        assert_eq!(storage.list_files().unwrap(), vec!["z.bin"]);
    }
}
