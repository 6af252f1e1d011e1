//! Filesystem storage backend.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::error::{CamelliaError, Result};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Stores index files under a single directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    path: PathBuf,
}

impl FsStorage {
    /// Open a storage rooted at `path`, creating the directory if needed.
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Storage for FsStorage {
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.file_path(name))?;
        Ok(Box::new(FsOutput {
            writer: Some(BufWriter::new(file)),
        }))
    }

    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.file_path(name);
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        Ok(Box::new(FsInput {
            path,
            reader: BufReader::new(file),
            len,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.file_path(name).is_file()
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(self.file_path(name)).map_err(CamelliaError::from)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(self.file_path(name))?.len())
    }
}

struct FsOutput {
    writer: Option<BufWriter<File>>,
}

impl Write for FsOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(w) => w.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "output is closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl StorageOutput for FsOutput {
    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

struct FsInput {
    path: PathBuf,
    reader: BufReader<File>,
    len: u64,
}

impl Read for FsInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for FsInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageInput for FsInput {
    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        Ok(Box::new(FsInput {
            path: self.path.clone(),
            reader: BufReader::new(file),
            len,
        }))
    }

    fn len(&self) -> Result<u64> {
        Ok(self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();

        let mut out = storage.create_output("seg.tib").unwrap();
        out.write_all(b"block data").unwrap();
        out.close().unwrap();

        assert!(storage.file_exists("seg.tib"));
        assert_eq!(storage.file_size("seg.tib").unwrap(), 10);

        let mut input = storage.open_input("seg.tib").unwrap();
        assert_eq!(input.len().unwrap(), 10);
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"block data");

        let mut clone = input.clone_input().unwrap();
        let mut buf2 = Vec::new();
        clone.read_to_end(&mut buf2).unwrap();
        assert_eq!(buf2, b"block data");

        storage.delete_file("seg.tib").unwrap();
        assert!(!storage.file_exists("seg.tib"));
    }
}
