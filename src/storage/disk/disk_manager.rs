use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use log::debug;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager is responsible for handling the actual disk I/O operations
pub struct DiskManager {
    db_file: Mutex<File>,
}

impl DiskManager {
    /// Create a new DiskManager with the specified database file
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        Ok(Self {
            db_file: Mutex::new(file),
        })
    }

    /// Read a page from disk into the given buffer
    ///
    /// A page that has been allocated but never written lies past the end
    /// of the file; reading it yields a zeroed buffer.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<(), DiskManagerError> {
        if page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();

        let file_size = file.metadata()?.len();
        if offset >= file_size {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;

        Ok(())
    }

    /// Write a page to disk
    pub fn write_page(&self, page_id: PageId, buf: &[u8; PAGE_SIZE]) -> Result<(), DiskManagerError> {
        if page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.db_file.lock();

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.flush()?;

        Ok(())
    }

    /// Release a page id back to storage
    ///
    /// The file is not shrunk; a deallocated page simply becomes garbage
    /// until its id is handed out again.
    pub fn deallocate_page(&self, page_id: PageId) {
        debug!("deallocating page {}", page_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_disk_manager() -> (DiskManager, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(file.path()).unwrap();
        (dm, file)
    }

    #[test]
    fn test_write_then_read() {
        let (dm, _file) = create_disk_manager();

        let mut buf = [0u8; PAGE_SIZE];
        buf[0] = 0xAB;
        buf[PAGE_SIZE - 1] = 0xCD;
        dm.write_page(3, &buf).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        dm.read_page(3, &mut out).unwrap();
        assert_eq!(out[0], 0xAB);
        assert_eq!(out[PAGE_SIZE - 1], 0xCD);
    }

    #[test]
    fn test_read_unwritten_page_is_zeroed() {
        let (dm, _file) = create_disk_manager();

        let mut out = [0xFFu8; PAGE_SIZE];
        dm.read_page(7, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_negative_page_id_rejected() {
        let (dm, _file) = create_disk_manager();

        let mut buf = [0u8; PAGE_SIZE];
        assert!(matches!(
            dm.read_page(-1, &mut buf),
            Err(DiskManagerError::InvalidPageId(-1))
        ));
        assert!(matches!(
            dm.write_page(-5, &buf),
            Err(DiskManagerError::InvalidPageId(-5))
        ));
    }
}
