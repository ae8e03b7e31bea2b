use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::common::{PageId, Result, StrataError, PAGE_SIZE};

/// DiskManager reads and writes fixed-size pages of a single database file.
///
/// Page `n` lives at byte offset `n * PAGE_SIZE`. All I/O is serialized through
/// one file lock and nothing is cached here: every call is a real read or write.
///
/// Addressing rules:
/// - a read must target a page that already exists in the file;
/// - a write may overwrite an existing page or append exactly one page at the
///   end of the file, so the file never contains holes.
pub struct DiskManager {
    /// The database file
    db_file: Mutex<File>,
    /// Path to the database file
    db_path: PathBuf,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the database file at `db_path`, creating it if it doesn't exist.
    /// Existing contents are preserved.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        Ok(Self {
            db_file: Mutex::new(file),
            db_path: db_path.as_ref().to_path_buf(),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads a page from disk into the provided buffer.
    /// The buffer must be exactly PAGE_SIZE bytes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        if !page_id.is_valid() {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let offset = page_id.file_offset(PAGE_SIZE);

        let mut file = self.db_file.lock();
        let file_size = file.metadata()?.len();
        if offset >= file_size {
            return Err(StrataError::PageOutOfRange(page_id, file_size));
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(data)?;

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        trace!("Read {} from disk", page_id);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer and flushes it before returning.
    /// The buffer must be exactly PAGE_SIZE bytes.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        if !page_id.is_valid() {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let mut file = self.db_file.lock();
        Self::write_locked(&mut file, page_id, data)?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        trace!("Wrote {} to disk", page_id);
        Ok(())
    }

    fn write_locked(file: &mut File, page_id: PageId, data: &[u8]) -> Result<()> {
        let offset = page_id.file_offset(PAGE_SIZE);
        let file_size = file.metadata()?.len();
        if offset > file_size {
            return Err(StrataError::NonContiguousWrite(page_id, file_size));
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// Appends a zeroed page to the end of the file and returns its page ID.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut file = self.db_file.lock();
        let num_pages = file.metadata()?.len() / PAGE_SIZE as u64;
        let page_id = PageId::new(num_pages as i32);

        Self::write_locked(&mut file, page_id, &[0u8; PAGE_SIZE])?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        trace!("Allocated {} on disk", page_id);
        Ok(page_id)
    }

    /// Returns the number of whole pages currently in the file.
    pub fn num_pages(&self) -> Result<u32> {
        Ok((self.file_size()? / PAGE_SIZE as u64) as u32)
    }

    /// Returns the current file length in bytes.
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.db_file.lock().metadata()?.len())
    }

    /// Returns the number of disk reads performed.
    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Forces all written pages to stable storage.
    pub fn sync(&self) -> Result<()> {
        let file = self.db_file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let file = self.db_file.get_mut();
        let _ = file.sync_all();
    }
}
