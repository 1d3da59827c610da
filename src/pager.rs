//! Maps page numbers to in-memory page buffers and persists them on demand.
//!
//! The database file is an opaque concatenation of fixed-size pages; page `n` lives at
//! byte offset `n * PAGE_SIZE`. The pager lazily loads pages into a bounded slot array
//! and never reorders or compacts them — a page's slot index is its page number for the
//! life of the pager.

use crate::err;
use crate::errors::Error;
use heapless::Vec as HVec;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, trace};

/// Fixed page size. Every page on disk and in memory is exactly this many bytes.
pub const PAGE_SIZE: usize = 4096;

/// Upper bound on how many pages a single database file may have.
pub const MAX_PAGES: usize = 100;

pub type Page = [u8; PAGE_SIZE];

/// Owns the backing file descriptor and the slot array of loaded pages.
pub struct Pager {
    file: File,
    num_pages: u32,
    slots: HVec<Option<Box<Page>>, MAX_PAGES>,
}

impl Pager {
    /// Opens (creating if absent) the database file at `path`.
    ///
    /// The file length must be a multiple of `PAGE_SIZE`; anything else means the file
    /// is corrupt and is reported as a storage error rather than silently truncated or
    /// padded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;
        let file_length = file.metadata()?.len();
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(err!(
                Storage,
                "db file length {} is not a multiple of the page size {}",
                file_length,
                PAGE_SIZE
            ));
        }
        let num_pages = (file_length / PAGE_SIZE as u64) as u32;

        let mut slots = HVec::new();
        for _ in 0..MAX_PAGES {
            let _ = slots.push(None);
        }

        debug!(path = %path.as_ref().display(), num_pages, "pager opened");
        Ok(Self {
            file,
            num_pages,
            slots,
        })
    }

    /// Number of pages currently allocated (`highest allocated page number + 1`).
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Returns a mutable reference to the page buffer for `page_no`, loading it from
    /// disk on first access (or zero-filling it, if it lies past the end of the file).
    ///
    /// Fatal if `page_no >= MAX_PAGES` — see the open question in the design notes about
    /// the source's off-by-one `>` bound check; this uses `>=`.
    pub fn get(&mut self, page_no: u32) -> Result<&mut Page, Error> {
        if page_no as usize >= MAX_PAGES {
            return Err(err!(
                Storage,
                "page number {} exceeds MAX_PAGES ({})",
                page_no,
                MAX_PAGES
            ));
        }

        let idx = page_no as usize;
        if self.slots[idx].is_none() {
            let mut buf: Box<Page> = Box::new([0u8; PAGE_SIZE]);
            if page_no < self.num_pages {
                self.file
                    .seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
                self.file.read_exact(&mut buf[..])?;
                trace!(page_no, "page loaded from disk");
            }
            self.slots[idx] = Some(buf);
            if page_no >= self.num_pages {
                self.num_pages = page_no + 1;
            }
        }

        Ok(self.slots[idx].as_mut().expect("slot populated above"))
    }

    /// Returns the page number that the next allocation (the next `get` past the
    /// current end of file) will land on. The allocation itself happens lazily on the
    /// following `get`.
    pub fn new_page_no(&self) -> u32 {
        self.num_pages
    }

    /// Writes the full page back to disk. Fatal if the slot is empty — flushing a page
    /// that was never loaded indicates a bug in the caller, not a runtime condition.
    pub fn flush(&mut self, page_no: u32) -> Result<(), Error> {
        let idx = page_no as usize;
        let buf = self
            .slots
            .get(idx)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| err!(Storage, "flush of empty slot {}", page_no))?;
        self.file
            .seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&buf[..])?;
        trace!(page_no, "page flushed");
        Ok(())
    }

    /// Flushes every occupied slot with `page_no < num_pages` and releases the file.
    pub fn close(&mut self) -> Result<(), Error> {
        for page_no in 0..self.num_pages {
            if self.slots[page_no as usize].is_some() {
                self.flush(page_no)?;
            }
        }
        self.file.flush()?;
        debug!(num_pages = self.num_pages, "pager closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn open_empty_file_has_zero_pages() {
        let tmp = NamedTempFile::new().unwrap();
        let pager = Pager::open(tmp.path()).unwrap();
        assert_eq!(pager.num_pages(), 0);
    }

    #[test]
    fn open_rejects_truncated_file() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), vec![0u8; PAGE_SIZE + 1]).unwrap();
        let err = Pager::open(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn get_allocates_and_grows_num_pages() {
        let tmp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(tmp.path()).unwrap();
        assert_eq!(pager.num_pages(), 0);
        pager.get(0).unwrap()[0] = 7;
        assert_eq!(pager.num_pages(), 1);
        pager.get(2).unwrap()[0] = 9;
        assert_eq!(pager.num_pages(), 3);
    }

    #[test]
    fn get_rejects_page_at_max_pages() {
        let tmp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(tmp.path()).unwrap();
        assert!(pager.get(MAX_PAGES as u32).is_err());
        assert!(pager.get(MAX_PAGES as u32 - 1).is_ok());
    }

    #[test]
    fn flush_and_reopen_roundtrips_bytes() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        {
            let mut pager = Pager::open(&path).unwrap();
            let page = pager.get(0).unwrap();
            page[0..4].copy_from_slice(&42u32.to_le_bytes());
            pager.flush(0).unwrap();
        }
        {
            let mut pager = Pager::open(&path).unwrap();
            assert_eq!(pager.num_pages(), 1);
            let page = pager.get(0).unwrap();
            assert_eq!(u32::from_le_bytes(page[0..4].try_into().unwrap()), 42);
        }
    }

    #[test]
    fn flush_of_empty_slot_is_an_error() {
        let tmp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(tmp.path()).unwrap();
        let err = pager.flush(5).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn close_flushes_all_occupied_slots() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        {
            let mut pager = Pager::open(&path).unwrap();
            pager.get(0).unwrap()[0] = 1;
            pager.get(1).unwrap()[0] = 2;
            pager.close().unwrap();
        }
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), PAGE_SIZE * 2);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[PAGE_SIZE], 2);
    }
}
