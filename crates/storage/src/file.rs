//! FileBlockStore: single page file
//!
//! Page `n` lives at byte offset `n * PAGE_SIZE`. Every committed page is
//! written through to the file with a fresh CRC32 in its header; `sync`
//! fsyncs. On open, every page is read back and its checksum verified, so a
//! torn or foreign file is rejected before the engine sees it.
//!
//! The file is locked exclusively (`fs2`) for the lifetime of the store.
//!
//! Lock order is page lock, then file mutex. The page table lock is never
//! held while waiting on a page lock.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use pagehnsw_core::{Error, PageId, Result, PAGE_SIZE};

use crate::page::Page;
use crate::store::BlockStore;

/// Block store backed by one file
#[derive(Debug)]
pub struct FileBlockStore {
    path: PathBuf,
    file: Mutex<File>,
    pages: RwLock<Vec<Arc<RwLock<Page>>>>,
}

impl FileBlockStore {
    /// Create a new, empty page file, truncating any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or is locked by
    /// another store.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Self::lock(&file, &path)?;
        file.set_len(0)?;
        debug!(path = %path.display(), "created page file");

        Ok(FileBlockStore {
            path,
            file: Mutex::new(file),
            pages: RwLock::new(Vec::new()),
        })
    }

    /// Open an existing page file and verify every page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corruption`] if the file size is not a whole number
    /// of pages or a page fails its checksum.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        Self::lock(&file, &path)?;

        let len = file.metadata()?.len() as usize;
        if len % PAGE_SIZE != 0 {
            return Err(Error::corruption(format!(
                "page file '{}' has {} bytes, not a multiple of {}",
                path.display(),
                len,
                PAGE_SIZE
            )));
        }

        let count = len / PAGE_SIZE;
        let mut pages = Vec::with_capacity(count);
        file.seek(SeekFrom::Start(0))?;
        for n in 0..count {
            let mut buf = vec![0u8; PAGE_SIZE];
            file.read_exact(&mut buf)?;
            let page = Page::from_bytes(buf)?;
            if !page.verify_checksum() {
                return Err(Error::corruption(format!(
                    "checksum mismatch on page {} of '{}'",
                    n,
                    path.display()
                )));
            }
            pages.push(Arc::new(RwLock::new(page)));
        }
        debug!(path = %path.display(), pages = count, "opened page file");

        Ok(FileBlockStore {
            path,
            file: Mutex::new(file),
            pages: RwLock::new(pages),
        })
    }

    /// Path of the page file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(file: &File, path: &Path) -> Result<()> {
        file.try_lock_exclusive().map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("page file '{}' is locked: {}", path.display(), e),
            ))
        })
    }

    fn write_through(&self, id: PageId, page: &Page) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(id.as_u32() as u64 * PAGE_SIZE as u64))?;
        file.write_all(page.as_bytes())?;
        Ok(())
    }

    fn handle(&self, id: PageId) -> Result<Arc<RwLock<Page>>> {
        self.pages
            .read()
            .get(id.as_u32() as usize)
            .cloned()
            .ok_or_else(|| Error::corruption(format!("page {} does not exist", id)))
    }
}

impl BlockStore for FileBlockStore {
    fn allocate_page(&self) -> Result<PageId> {
        let mut pages = self.pages.write();
        let id = PageId::new(pages.len() as u32);
        let mut page = Page::new();
        page.update_checksum();
        self.write_through(id, &page)?;
        pages.push(Arc::new(RwLock::new(page)));
        Ok(id)
    }

    fn read_page<R>(&self, id: PageId, f: impl FnOnce(&Page) -> R) -> Result<R> {
        let handle = self.handle(id)?;
        let page = handle.read();
        Ok(f(&page))
    }

    fn write_page<R>(&self, id: PageId, f: impl FnOnce(&mut Page) -> Result<R>) -> Result<R> {
        let handle = self.handle(id)?;
        let mut page = handle.write();
        let mut working = page.clone();
        let out = f(&mut working)?;
        working.update_checksum();
        self.write_through(id, &working)?;
        *page = working;
        Ok(out)
    }

    fn page_count(&self) -> u32 {
        self.pages.read().len() as u32
    }

    fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        debug!(path = %self.path.display(), "synced page file");
        Ok(())
    }
}
