use crate::database;
use crate::error::DbError;
use crate::heap_page::{HeapPage, HeapPageId, Permission};
use crate::lock_manager::LockManager;
use crate::transaction::TransactionId;
use crate::tuple::Tuple;
use std::collections::HashMap;

use std::sync::{Arc, RwLock};

pub const PAGE_SIZE: usize = 4096;
pub const DEFAULT_PAGES: usize = 50;

// Cache of pages kept in memory. Eviction is not implemented: a plan that
// touches more distinct pages than `num_pages` in one transaction will grow
// the cache past its nominal bound rather than evict, which is a known
// limitation of this teaching engine (see DESIGN.md).
pub struct BufferPool {
    id_to_page: RwLock<HashMap<HeapPageId, Arc<RwLock<HeapPage>>>>,
    lock_manager: LockManager,
    num_pages: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        BufferPool {
            id_to_page: RwLock::new(HashMap::new()),
            num_pages: DEFAULT_PAGES,
            lock_manager: LockManager::new(),
        }
    }

    // Retrieves the specified page from cache or disk
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: HeapPageId,
        perm: Permission,
    ) -> Result<Arc<RwLock<HeapPage>>, DbError> {
        let exclusive = perm == Permission::Write;
        self.lock_manager.acquire_lock(tid, pid, exclusive)?;

        {
            let id_to_page = self.id_to_page.read().unwrap();
            if let Some(page) = id_to_page.get(&pid) {
                return Ok(Arc::clone(page));
            }
        }
        // read the page from disk and save it to the buffer pool
        log::trace!("buffer pool miss on {:?}, fetching from disk", pid);
        let db = database::get_global_db();
        let catalog = db.get_catalog();
        let table = catalog
            .get_table_from_id(pid.get_table_id())
            .ok_or(DbError::TableIdNotFound(pid.get_table_id()))?;
        let page = table.read_page(&pid)?;
        let mut id_to_page = self.id_to_page.write().unwrap();
        let entry = id_to_page
            .entry(pid)
            .or_insert_with(|| Arc::new(RwLock::new(page)));
        Ok(Arc::clone(entry))
    }

    // Commits the specified transaction, writes all dirty pages to disk, and releases all locks
    pub fn commit_transaction(&self, tid: TransactionId) -> Result<(), DbError> {
        let locked_pages = self.lock_manager.get_locked_pages(tid);
        for pid in locked_pages {
            let entry = {
                let id_to_page = self.id_to_page.read().unwrap();
                id_to_page.get(&pid).cloned()
            };
            if let Some(entry) = entry {
                let mut page = entry.write().unwrap();
                if page.is_dirty().is_some() {
                    let db = database::get_global_db();
                    let catalog = db.get_catalog();
                    let table = catalog
                        .get_table_from_id(pid.get_table_id())
                        .ok_or(DbError::TableIdNotFound(pid.get_table_id()))?;
                    table.write_page(&page)?;
                    page.mark_dirty(false, tid);
                    page.set_before_image();
                    log::debug!("committed dirty page {:?} for {:?}", pid, tid);
                }
            }
        }
        self.lock_manager.release_locks(tid);
        Ok(())
    }

    // Aborts the specified transaction, reverting any changes made, and releases all locks
    pub fn abort_transaction(&self, tid: TransactionId) -> Result<(), DbError> {
        let locked_pages = self.lock_manager.get_locked_pages(tid);
        for pid in locked_pages {
            let entry = {
                let id_to_page = self.id_to_page.read().unwrap();
                id_to_page.get(&pid).cloned()
            };
            if let Some(entry) = entry {
                let mut page = entry.write().unwrap();
                if page.is_dirty().is_some() {
                    // revert the page to its original state
                    *page = page.get_before_image()?;
                    page.mark_dirty(false, tid);
                    log::debug!("reverted dirty page {:?} for aborted {:?}", pid, tid);
                }
            }
        }
        self.lock_manager.release_locks(tid);
        Ok(())
    }

    // Adds the tuple to the specified table
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: usize,
        tuple: Tuple,
    ) -> Result<(), DbError> {
        let db = database::get_global_db();
        let catalog = db.get_catalog();
        let table = catalog
            .get_table_from_id(table_id)
            .ok_or(DbError::TableIdNotFound(table_id))?;
        table.insert_tuple(tid, tuple)?;
        Ok(())
    }

    // Deletes the tuple from its home table
    pub fn delete_tuple(&self, tid: TransactionId, table_id: usize, tuple: &Tuple) -> Result<(), DbError> {
        let db = database::get_global_db();
        let catalog = db.get_catalog();
        let table = catalog
            .get_table_from_id(table_id)
            .ok_or(DbError::TableIdNotFound(table_id))?;
        table.delete_tuple(tid, tuple)?;
        Ok(())
    }

    // Gets the number of pages this buffer pool is nominally sized for
    pub fn get_num_pages(&self) -> usize {
        self.num_pages
    }
}
