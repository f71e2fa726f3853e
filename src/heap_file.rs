use crate::buffer_pool::PAGE_SIZE;
use crate::database;
use crate::error::DbError;
use crate::heap_page::{HeapPage, HeapPageId, Permission};
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// A byte file whose length is always a multiple of `PAGE_SIZE`; page `k`
/// lives at byte offset `k * PAGE_SIZE`. Represents one table on disk.
pub struct HeapFile {
    file: Mutex<File>,
    td: TupleDesc,
    id: usize,
}

impl HeapFile {
    pub fn new(file: File, td: TupleDesc) -> Self {
        HeapFile {
            file: Mutex::new(file),
            td,
            id: Uuid::new_v4().as_u128() as usize,
        }
    }

    // Retrieves the unique id of this table
    pub fn get_id(&self) -> usize {
        self.id
    }

    // Retrieves the tuple descriptor for this table
    pub fn get_tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    // Calculates the number of pages in this HeapFile
    pub fn num_pages(&self) -> usize {
        let file = self.file.lock().unwrap();
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        (len as usize + PAGE_SIZE - 1) / PAGE_SIZE
    }

    // Retrieves the page with the specified pid from disk
    pub fn read_page(&self, pid: &HeapPageId) -> Result<HeapPage, DbError> {
        let mut file = self.file.lock().unwrap();
        let len = file.metadata().map_err(DbError::PageRead)?.len() as usize;
        let num_pages = (len + PAGE_SIZE - 1) / PAGE_SIZE;
        let page_no = pid.get_page_number();
        if page_no >= num_pages {
            return Err(DbError::InvalidPageId {
                page_number: page_no,
                num_pages,
            });
        }

        let mut data = vec![0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start((page_no * PAGE_SIZE) as u64))
            .map_err(DbError::PageRead)?;
        file.read_exact(&mut data).map_err(DbError::PageRead)?;
        HeapPage::new(*pid, data, self.td.clone())
    }

    // Writes the specified page to disk
    pub fn write_page(&self, page: &HeapPage) -> Result<(), DbError> {
        let pid = page.get_id();
        let data = page.get_page_data();
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(
            (pid.get_page_number() * PAGE_SIZE) as u64,
        ))
        .map_err(DbError::PageWrite)?;
        file.write_all(&data).map_err(DbError::PageWrite)?;
        Ok(())
    }

    /// Appends one zeroed page to the end of the file under the file's own
    /// mutex (the "file-level exclusive section" named in the spec for
    /// page growth) and returns its id.
    fn append_empty_page(&self) -> Result<HeapPageId, DbError> {
        let mut file = self.file.lock().unwrap();
        let len = file.metadata().map_err(DbError::PageWrite)?.len();
        let page_no = (len as usize) / PAGE_SIZE;
        file.seek(SeekFrom::Start(len)).map_err(DbError::PageWrite)?;
        file.write_all(&vec![0u8; PAGE_SIZE])
            .map_err(DbError::PageWrite)?;
        Ok(HeapPageId::new(self.id, page_no))
    }

    /// Inserts `tuple` under transaction `tid`: scans existing pages for a
    /// free slot via the buffer pool, appending a fresh page if none is
    /// found. Returns the single page that was dirtied.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: Tuple,
    ) -> Result<Arc<RwLock<HeapPage>>, DbError> {
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();

        let existing_pages = self.num_pages();
        for page_no in 0..existing_pages {
            let pid = HeapPageId::new(self.id, page_no);
            let page_arc = bp.get_page(tid, pid, Permission::Write)?;
            let has_room = {
                let page = page_arc.read().unwrap();
                page.get_num_empty_slots() > 0
            };
            if has_room {
                let mut page = page_arc.write().unwrap();
                page.insert_tuple(tuple)?;
                page.mark_dirty(true, tid);
                drop(page);
                return Ok(page_arc);
            }
        }

        // No page had room: append a fresh one and insert into it.
        log::debug!("table {} has no free slots, appending a page", self.id);
        let new_pid = self.append_empty_page()?;
        let page_arc = bp.get_page(tid, new_pid, Permission::Write)?;
        {
            let mut page = page_arc.write().unwrap();
            page.insert_tuple(tuple)?;
            page.mark_dirty(true, tid);
        }
        Ok(page_arc)
    }

    /// Deletes `tuple` from its home page (per its `RecordId`). Returns the
    /// page that was dirtied.
    pub fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Arc<RwLock<HeapPage>>, DbError> {
        let rid = tuple.get_record_id().ok_or(DbError::TupleNotFound)?;
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let page_arc = bp.get_page(tid, rid.get_page_id(), Permission::Write)?;
        {
            let mut page = page_arc.write().unwrap();
            page.delete_tuple(tuple)?;
            page.mark_dirty(true, tid);
        }
        Ok(page_arc)
    }

    /// Opens a scan iterator over this file's live tuples for transaction
    /// `tid`. The iterator starts `Closed`; call `open()` before use. Takes
    /// `Arc<Self>` rather than `&self` so the returned iterator owns its
    /// handle to the file and can outlive the borrow that produced it.
    /// `SeqScan` stores one directly as a boxed `OpIterator`.
    pub fn iter(self: Arc<Self>, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator {
            heap_file: self,
            tid,
            state: IterState::Closed,
        }
    }
}

enum IterState {
    Closed,
    Open {
        page_pos: usize,
        buf: Vec<Tuple>,
        buf_pos: usize,
    },
}

/// A stateful scan over a HeapFile's live tuples, modeled explicitly as
/// `{Closed, Open(page_pos, page_iter)}` per the spec. Does not snapshot the
/// table: pages not yet visited reflect concurrent inserts, pages already
/// visited do not reflect concurrent inserts/deletes.
pub struct HeapFileIterator {
    heap_file: Arc<HeapFile>,
    tid: TransactionId,
    state: IterState,
}

impl HeapFileIterator {
    /// Free of `&self` so it can be called while `self.state` is already
    /// borrowed mutably in `has_next` below.
    fn materialize_page(
        heap_file: &HeapFile,
        tid: TransactionId,
        page_no: usize,
    ) -> Result<Vec<Tuple>, DbError> {
        let db = database::get_global_db();
        let bp = db.get_buffer_pool();
        let pid = HeapPageId::new(heap_file.get_id(), page_no);
        let page_arc = bp.get_page(tid, pid, Permission::Read)?;
        let page = page_arc.read().unwrap();
        Ok(page.iter().cloned().collect())
    }

    pub fn open(&mut self) -> Result<(), DbError> {
        if self.heap_file.num_pages() == 0 {
            self.state = IterState::Open {
                page_pos: 0,
                buf: vec![],
                buf_pos: 0,
            };
            return Ok(());
        }
        let buf = Self::materialize_page(&self.heap_file, self.tid, 0)?;
        self.state = IterState::Open {
            page_pos: 0,
            buf,
            buf_pos: 0,
        };
        Ok(())
    }

    pub fn has_next(&mut self) -> Result<bool, DbError> {
        let num_pages = self.heap_file.num_pages();
        let heap_file = &self.heap_file;
        let tid = self.tid;
        match &mut self.state {
            IterState::Closed => Ok(false),
            IterState::Open {
                page_pos,
                buf,
                buf_pos,
            } => {
                if *buf_pos < buf.len() {
                    return Ok(true);
                }
                while *page_pos < num_pages.saturating_sub(1) {
                    *page_pos += 1;
                    *buf = Self::materialize_page(heap_file, tid, *page_pos)?;
                    *buf_pos = 0;
                    if !buf.is_empty() {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    pub fn next(&mut self) -> Result<Tuple, DbError> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        match &mut self.state {
            IterState::Open { buf, buf_pos, .. } => {
                let t = buf[*buf_pos].clone();
                *buf_pos += 1;
                Ok(t)
            }
            IterState::Closed => unreachable!("has_next() returned true while closed"),
        }
    }

    pub fn rewind(&mut self) -> Result<(), DbError> {
        self.close();
        self.open()
    }

    pub fn close(&mut self) {
        self.state = IterState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldVal, IntField};
    use crate::types::Type;
    use tempfile::NamedTempFile;

    fn int_td() -> TupleDesc {
        TupleDesc::named(vec![Type::IntType], vec!["v".to_string()]).unwrap()
    }

    fn empty_heap_file() -> HeapFile {
        let file = NamedTempFile::new().unwrap().reopen().unwrap();
        HeapFile::new(file, int_td())
    }

    fn int_tuple(td: &TupleDesc, v: i32) -> Tuple {
        Tuple::new(vec![FieldVal::IntField(IntField::new(v))], td)
    }

    #[test]
    fn empty_file_has_zero_pages() {
        let hf = empty_heap_file();
        assert_eq!(hf.num_pages(), 0);
    }

    #[test]
    fn read_page_out_of_range_fails() {
        let hf = empty_heap_file();
        let pid = HeapPageId::new(hf.get_id(), 0);
        assert!(matches!(
            hf.read_page(&pid),
            Err(DbError::InvalidPageId { .. })
        ));
    }

    /// Registers a HeapFile under a name unique to its own (uuid-derived)
    /// table id, so concurrently-running tests sharing the process-wide
    /// catalog/buffer pool never collide.
    fn register_unique(hf: HeapFile) -> Arc<crate::heap_file::HeapFile> {
        let db = database::get_global_db();
        let id = hf.get_id();
        let name = format!("test_table_{}", id);
        db.get_catalog().add_table(hf, name);
        db.get_catalog().get_table_from_id(id).unwrap()
    }

    #[test]
    fn insert_appends_new_page_once_current_page_is_full() {
        let td = int_td();
        let table = register_unique(HeapFile::new(
            NamedTempFile::new().unwrap().reopen().unwrap(),
            td.clone(),
        ));
        let tid = TransactionId::new();
        let num_slots = HeapPage::num_slots_for(&td);

        for i in 0..(num_slots + 1) {
            table.insert_tuple(tid, int_tuple(&td, i as i32)).unwrap();
        }

        assert_eq!(table.num_pages(), 2);

        let page0 = table.read_page(&HeapPageId::new(table.get_id(), 0)).unwrap();
        assert_eq!(page0.get_num_empty_slots(), 0);
        let page1 = table.read_page(&HeapPageId::new(table.get_id(), 1)).unwrap();
        assert_eq!(page1.get_num_empty_slots(), num_slots - 1);
    }

    #[test]
    fn scan_spans_all_pages_and_rewind_restarts_it() {
        let td = int_td();
        let table = register_unique(HeapFile::new(
            NamedTempFile::new().unwrap().reopen().unwrap(),
            td.clone(),
        ));
        let tid = TransactionId::new();
        let num_slots = HeapPage::num_slots_for(&td);
        for i in 0..(num_slots + 1) {
            table.insert_tuple(tid, int_tuple(&td, i as i32)).unwrap();
        }

        let collect = |table: &Arc<crate::heap_file::HeapFile>| -> Vec<i32> {
            let mut iter = Arc::clone(table).iter(tid);
            iter.open().unwrap();
            let mut out = vec![];
            while iter.has_next().unwrap() {
                let t = iter.next().unwrap();
                out.push(t.get_field(0).unwrap().clone().into_int().unwrap().get_value());
            }
            assert!(!iter.has_next().unwrap());
            out
        };

        let first_pass = collect(&table);
        assert_eq!(first_pass.len(), num_slots + 1);
        assert_eq!(first_pass[num_slots], num_slots as i32);

        let mut iter = Arc::clone(&table).iter(tid);
        iter.open().unwrap();
        for _ in 0..5 {
            iter.next().unwrap();
        }
        iter.rewind().unwrap();
        let mut out = vec![];
        while iter.has_next().unwrap() {
            out.push(
                iter.next()
                    .unwrap()
                    .get_field(0)
                    .unwrap()
                    .clone()
                    .into_int()
                    .unwrap()
                    .get_value(),
            );
        }
        assert_eq!(out, first_pass);
    }

    #[test]
    fn scan_does_not_see_deletes_on_visited_pages() {
        let td = int_td();
        let table = register_unique(HeapFile::new(
            NamedTempFile::new().unwrap().reopen().unwrap(),
            td.clone(),
        ));
        let tid = TransactionId::new();
        for i in 0..5 {
            table.insert_tuple(tid, int_tuple(&td, i)).unwrap();
        }

        let mut iter = Arc::clone(&table).iter(tid);
        iter.open().unwrap();
        let first = iter.next().unwrap();

        table.delete_tuple(tid, &first).unwrap();

        // already-visited page's deletion is invisible to the live iterator buffer
        let mut remaining = vec![first
            .get_field(0)
            .unwrap()
            .clone()
            .into_int()
            .unwrap()
            .get_value()];
        while iter.has_next().unwrap() {
            remaining.push(
                iter.next()
                    .unwrap()
                    .get_field(0)
                    .unwrap()
                    .clone()
                    .into_int()
                    .unwrap()
                    .get_value(),
            );
        }
        assert_eq!(remaining.len(), 5);
    }
}
