use crate::buffer_pool::PAGE_SIZE;
use crate::error::DbError;
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};

#[derive(Debug, PartialEq, Eq, Clone, Hash, Copy)]
pub enum Permission {
    Read,
    Write,
}

/// Stable identity of a page: (tableId, pageNumber). `table_id` is chosen by
/// the owning HeapFile and is stable for the lifetime of the file handle;
/// `page_number` is zero-based and dense over the file.
#[derive(Debug, PartialEq, Eq, Clone, Hash, Copy)]
pub struct HeapPageId {
    table_id: usize,
    page_number: usize,
}

impl HeapPageId {
    pub fn new(table_id: usize, page_number: usize) -> Self {
        HeapPageId {
            table_id,
            page_number,
        }
    }

    pub fn get_table_id(&self) -> usize {
        self.table_id
    }

    pub fn get_page_number(&self) -> usize {
        self.page_number
    }
}

/// Representation for a set of bytes of data read from disk.
/// Format is header bytes + tuple bytes. Header bytes indicate whether or
/// not a tuple is present in that slot on the page. The number of bytes for
/// the header is `ceil(num_slots / 8)`.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: HeapPageId,
    td: TupleDesc,
    header_size: usize,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    num_slots: usize,
    old_data: Vec<u8>,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    pub fn num_slots_for(td: &TupleDesc) -> usize {
        (PAGE_SIZE * 8) / (td.get_size() * 8 + 1)
    }

    pub fn header_size_for(num_slots: usize) -> usize {
        (num_slots + 7) / 8
    }

    pub fn new(pid: HeapPageId, data: Vec<u8>, td: TupleDesc) -> Result<Self, DbError> {
        if data.len() != PAGE_SIZE {
            return Err(DbError::Format(format!(
                "page data must be exactly {} bytes, got {}",
                PAGE_SIZE,
                data.len()
            )));
        }

        let num_slots = Self::num_slots_for(&td);
        let header_size = Self::header_size_for(num_slots);
        let header = data[..header_size].to_vec();

        let mut tuples = Vec::with_capacity(num_slots);
        for i in 0..num_slots {
            if Self::get_slot(&header, i) {
                let start = header_size + i * td.get_size();
                let end = start + td.get_size();
                let tuple_data = &data[start..end];
                let mut tuple = Tuple::deserialize(tuple_data, &td)?;
                tuple.set_record_id(Some(crate::tuple::RecordId::new(pid, i)));
                tuples.push(Some(tuple));
            } else {
                tuples.push(None);
            }
        }

        Ok(HeapPage {
            pid,
            td,
            header_size,
            header,
            tuples,
            num_slots,
            old_data: data,
            dirtied_by: None,
        })
    }

    pub fn get_id(&self) -> HeapPageId {
        self.pid
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// A byte image of the page taken at load time (or last
    /// `set_before_image` call); used by recovery/abort collaborators.
    pub fn get_before_image(&self) -> Result<HeapPage, DbError> {
        HeapPage::new(self.pid, self.old_data.clone(), self.td.clone())
    }

    pub fn set_before_image(&mut self) {
        self.old_data = self.get_page_data();
    }

    pub fn get_page_data(&self) -> Vec<u8> {
        let mut data = self.header.clone();
        for slot in self.tuples.iter() {
            match slot {
                Some(tuple) => data.extend(tuple.serialize()),
                None => data.extend(vec![0; self.td.get_size()]),
            }
        }
        // pad the rest of the page with 0s
        data.extend(vec![0; PAGE_SIZE - data.len()]);
        data
    }

    fn get_slot(header: &[u8], i: usize) -> bool {
        let idx = i / 8;
        let bit = i % 8;
        if idx >= header.len() {
            return false;
        }
        let byte = header[idx];
        let mask = 1 << bit;
        byte & mask != 0
    }

    fn set_slot(header: &mut [u8], i: usize, value: bool) {
        let idx = i / 8;
        let bit = i % 8;
        let byte = header[idx];
        let mask = 1 << bit;
        if value {
            header[idx] = byte | mask;
        } else {
            header[idx] = byte & !mask;
        }
    }

    /// Inserts `t` into the first free slot in ascending order. Requires
    /// `t`'s schema to match this page's; fails `PageFull` if no slot is
    /// free. Sets `t`'s record id on success. Does not mark the page dirty;
    /// callers invoke `mark_dirty` themselves (see HeapFile::insert_tuple).
    pub fn insert_tuple(&mut self, mut t: Tuple) -> Result<(), DbError> {
        if !t.get_tuple_desc().compatible(&self.td) {
            return Err(DbError::TupleMismatch);
        }
        for i in 0..self.num_slots {
            if !Self::get_slot(&self.header, i) {
                Self::set_slot(&mut self.header, i, true);
                t.set_record_id(Some(crate::tuple::RecordId::new(self.pid, i)));
                self.tuples[i] = Some(t);
                return Ok(());
            }
        }
        Err(DbError::PageFull(self.pid))
    }

    pub fn delete_tuple(&mut self, t: &Tuple) -> Result<(), DbError> {
        let rid = t.get_record_id().ok_or(DbError::TupleNotFound)?;
        let tuple_no = rid.get_tuple_no();
        if rid.get_page_id() != self.pid {
            return Err(DbError::TupleNotFound);
        }
        if !Self::get_slot(&self.header, tuple_no) {
            return Err(DbError::TupleNotFound);
        }

        self.tuples[tuple_no] = None;
        Self::set_slot(&mut self.header, tuple_no, false);
        Ok(())
    }

    pub fn get_num_empty_slots(&self) -> usize {
        (0..self.num_slots)
            .filter(|&i| !Self::get_slot(&self.header, i))
            .count()
    }

    pub fn mark_dirty(&mut self, dirty: bool, tid: TransactionId) {
        if dirty {
            self.dirtied_by = Some(tid);
        } else {
            self.dirtied_by = None;
        }
    }

    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    pub fn iter(&self) -> HeapPageIterator<'_> {
        HeapPageIterator {
            tuples: &self.tuples,
            index: 0,
        }
    }

    pub fn get_tuple(&self, i: usize) -> Option<&Tuple> {
        self.tuples.get(i).and_then(|t| t.as_ref())
    }

    pub fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }
}

pub struct HeapPageIterator<'a> {
    tuples: &'a [Option<Tuple>],
    index: usize,
}

impl<'a> Iterator for HeapPageIterator<'a> {
    type Item = &'a Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.tuples.len() {
            let slot = &self.tuples[self.index];
            self.index += 1;
            if let Some(tuple) = slot {
                return Some(tuple);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldVal, IntField};
    use crate::types::Type;

    fn int_pair_td() -> TupleDesc {
        TupleDesc::named(
            vec![Type::IntType, Type::IntType],
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap()
    }

    fn empty_page(pid: HeapPageId, td: TupleDesc) -> HeapPage {
        HeapPage::new(pid, vec![0u8; PAGE_SIZE], td).unwrap()
    }

    #[test]
    fn slot_math_matches_page_layout() {
        let td = int_pair_td();
        assert_eq!(td.get_size(), 8);
        let num_slots = HeapPage::num_slots_for(&td);
        assert_eq!(num_slots, 511);
        assert_eq!(HeapPage::header_size_for(num_slots), 64);
    }

    #[test]
    fn page_round_trip_through_bytes() {
        let td = int_pair_td();
        let pid = HeapPageId::new(1, 0);
        let mut page = empty_page(pid, td.clone());

        for i in 0..10 {
            let t = Tuple::new(
                vec![
                    FieldVal::IntField(IntField::new(i)),
                    FieldVal::IntField(IntField::new(2 * i)),
                ],
                &td,
            );
            page.insert_tuple(t).unwrap();
        }

        let data = page.get_page_data();
        assert_eq!(data[0], 0xFF);
        assert_eq!(data[1], 0x03);
        assert!(data[2..64].iter().all(|&b| b == 0));

        let reloaded = HeapPage::new(pid, data.clone(), td).unwrap();
        assert_eq!(reloaded.get_page_data(), data);

        let values: Vec<(i32, i32)> = reloaded
            .iter()
            .map(|t| {
                (
                    t.get_field(0).unwrap().clone().into_int().unwrap().get_value(),
                    t.get_field(1).unwrap().clone().into_int().unwrap().get_value(),
                )
            })
            .collect();
        let expected: Vec<(i32, i32)> = (0..10).map(|i| (i, 2 * i)).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn delete_then_reuse_smallest_slot() {
        let td = int_pair_td();
        let pid = HeapPageId::new(1, 0);
        let mut page = empty_page(pid, td.clone());
        let mut inserted = vec![];
        for i in 0..10 {
            let t = Tuple::new(
                vec![
                    FieldVal::IntField(IntField::new(i)),
                    FieldVal::IntField(IntField::new(2 * i)),
                ],
                &td,
            );
            page.insert_tuple(t.clone()).unwrap();
            inserted.push(t);
        }
        let before_empty = page.get_num_empty_slots();

        let t3 = page.get_tuple(3).unwrap().clone();
        page.delete_tuple(&t3).unwrap();
        assert_eq!(page.get_num_empty_slots(), before_empty + 1);

        let t99 = Tuple::new(
            vec![FieldVal::IntField(IntField::new(99)), FieldVal::IntField(IntField::new(99))],
            &td,
        );
        page.insert_tuple(t99).unwrap();
        let reused = page.get_tuple(3).unwrap();
        assert_eq!(reused.get_record_id().unwrap().get_tuple_no(), 3);
        assert_eq!(
            reused.get_field(0).unwrap().clone().into_int().unwrap().get_value(),
            99
        );
    }

    #[test]
    fn invariant_empty_plus_occupied_equals_num_slots() {
        let td = int_pair_td();
        let pid = HeapPageId::new(1, 0);
        let mut page = empty_page(pid, td.clone());
        for i in 0..5 {
            page.insert_tuple(Tuple::new(
                vec![FieldVal::IntField(IntField::new(i)), FieldVal::IntField(IntField::new(i))],
                &td,
            ))
            .unwrap();
        }
        let occupied = page.iter().count();
        assert_eq!(page.get_num_empty_slots() + occupied, page.num_slots());
    }

    #[test]
    fn page_full_is_reported() {
        let td = int_pair_td();
        let pid = HeapPageId::new(1, 0);
        let mut page = empty_page(pid, td.clone());
        for i in 0..page.num_slots() {
            page.insert_tuple(Tuple::new(
                vec![FieldVal::IntField(IntField::new(i as i32)), FieldVal::IntField(IntField::new(0))],
                &td,
            ))
            .unwrap();
        }
        let overflow = Tuple::new(
            vec![FieldVal::IntField(IntField::new(0)), FieldVal::IntField(IntField::new(0))],
            &td,
        );
        assert!(matches!(page.insert_tuple(overflow), Err(DbError::PageFull(_))));
    }
}
