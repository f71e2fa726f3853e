//! The pipelined query operator model: the `OpIterator` trait every node in
//! a physical plan implements, plus the four concrete operators a runnable
//! plan tree needs on top of a `HeapFile` scan: `SeqScan`, `Filter`,
//! `Project`, and `Join`. `Aggregate` (the fifth) lives in its own module
//! since it leans on the aggregator machinery.

use crate::error::DbError;
use crate::fields::{FieldVal, Op};
use crate::heap_file::HeapFile;
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use crate::types::Type;

use std::sync::Arc;

/// A node in a pipelined query plan: `open`/`has_next`/`next`/`rewind`/`close`
/// driven by a single pulling thread. `next` folds the usual "has_next then
/// next, else error" pairing into one call returning `Option<Tuple>` (`None`
/// means exhausted), matching Rust's `Iterator` idiom; `has_next` remains as
/// a non-consuming probe for callers (and `Aggregate`/`Join`) that need to
/// peek without advancing.
pub trait OpIterator {
    /// Schema of the tuples this operator yields. Stable once constructed.
    fn tuple_desc(&self) -> &TupleDesc;
    /// May open children. Idempotent with `close`.
    fn open(&mut self) -> Result<(), DbError>;
    /// True if a subsequent `next()` would yield `Some`.
    fn has_next(&mut self) -> Result<bool, DbError>;
    /// Pulls the next tuple, or `None` if exhausted.
    fn next(&mut self) -> Result<Option<Tuple>, DbError>;
    /// Resets to the pre-first state. Observably equivalent to `close(); open()`.
    fn rewind(&mut self) -> Result<(), DbError>;
    /// Releases scan state. Children are closed too. Always safe to call,
    /// including after a `DbError::TransactionAborted` unwound the pull.
    fn close(&mut self);
    /// Plan-tree inspection, for rule-based rewriters (this crate ships no
    /// rewriter, only the seam).
    fn children(&self) -> Vec<&dyn OpIterator>;
    /// Plan-tree rewiring: replaces this node's children in order. Leaf
    /// operators ignore the call; operators with a fixed arity panic if
    /// handed the wrong number of replacements.
    fn set_children(&mut self, children: Vec<Box<dyn OpIterator>>);
}

/// A materialized sequence of tuples exposed as an `OpIterator`. Used to
/// finish off `IntegerAggregator`/`StringAggregator`'s `iterator()` (the
/// aggregator's whole result set is known at once, unlike a streaming scan).
pub struct TupleIter {
    td: TupleDesc,
    tuples: Vec<Tuple>,
    pos: usize,
    is_open: bool,
}

impl TupleIter {
    pub fn new(td: TupleDesc, tuples: Vec<Tuple>) -> Self {
        TupleIter {
            td,
            tuples,
            pos: 0,
            is_open: false,
        }
    }
}

impl OpIterator for TupleIter {
    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    fn open(&mut self) -> Result<(), DbError> {
        self.pos = 0;
        self.is_open = true;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        Ok(self.is_open && self.pos < self.tuples.len())
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.has_next()? {
            return Ok(None);
        }
        let t = self.tuples[self.pos].clone();
        self.pos += 1;
        Ok(Some(t))
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.is_open = false;
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![]
    }

    fn set_children(&mut self, _children: Vec<Box<dyn OpIterator>>) {}
}

/// A single `field <op> literal` comparison, the leaf predicate `Filter`
/// evaluates against each child tuple: one variant per comparison operator,
/// with the literal carried as a typed `FieldVal`.
pub struct Predicate {
    field: usize,
    op: Op,
    value: FieldVal,
}

impl Predicate {
    pub fn new(field: usize, op: Op, value: FieldVal) -> Self {
        Predicate { field, op, value }
    }

    pub fn eval(&self, tuple: &Tuple) -> Result<bool, DbError> {
        let field = tuple.get_field(self.field).ok_or(DbError::SchemaMismatch)?;
        field.compare(self.op, &self.value)
    }
}

/// Wraps a `HeapFile` scan for one transaction as an `OpIterator`, streaming
/// tuples through the real heap file and buffer pool rather than
/// materializing the table up front. An optional `"alias."` prefix is
/// applied to every output field name.
pub struct SeqScan {
    table: Arc<HeapFile>,
    tid: TransactionId,
    td: TupleDesc,
    iter: Option<crate::heap_file::HeapFileIterator>,
}

impl SeqScan {
    pub fn new(table: Arc<HeapFile>, tid: TransactionId, alias: Option<&str>) -> Result<Self, DbError> {
        let base_td = table.get_tuple_desc().clone();
        let td = match alias {
            Some(a) => Self::aliased(&base_td, a)?,
            None => base_td,
        };
        Ok(SeqScan {
            table,
            tid,
            td,
            iter: None,
        })
    }

    fn aliased(td: &TupleDesc, alias: &str) -> Result<TupleDesc, DbError> {
        let n = td.get_num_fields();
        let mut types = Vec::with_capacity(n);
        let mut names = Vec::with_capacity(n);
        for i in 0..n {
            types.push(*td.get_field_type(i).expect("i < num_fields"));
            names.push(td.get_field_name(i).map(|name| format!("{}.{}", alias, name)));
        }
        TupleDesc::new(types, names)
    }
}

impl OpIterator for SeqScan {
    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    fn open(&mut self) -> Result<(), DbError> {
        let mut it = Arc::clone(&self.table).iter(self.tid);
        it.open()?;
        self.iter = Some(it);
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        match &mut self.iter {
            Some(it) => it.has_next(),
            None => Ok(false),
        }
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.has_next()? {
            return Ok(None);
        }
        let it = self.iter.as_mut().expect("has_next()==true implies the scan is open");
        let t = it.next()?;
        Ok(Some(t.with_tuple_desc(&self.td)))
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        match &mut self.iter {
            Some(it) => it.rewind(),
            None => self.open(),
        }
    }

    fn close(&mut self) {
        if let Some(it) = &mut self.iter {
            it.close();
        }
        self.iter = None;
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![]
    }

    fn set_children(&mut self, _children: Vec<Box<dyn OpIterator>>) {}
}

/// Yields only the child tuples a `Predicate` accepts.
pub struct Filter {
    child: Box<dyn OpIterator>,
    pred: Predicate,
    pending: Option<Tuple>,
}

impl Filter {
    pub fn new(pred: Predicate, child: Box<dyn OpIterator>) -> Self {
        Filter {
            child,
            pred,
            pending: None,
        }
    }
}

impl OpIterator for Filter {
    fn tuple_desc(&self) -> &TupleDesc {
        self.child.tuple_desc()
    }

    fn open(&mut self) -> Result<(), DbError> {
        self.child.open()?;
        self.pending = None;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        if self.pending.is_some() {
            return Ok(true);
        }
        while let Some(t) = self.child.next()? {
            if self.pred.eval(&t)? {
                self.pending = Some(t);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.has_next()? {
            return Ok(None);
        }
        Ok(self.pending.take())
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        self.child.rewind()?;
        self.pending = None;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.pending = None;
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn OpIterator>>) {
        assert_eq!(children.len(), 1, "Filter takes exactly one child");
        self.child = children.remove(0);
    }
}

/// Narrows each child tuple to a fixed list of output field indices,
/// resolved once at construction rather than by re-resolving field names
/// per tuple.
pub struct Project {
    child: Box<dyn OpIterator>,
    field_indices: Vec<usize>,
    td: TupleDesc,
}

impl Project {
    pub fn new(field_indices: Vec<usize>, child: Box<dyn OpIterator>) -> Result<Self, DbError> {
        let ctd = child.tuple_desc();
        let mut types = Vec::with_capacity(field_indices.len());
        let mut names = Vec::with_capacity(field_indices.len());
        for &i in &field_indices {
            types.push(*ctd.get_field_type(i).ok_or(DbError::SchemaMismatch)?);
            names.push(ctd.get_field_name(i).map(|n| n.to_string()));
        }
        let td = TupleDesc::new(types, names)?;
        Ok(Project {
            child,
            field_indices,
            td,
        })
    }
}

impl OpIterator for Project {
    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    fn open(&mut self) -> Result<(), DbError> {
        self.child.open()
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        self.child.has_next()
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        match self.child.next()? {
            None => Ok(None),
            Some(t) => {
                let mut fields = Vec::with_capacity(self.field_indices.len());
                for &i in &self.field_indices {
                    fields.push(t.get_field(i).cloned().ok_or(DbError::SchemaMismatch)?);
                }
                Ok(Some(Tuple::new(fields, &self.td)))
            }
        }
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        self.child.rewind()
    }

    fn close(&mut self) {
        self.child.close();
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn OpIterator>>) {
        assert_eq!(children.len(), 1, "Project takes exactly one child");
        self.child = children.remove(0);
    }
}

/// Nested-loops equi-join of two children on one field index each. The
/// right side is drained into a buffer once per `open()` (nested-loops is
/// accepted as a non-goal to optimize); the output `TupleDesc` is built once
/// via `TupleDesc::merge`.
pub struct Join {
    left: Box<dyn OpIterator>,
    right: Box<dyn OpIterator>,
    left_field: usize,
    right_field: usize,
    right_buf: Vec<Tuple>,
    current_left: Option<Tuple>,
    right_pos: usize,
    pending: Option<Tuple>,
    td: TupleDesc,
}

impl Join {
    pub fn new(
        left_field: usize,
        left: Box<dyn OpIterator>,
        right_field: usize,
        right: Box<dyn OpIterator>,
    ) -> Self {
        let td = TupleDesc::merge(left.tuple_desc(), right.tuple_desc());
        Join {
            left,
            right,
            left_field,
            right_field,
            right_buf: vec![],
            current_left: None,
            right_pos: 0,
            pending: None,
            td,
        }
    }

    fn combine(&self, l: &Tuple, r: &Tuple) -> Tuple {
        let fields = l.get_fields().iter().chain(r.get_fields()).cloned().collect();
        Tuple::new(fields, &self.td)
    }
}

impl OpIterator for Join {
    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    fn open(&mut self) -> Result<(), DbError> {
        self.left.open()?;
        self.right.open()?;
        self.right_buf.clear();
        while let Some(t) = self.right.next()? {
            self.right_buf.push(t);
        }
        self.right.close();
        self.current_left = None;
        self.right_pos = 0;
        self.pending = None;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        if self.pending.is_some() {
            return Ok(true);
        }
        loop {
            if self.current_left.is_none() {
                match self.left.next()? {
                    Some(t) => {
                        self.current_left = Some(t);
                        self.right_pos = 0;
                    }
                    None => return Ok(false),
                }
            }
            let left_tuple = self.current_left.as_ref().expect("just set above");
            let left_val = left_tuple.get_field(self.left_field).ok_or(DbError::SchemaMismatch)?;
            while self.right_pos < self.right_buf.len() {
                let right_tuple = &self.right_buf[self.right_pos];
                self.right_pos += 1;
                let right_val = right_tuple
                    .get_field(self.right_field)
                    .ok_or(DbError::SchemaMismatch)?;
                if left_val == right_val {
                    self.pending = Some(self.combine(left_tuple, right_tuple));
                    return Ok(true);
                }
            }
            self.current_left = None;
        }
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        if !self.has_next()? {
            return Ok(None);
        }
        Ok(self.pending.take())
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        self.left.rewind()?;
        self.current_left = None;
        self.right_pos = 0;
        self.pending = None;
        Ok(())
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.right_buf.clear();
        self.current_left = None;
        self.pending = None;
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn OpIterator>>) {
        assert_eq!(children.len(), 2, "Join takes exactly two children");
        self.right = children.remove(1);
        self.left = children.remove(0);
    }
}
