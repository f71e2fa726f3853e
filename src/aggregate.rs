//! The `Aggregate` operator: wraps a child `OpIterator`, drains it through
//! an `IntegerAggregator`/`StringAggregator` the first time it's pulled, and
//! afterwards hands out the finalized per-group result tuples.

use crate::aggregator::{AggregateOp, Aggregator, IntegerAggregator, StringAggregator};
use crate::error::DbError;
use crate::operator::OpIterator;
use crate::tuple::{Tuple, TupleDesc};
use crate::types::Type;

/// Computes one aggregate over `afield`, optionally grouped by `gbfield`.
/// Draining the child happens lazily, on the first `open()`+`next()`/`has_next()`
/// pull rather than at construction, matching the rest of this crate's
/// pipelined operators, none of which touch their child before `open()`.
pub struct Aggregate {
    child: Box<dyn OpIterator>,
    afield: usize,
    gbfield: Option<usize>,
    op: AggregateOp,
    td: TupleDesc,
    result: Option<Box<dyn OpIterator>>,
}

impl Aggregate {
    /// `gbfield = None` aggregates the whole input into a single group
    /// (the source's `NO_GROUPING` sentinel, modeled here as `Option::None`).
    pub fn new(
        child: Box<dyn OpIterator>,
        afield: usize,
        gbfield: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self, DbError> {
        let ctd = child.tuple_desc();
        let afield_type = *ctd.get_field_type(afield).ok_or(DbError::SchemaMismatch)?;
        if afield_type == Type::StringType && op != AggregateOp::Count {
            return Err(DbError::InvalidAggregateOp(
                "STRING fields only support COUNT".to_string(),
            ));
        }

        let mut types = vec![];
        let mut names = vec![];
        if let Some(g) = gbfield {
            let t = *ctd.get_field_type(g).ok_or(DbError::SchemaMismatch)?;
            types.push(t);
            names.push(ctd.get_field_name(g).map(|n| n.to_string()));
        }
        let aname = format!(
            "{}({})",
            op.name(),
            ctd.get_field_name(afield).unwrap_or("?")
        );
        // SUM_COUNT is the one op that yields two aggregate columns
        // (sum, count) instead of one; everything else yields a single
        // IntField column named "<OP>(<field>)".
        if op == AggregateOp::SumCount {
            types.push(Type::IntType);
            names.push(Some(format!("{}.sum", aname)));
            types.push(Type::IntType);
            names.push(Some(format!("{}.count", aname)));
        } else {
            types.push(Type::IntType);
            names.push(Some(aname));
        }
        let td = TupleDesc::new(types, names)?;

        Ok(Aggregate {
            child,
            afield,
            gbfield,
            op,
            td,
            result: None,
        })
    }

    fn build_aggregator(&self) -> Result<Box<dyn Aggregator>, DbError> {
        let ctd = self.child.tuple_desc();
        let gbfield_type = self.gbfield.map(|g| *ctd.get_field_type(g).expect("validated in new()"));
        match ctd.get_field_type(self.afield).expect("validated in new()") {
            Type::IntType => Ok(Box::new(IntegerAggregator::new(
                self.gbfield,
                gbfield_type,
                self.afield,
                self.op,
            )?)),
            Type::StringType => Ok(Box::new(StringAggregator::new(
                self.gbfield,
                gbfield_type,
                self.afield,
                self.op,
            )?)),
        }
    }

    fn drain_child(&mut self) -> Result<Box<dyn OpIterator>, DbError> {
        let mut aggregator = self.build_aggregator()?;
        self.child.open()?;
        while let Some(t) = self.child.next()? {
            aggregator.merge(&t)?;
        }
        self.child.close();
        aggregator.iterator()
    }
}

impl OpIterator for Aggregate {
    fn tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    fn open(&mut self) -> Result<(), DbError> {
        let mut it = self.drain_child()?;
        it.open()?;
        self.result = Some(it);
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        match &mut self.result {
            Some(it) => it.has_next(),
            None => Ok(false),
        }
    }

    fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        match &mut self.result {
            Some(it) => it.next(),
            None => Ok(None),
        }
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        match &mut self.result {
            Some(it) => it.rewind(),
            None => self.open(),
        }
    }

    fn close(&mut self) {
        if let Some(it) = &mut self.result {
            it.close();
        }
        self.result = None;
    }

    fn children(&self) -> Vec<&dyn OpIterator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn OpIterator>>) {
        assert_eq!(children.len(), 1, "Aggregate takes exactly one child");
        self.child = children.remove(0);
        self.result = None;
    }
}
