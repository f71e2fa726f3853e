//! Streaming grouped aggregation: `IntegerAggregator` (MIN/MAX/SUM/COUNT/AVG/
//! SUM_COUNT/SC_AVG over an INT column) and `StringAggregator` (COUNT only,
//! over a STRING column). Both fold tuples one at a time via `merge`, then
//! hand back a finalized, independently-cursored `OpIterator` over one
//! output tuple per group.

use crate::error::DbError;
use crate::fields::{FieldVal, IntField, StringField};
use crate::operator::{OpIterator, TupleIter};
use crate::tuple::{Tuple, TupleDesc};
use crate::types::Type;

use std::collections::HashMap;

/// Sentinel carried over from the source's `NO_GROUPING = -1`, for parity in
/// comments/tests; this crate's public API models "no grouping" as `None`.
pub const NO_GROUPING: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Count,
    Avg,
    SumCount,
    ScAvg,
}

impl AggregateOp {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
            AggregateOp::Sum => "SUM",
            AggregateOp::Count => "COUNT",
            AggregateOp::Avg => "AVG",
            AggregateOp::SumCount => "SUM_COUNT",
            AggregateOp::ScAvg => "SC_AVG",
        }
    }
}

/// Tagged-variant group key, used instead of the source's stringly-typed
/// key so `Int`/`Str` group values can be materialized back onto output
/// tuples without re-parsing text (an alternative the spec explicitly
/// sanctions, provided the output `TupleDesc` and group value match).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Int(i32),
    Str(String),
    Ungrouped,
}

fn group_key(gbfield: Option<usize>, tuple: &Tuple) -> Result<GroupKey, DbError> {
    match gbfield {
        None => Ok(GroupKey::Ungrouped),
        Some(g) => match tuple.get_field(g).ok_or(DbError::SchemaMismatch)? {
            FieldVal::IntField(i) => Ok(GroupKey::Int(i.get_value())),
            FieldVal::StringField(s) => Ok(GroupKey::Str(s.meaningful_str().to_string())),
        },
    }
}

fn materialize_group_value(key: &GroupKey) -> FieldVal {
    match key {
        GroupKey::Int(v) => FieldVal::IntField(IntField::new(*v)),
        GroupKey::Str(s) => FieldVal::StringField(StringField::new(s.clone(), s.len() as u32)),
        GroupKey::Ungrouped => unreachable!("materialize_group_value called with no group-by field"),
    }
}

/// `merge` folds one input tuple into group state. `iterator` returns a
/// fresh `OpIterator` over the finalized per-group result tuples; calling
/// it again yields an independent cursor over the same frozen contents.
pub trait Aggregator {
    fn merge(&mut self, tuple: &Tuple) -> Result<(), DbError>;
    fn iterator(&self) -> Result<Box<dyn OpIterator>, DbError>;
}

#[derive(Clone, Copy)]
struct IntGroupState {
    sum: i64,
    count: i64,
    min: i32,
    max: i32,
    sum_count: i64,
}

impl IntGroupState {
    fn new() -> Self {
        IntGroupState {
            sum: 0,
            count: 0,
            min: i32::MAX,
            max: i32::MIN,
            sum_count: 0,
        }
    }
}

/// Per-group state is kept in a `HashMap`, with a side `order` vec recording
/// first-seen order so `iterator()` is deterministic for a given input order
/// within this aggregator instance (re-querying `iterator()` always walks
/// the same `order`).
pub struct IntegerAggregator {
    gbfield: Option<usize>,
    afield: usize,
    op: AggregateOp,
    groups: HashMap<GroupKey, IntGroupState>,
    order: Vec<GroupKey>,
    td: TupleDesc,
}

impl IntegerAggregator {
    pub fn new(
        gbfield: Option<usize>,
        gbfieldtype: Option<Type>,
        afield: usize,
        op: AggregateOp,
    ) -> Result<Self, DbError> {
        let td = Self::build_tuple_desc(gbfield, gbfieldtype, op)?;
        Ok(IntegerAggregator {
            gbfield,
            afield,
            op,
            groups: HashMap::new(),
            order: vec![],
            td,
        })
    }

    fn build_tuple_desc(
        gbfield: Option<usize>,
        gbfieldtype: Option<Type>,
        op: AggregateOp,
    ) -> Result<TupleDesc, DbError> {
        let mut types = vec![];
        if gbfield.is_some() {
            types.push(gbfieldtype.ok_or_else(|| {
                DbError::InvalidAggregateOp("grouped aggregation requires a group-by field type".into())
            })?);
        }
        match op {
            AggregateOp::SumCount => {
                types.push(Type::IntType);
                types.push(Type::IntType);
            }
            _ => types.push(Type::IntType),
        }
        let names = vec![None; types.len()];
        TupleDesc::new(types, names)
    }

    fn int_value(tuple: &Tuple, field: usize) -> Result<i32, DbError> {
        match tuple.get_field(field).ok_or(DbError::SchemaMismatch)? {
            FieldVal::IntField(i) => Ok(i.get_value()),
            FieldVal::StringField(_) => Err(DbError::SchemaMismatch),
        }
    }
}

impl Aggregator for IntegerAggregator {
    fn merge(&mut self, tuple: &Tuple) -> Result<(), DbError> {
        let key = group_key(self.gbfield, tuple)?;
        let aval = Self::int_value(tuple, self.afield)?;
        let sum_count_delta: i64 = if self.op == AggregateOp::ScAvg {
            Self::int_value(tuple, self.afield + 1)? as i64
        } else {
            0
        };

        if !self.groups.contains_key(&key) {
            self.order.push(key.clone());
        }
        let state = self.groups.entry(key).or_insert_with(IntGroupState::new);
        state.sum += aval as i64;
        state.count += 1;
        state.min = state.min.min(aval);
        state.max = state.max.max(aval);
        state.sum_count += sum_count_delta;
        Ok(())
    }

    fn iterator(&self) -> Result<Box<dyn OpIterator>, DbError> {
        let mut tuples = Vec::with_capacity(self.order.len());
        for key in &self.order {
            let state = self.groups.get(key).expect("order and groups stay in sync");
            let mut fields = vec![];
            if self.gbfield.is_some() {
                fields.push(materialize_group_value(key));
            }
            match self.op {
                AggregateOp::Min => fields.push(FieldVal::IntField(IntField::new(state.min))),
                AggregateOp::Max => fields.push(FieldVal::IntField(IntField::new(state.max))),
                AggregateOp::Sum => fields.push(FieldVal::IntField(IntField::new(state.sum as i32))),
                AggregateOp::Count => fields.push(FieldVal::IntField(IntField::new(state.count as i32))),
                AggregateOp::Avg => {
                    if state.count == 0 {
                        return Err(DbError::Aggregate("division by zero in AVG".into()));
                    }
                    fields.push(FieldVal::IntField(IntField::new((state.sum / state.count) as i32)));
                }
                AggregateOp::SumCount => {
                    fields.push(FieldVal::IntField(IntField::new(state.sum as i32)));
                    fields.push(FieldVal::IntField(IntField::new(state.count as i32)));
                }
                AggregateOp::ScAvg => {
                    if state.sum_count == 0 {
                        return Err(DbError::Aggregate("division by zero in SC_AVG".into()));
                    }
                    fields.push(FieldVal::IntField(IntField::new((state.sum / state.sum_count) as i32)));
                }
            }
            tuples.push(Tuple::new(fields, &self.td));
        }
        Ok(Box::new(TupleIter::new(self.td.clone(), tuples)))
    }
}

/// Only `COUNT` is a valid op; any other fails construction with
/// `DbError::InvalidAggregateOp`, per the spec.
pub struct StringAggregator {
    gbfield: Option<usize>,
    afield: usize,
    groups: HashMap<GroupKey, i64>,
    order: Vec<GroupKey>,
    td: TupleDesc,
}

impl StringAggregator {
    pub fn new(
        gbfield: Option<usize>,
        gbfieldtype: Option<Type>,
        afield: usize,
        op: AggregateOp,
    ) -> Result<Self, DbError> {
        if op != AggregateOp::Count {
            return Err(DbError::InvalidAggregateOp(format!(
                "StringAggregator only supports COUNT, got {:?}",
                op.name()
            )));
        }
        let mut types = vec![];
        if gbfield.is_some() {
            types.push(gbfieldtype.ok_or_else(|| {
                DbError::InvalidAggregateOp("grouped aggregation requires a group-by field type".into())
            })?);
        }
        types.push(Type::IntType);
        let names = vec![None; types.len()];
        let td = TupleDesc::new(types, names)?;
        Ok(StringAggregator {
            gbfield,
            afield,
            groups: HashMap::new(),
            order: vec![],
            td,
        })
    }
}

impl Aggregator for StringAggregator {
    fn merge(&mut self, tuple: &Tuple) -> Result<(), DbError> {
        tuple.get_field(self.afield).ok_or(DbError::SchemaMismatch)?;
        let key = group_key(self.gbfield, tuple)?;
        if !self.groups.contains_key(&key) {
            self.order.push(key.clone());
        }
        *self.groups.entry(key).or_insert(0) += 1;
        Ok(())
    }

    fn iterator(&self) -> Result<Box<dyn OpIterator>, DbError> {
        let mut tuples = Vec::with_capacity(self.order.len());
        for key in &self.order {
            let count = *self.groups.get(key).expect("order and groups stay in sync");
            let mut fields = vec![];
            if self.gbfield.is_some() {
                fields.push(materialize_group_value(key));
            }
            fields.push(FieldVal::IntField(IntField::new(count as i32)));
            tuples.push(Tuple::new(fields, &self.td));
        }
        Ok(Box::new(TupleIter::new(self.td.clone(), tuples)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{IntField, StringField};

    fn str_int_td() -> TupleDesc {
        TupleDesc::named(
            vec![Type::StringType, Type::IntType],
            vec!["group".to_string(), "val".to_string()],
        )
        .unwrap()
    }

    fn int_triple_td() -> TupleDesc {
        TupleDesc::named(
            vec![Type::IntType, Type::IntType, Type::IntType],
            vec!["group".to_string(), "val".to_string(), "cnt".to_string()],
        )
        .unwrap()
    }

    fn string_tuple(td: &TupleDesc, group: &str, val: i32) -> Tuple {
        Tuple::new(
            vec![
                FieldVal::StringField(StringField::new(group.to_string(), group.len() as u32)),
                FieldVal::IntField(IntField::new(val)),
            ],
            td,
        )
    }

    fn int_triple(td: &TupleDesc, group: i32, val: i32, cnt: i32) -> Tuple {
        Tuple::new(
            vec![
                FieldVal::IntField(IntField::new(group)),
                FieldVal::IntField(IntField::new(val)),
                FieldVal::IntField(IntField::new(cnt)),
            ],
            td,
        )
    }

    /// COUNT with no grouping over N tuples yields a single (N,).
    #[test]
    fn ungrouped_count() {
        let td = str_int_td();
        let mut agg = IntegerAggregator::new(None, None, 1, AggregateOp::Count).unwrap();
        for i in 0..5 {
            agg.merge(&string_tuple(&td, "x", i)).unwrap();
        }
        let mut it = agg.iterator().unwrap();
        it.open().unwrap();
        let t = it.next().unwrap().unwrap();
        assert_eq!(t.get_field(0).unwrap().clone().into_int().unwrap().get_value(), 5);
        assert!(it.next().unwrap().is_none());
    }

    /// Grouped AVG.
    #[test]
    fn grouped_avg_divides_sum_by_count_per_group() {
        let td = str_int_td();
        let mut agg = IntegerAggregator::new(Some(0), Some(Type::StringType), 1, AggregateOp::Avg).unwrap();
        for (g, v) in [("a", 1), ("a", 3), ("b", 10), ("a", 5), ("b", 30)] {
            agg.merge(&string_tuple(&td, g, v)).unwrap();
        }
        let mut it = agg.iterator().unwrap();
        assert_eq!(it.tuple_desc().get_num_fields(), 2);
        it.open().unwrap();
        let mut results = vec![];
        while let Some(t) = it.next().unwrap() {
            let g = t.get_field(0).unwrap().clone().into_string().unwrap().get_value();
            let v = t.get_field(1).unwrap().clone().into_int().unwrap().get_value();
            results.push((g, v));
        }
        results.sort();
        assert_eq!(results, vec![("a".to_string(), 3), ("b".to_string(), 20)]);
    }

    /// SC_AVG treats the second field as a precomputed count to weight by.
    #[test]
    fn sc_avg_weights_by_precomputed_count() {
        let td = int_triple_td();
        let mut agg = IntegerAggregator::new(Some(0), Some(Type::IntType), 1, AggregateOp::ScAvg).unwrap();
        for (g, v, c) in [(1, 10, 2), (1, 20, 3), (2, 7, 7)] {
            agg.merge(&int_triple(&td, g, v, c)).unwrap();
        }
        let mut it = agg.iterator().unwrap();
        it.open().unwrap();
        let mut results = vec![];
        while let Some(t) = it.next().unwrap() {
            let g = t.get_field(0).unwrap().clone().into_int().unwrap().get_value();
            let v = t.get_field(1).unwrap().clone().into_int().unwrap().get_value();
            results.push((g, v));
        }
        results.sort();
        assert_eq!(results, vec![(1, 6), (2, 1)]);
    }

    /// StringAggregator rejects any op but COUNT.
    #[test]
    fn string_aggregator_rejects_non_count_ops() {
        let err = StringAggregator::new(None, None, 0, AggregateOp::Sum);
        assert!(matches!(err, Err(DbError::InvalidAggregateOp(_))));
    }

    #[test]
    fn string_aggregator_count_grouped() {
        let td = str_int_td();
        let mut agg = StringAggregator::new(Some(0), Some(Type::StringType), 0, AggregateOp::Count).unwrap();
        for (g, v) in [("a", 1), ("a", 2), ("b", 3)] {
            agg.merge(&string_tuple(&td, g, v)).unwrap();
        }
        let mut it = agg.iterator().unwrap();
        it.open().unwrap();
        let mut results = vec![];
        while let Some(t) = it.next().unwrap() {
            let g = t.get_field(0).unwrap().clone().into_string().unwrap().get_value();
            let c = t.get_field(1).unwrap().clone().into_int().unwrap().get_value();
            results.push((g, c));
        }
        results.sort();
        assert_eq!(results, vec![("a".to_string(), 2), ("b".to_string(), 1)]);
    }

    #[test]
    fn iterator_can_be_called_twice_with_same_contents() {
        let td = str_int_td();
        let mut agg = IntegerAggregator::new(None, None, 1, AggregateOp::Sum).unwrap();
        for i in 1..=3 {
            agg.merge(&string_tuple(&td, "x", i)).unwrap();
        }
        let collect = |it: &mut dyn OpIterator| -> Vec<i32> {
            it.open().unwrap();
            let mut out = vec![];
            while let Some(t) = it.next().unwrap() {
                out.push(t.get_field(0).unwrap().clone().into_int().unwrap().get_value());
            }
            out
        };
        let mut first = agg.iterator().unwrap();
        let mut second = agg.iterator().unwrap();
        assert_eq!(collect(&mut *first), collect(&mut *second));
    }
}
