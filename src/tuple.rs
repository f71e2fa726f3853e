use std::fmt::{Display, Formatter};

use crate::error::DbError;
use crate::fields::{Field, FieldVal};
use crate::heap_page::HeapPageId;
use crate::types::Type;

// Reference to a tuple on a page of a table
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct RecordId {
    pid: HeapPageId,
    tuple_no: usize,
}

impl RecordId {
    pub fn new(pid: HeapPageId, tuple_no: usize) -> Self {
        RecordId { pid, tuple_no }
    }

    pub fn get_page_id(&self) -> HeapPageId {
        self.pid
    }

    pub fn get_tuple_no(&self) -> usize {
        self.tuple_no
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TupleDesc {
    types: Vec<Type>,
    fields: Vec<Option<String>>,
}

impl TupleDesc {
    /// Builds a schema from parallel `types`/`fields` vectors. Fails with
    /// `DbError::EmptyTupleDesc` if `types` is empty, since every TupleDesc
    /// has at least one field.
    pub fn new(types: Vec<Type>, fields: Vec<Option<String>>) -> Result<Self, DbError> {
        if types.is_empty() {
            return Err(DbError::EmptyTupleDesc);
        }
        Ok(TupleDesc { types, fields })
    }

    /// Convenience constructor for schemas where every field is named.
    pub fn named(types: Vec<Type>, names: Vec<String>) -> Result<Self, DbError> {
        TupleDesc::new(types, names.into_iter().map(Some).collect())
    }

    // Merge two TupleDescs into one, with td1.num_fields + td2.num_fields
    pub fn merge(td1: &TupleDesc, td2: &TupleDesc) -> TupleDesc {
        let mut types = td1.types.clone();
        types.extend(td2.types.clone());
        let mut field_names = td1.fields.clone();
        field_names.extend(td2.fields.clone());
        // Both inputs are non-empty TupleDescs, so the merge is too.
        TupleDesc { types, fields: field_names }
    }

    pub fn get_num_fields(&self) -> usize {
        self.types.len()
    }

    // Returns the (possibly null) name of the ith field.
    pub fn get_field_name(&self, i: usize) -> Option<&str> {
        self.fields.get(i).and_then(|n| n.as_deref())
    }

    // Returns the (possibly null) index of the field with a given name.
    pub fn name_to_id(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|n| n.as_deref() == Some(name))
    }

    // Returns the type of the ith field of this TupleDesc.
    pub fn get_field_type(&self, i: usize) -> Option<&Type> {
        self.types.get(i)
    }

    // Return the size (in bytes) of tuples corresponding to this TupleDesc.
    pub fn get_size(&self) -> usize {
        self.types.iter().fold(0, |acc, t| acc + t.get_len())
    }

    /// Positional equality by type only; field names are not compared.
    pub fn compatible(&self, other: &TupleDesc) -> bool {
        self.types == other.types
    }
}

// Describe the schema of a tuple/table
#[derive(Debug, Clone)]
pub struct Tuple {
    fields: Vec<FieldVal>,
    td: TupleDesc,
    rid: Option<RecordId>,
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();
        for (i, field) in self.fields.iter().enumerate() {
            let name = self.td.get_field_name(i).unwrap_or("?");
            s.push_str(&format!("{}: {}", name, field.to_key_string()));
            if i != self.fields.len() - 1 {
                s.push_str(", ");
            }
        }
        write!(f, "{{{}}}", s)
    }
}

impl Tuple {
    pub fn new(fields: Vec<FieldVal>, td: &TupleDesc) -> Self {
        Tuple {
            fields,
            td: td.clone(),
            rid: None,
        }
    }

    pub fn get_tuple_desc(&self) -> &TupleDesc {
        &self.td
    }

    pub fn get_record_id(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    pub fn get_field(&self, i: usize) -> Option<&FieldVal> {
        self.fields.get(i)
    }

    pub fn set_field(&mut self, i: usize, field: FieldVal) {
        self.fields[i] = field;
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![];
        for field in self.fields.iter() {
            match field {
                FieldVal::IntField(int_field) => bytes.extend(int_field.serialize()),
                FieldVal::StringField(string_field) => bytes.extend(string_field.serialize()),
            }
        }
        bytes
    }

    pub fn deserialize(bytes: &[u8], td: &TupleDesc) -> Result<Self, DbError> {
        let mut offset = 0;
        let mut fields = vec![];
        for t in td.types.iter() {
            let field = t.parse(&bytes[offset..])?;
            offset += t.get_len();
            fields.push(field);
        }
        Ok(Tuple::new(fields, td))
    }

    pub fn get_fields(&self) -> &[FieldVal] {
        &self.fields
    }

    /// Rebuilds this tuple against a different, type-compatible TupleDesc,
    /// e.g. to apply a table alias prefix to field names in `SeqScan`.
    /// Field values and the record id are carried over unchanged.
    pub fn with_tuple_desc(&self, td: &TupleDesc) -> Tuple {
        debug_assert!(self.td.compatible(td), "with_tuple_desc requires a type-compatible schema");
        let mut t = Tuple::new(self.fields.clone(), td);
        t.set_record_id(self.rid);
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{IntField, StringField};
    use crate::types::Type;

    fn td2() -> TupleDesc {
        TupleDesc::named(
            vec![Type::IntType, Type::StringType],
            vec!["int".to_string(), "string".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_tuple_desc_merge() {
        let td1 = td2();
        let td2_ = td2();
        let td3 = TupleDesc::merge(&td1, &td2_);
        assert_eq!(td3.get_num_fields(), 4);
        assert_eq!(td3.get_field_name(0), Some("int"));
        assert_eq!(td3.get_field_name(1), Some("string"));
        assert_eq!(td3.get_field_name(2), Some("int"));
        assert_eq!(td3.get_field_name(3), Some("string"));
    }

    #[test]
    fn test_tuple_desc_merge_size_is_additive() {
        let td1 = td2();
        let td2_ = td2();
        let merged = TupleDesc::merge(&td1, &td2_);
        assert_eq!(merged.get_size(), td1.get_size() + td2_.get_size());
    }

    #[test]
    fn test_tuple_desc_len() {
        let td = td2();
        assert_eq!(td.get_size(), 4 + crate::types::STRING_SIZE + 4);
    }

    #[test]
    fn empty_tuple_desc_rejected() {
        assert!(TupleDesc::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_tuple_serialize_deserialize() {
        let td = td2();
        let tuple = Tuple::new(
            vec![
                FieldVal::IntField(IntField::new(1)),
                FieldVal::StringField(StringField::new("hello".to_string(), 5)),
            ],
            &td,
        );
        let bytes = tuple.serialize();
        let tuple2 = Tuple::deserialize(&bytes, &td).unwrap();
        assert_eq!(tuple, tuple2);
    }
}
