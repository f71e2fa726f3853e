use crate::error::DbError;
use crate::types::{Type, STRING_SIZE};
use std::cmp::Ordering;

/// Comparison operators definable on a pair of compatible Fields.
/// `Like` is substring containment on STRING; it is not defined on INT.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Op {
    Lt,
    Le,
    Eq,
    Gt,
    Ge,
    Ne,
    Like,
}

// Wrapper for different types of fields
#[derive(Debug, Clone)]
pub enum FieldVal {
    IntField(IntField),
    StringField(StringField),
}

impl FieldVal {
    // Extracts the inner IntField
    pub fn into_int(self) -> Option<IntField> {
        match self {
            FieldVal::IntField(int_field) => Some(int_field),
            _ => None,
        }
    }
    // Extracts the inner StringField
    pub fn into_string(self) -> Option<StringField> {
        match self {
            FieldVal::StringField(string_field) => Some(string_field),
            _ => None,
        }
    }

    pub fn get_type(&self) -> Type {
        match self {
            FieldVal::IntField(f) => f.get_type(),
            FieldVal::StringField(f) => f.get_type(),
        }
    }

    /// Renders the field as the textual key used by the aggregators and by
    /// `Tuple`'s Display impl.
    pub fn to_key_string(&self) -> String {
        match self {
            FieldVal::IntField(f) => f.get_value().to_string(),
            FieldVal::StringField(f) => f.meaningful_str().to_string(),
        }
    }

    /// Evaluate `self <op> other`. Fails if the two fields are not the same
    /// Type, or if `Like` is applied to an INT.
    pub fn compare(&self, op: Op, other: &FieldVal) -> Result<bool, DbError> {
        match (self, other) {
            (FieldVal::IntField(a), FieldVal::IntField(b)) => {
                let (a, b) = (a.get_value(), b.get_value());
                match op {
                    Op::Lt => Ok(a < b),
                    Op::Le => Ok(a <= b),
                    Op::Eq => Ok(a == b),
                    Op::Gt => Ok(a > b),
                    Op::Ge => Ok(a >= b),
                    Op::Ne => Ok(a != b),
                    Op::Like => Err(DbError::SchemaMismatch),
                }
            }
            (FieldVal::StringField(a), FieldVal::StringField(b)) => {
                let (a, b) = (a.meaningful_str(), b.meaningful_str());
                match op {
                    Op::Lt => Ok(a.cmp(&b) == Ordering::Less),
                    Op::Le => Ok(a.cmp(&b) != Ordering::Greater),
                    Op::Eq => Ok(a == b),
                    Op::Gt => Ok(a.cmp(&b) == Ordering::Greater),
                    Op::Ge => Ok(a.cmp(&b) != Ordering::Less),
                    Op::Ne => Ok(a != b),
                    Op::Like => Ok(a.contains(b)),
                }
            }
            _ => Err(DbError::SchemaMismatch),
        }
    }
}

impl PartialEq for FieldVal {
    fn eq(&self, other: &Self) -> bool {
        self.compare(Op::Eq, other).unwrap_or(false)
    }
}

// Trait for different types of fields
pub trait Field {
    // Get the type of the field
    fn get_type(&self) -> Type;
    // Serialize the field into bytes
    fn serialize(&self) -> Vec<u8>;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct IntField {
    value: i32,
}

impl IntField {
    pub fn new(value: i32) -> Self {
        IntField { value }
    }
    pub fn get_value(&self) -> i32 {
        self.value
    }
}

impl Field for IntField {
    fn get_type(&self) -> Type {
        Type::IntType
    }
    fn serialize(&self) -> Vec<u8> {
        self.value.to_be_bytes().to_vec()
    }
}

#[derive(Debug, Clone)]
pub struct StringField {
    value: String,
    len: u32,
}

impl StringField {
    pub fn new(value: String, len: u32) -> Self {
        StringField { value, len }
    }

    pub fn get_value(&self) -> String {
        self.value.clone()
    }

    /// The first `len` bytes of `value`, the portion the format considers
    /// meaningful. Everything after is unspecified padding.
    pub(crate) fn meaningful_str(&self) -> &str {
        let len = (self.len as usize).min(self.value.len());
        &self.value[..len]
    }
}

impl PartialEq for StringField {
    fn eq(&self, other: &Self) -> bool {
        self.meaningful_str() == other.meaningful_str()
    }
}
impl Eq for StringField {}

impl Field for StringField {
    fn get_type(&self) -> Type {
        Type::StringType
    }

    fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![0; STRING_SIZE + 4];
        bytes[0..4].copy_from_slice(&self.len.to_be_bytes());
        // copy as many bytes as possible from string and pad with 0s
        let str_bytes = self.value.as_bytes();
        let copy_len = std::cmp::min(str_bytes.len(), STRING_SIZE);
        bytes[4..4 + copy_len].copy_from_slice(&str_bytes[..copy_len]);
        bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_int_field() {
        let int_field = IntField::new(1);
        assert_eq!(int_field.get_type(), Type::IntType);
        assert_eq!(int_field.serialize(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_string_field() {
        let string_field = StringField::new("hello".to_string(), 5);
        assert_eq!(string_field.get_type(), Type::StringType);
        let mut serialized = [0; STRING_SIZE + 4];
        serialized[3] = 5;
        serialized[4..9].copy_from_slice("hello".as_bytes());

        assert_eq!(string_field.serialize(), serialized);
    }

    #[test]
    fn string_equality_ignores_padding() {
        let a = StringField::new("hello".to_string(), 5);
        let b = StringField::new("hello\0\0\0".to_string(), 5);
        assert_eq!(a, b);
    }

    #[test]
    fn int_comparisons() {
        let a = FieldVal::IntField(IntField::new(3));
        let b = FieldVal::IntField(IntField::new(5));
        assert!(a.compare(Op::Lt, &b).unwrap());
        assert!(!a.compare(Op::Gt, &b).unwrap());
        assert!(a.compare(Op::Like, &b).is_err());
    }

    #[test]
    fn string_like_is_substring_containment() {
        let a = FieldVal::StringField(StringField::new("hello world".to_string(), 11));
        let b = FieldVal::StringField(StringField::new("world".to_string(), 5));
        assert!(a.compare(Op::Like, &b).unwrap());
        assert!(!b.compare(Op::Like, &a).unwrap());
    }

    #[test]
    fn mismatched_types_fail() {
        let a = FieldVal::IntField(IntField::new(1));
        let b = FieldVal::StringField(StringField::new("1".to_string(), 1));
        assert!(a.compare(Op::Eq, &b).is_err());
    }
}
