use crate::error::DbError;
use crate::fields::{FieldVal, IntField, StringField};

/// Number of payload bytes reserved for a STRING field, not counting the
/// 4-byte length prefix. Part of the on-disk format: changing this changes
/// every STRING-typed tuple's serialized width.
pub const STRING_SIZE: usize = 128;

// Only support Int and String types
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Type {
    IntType,
    StringType,
}

impl Type {
    // Get the size of the type in bytes
    pub fn get_len(&self) -> usize {
        match self {
            // 4 bytes ints
            Type::IntType => 4,
            // 4 bytes for length + STRING_SIZE bytes for string
            Type::StringType => STRING_SIZE + 4,
        }
    }

    // Parse bytes into a FieldVal
    pub fn parse(&self, bytes: &[u8]) -> Result<FieldVal, DbError> {
        match self {
            Type::IntType => {
                let mut int_bytes = [0; 4];
                int_bytes.copy_from_slice(&bytes[..4]);
                Ok(FieldVal::IntField(IntField::new(i32::from_be_bytes(
                    int_bytes,
                ))))
            }
            Type::StringType => {
                let mut len_bytes = [0; 4];
                len_bytes.copy_from_slice(&bytes[..4]);
                let len = u32::from_be_bytes(len_bytes);
                if len as usize > STRING_SIZE {
                    return Err(DbError::Format(format!(
                        "string length prefix {} exceeds STRING_SIZE {}",
                        len, STRING_SIZE
                    )));
                }
                let string_bytes = bytes[4..len as usize + 4].to_vec();
                let value = String::from_utf8(string_bytes)
                    .map_err(|e| DbError::Format(format!("invalid utf8 in string field: {}", e)))?;
                Ok(FieldVal::StringField(StringField::new(value, len)))
            }
        }
    }
}
