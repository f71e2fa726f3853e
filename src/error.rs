use crate::transaction::TransactionId;

/// Crate-wide error type. Every fallible operation in the core and in the
/// ambient storage/locking stack returns `Result<_, DbError>` instead of
/// panicking or unwrapping through an `Option`.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("tuple schema does not match page/table schema")]
    SchemaMismatch,

    #[error("tuple's TupleDesc does not match the page it is being inserted into")]
    TupleMismatch,

    #[error("page {0:?} has no empty slots")]
    PageFull(crate::heap_page::HeapPageId),

    #[error("tuple not found at the addressed slot")]
    TupleNotFound,

    #[error("transaction {0:?} aborted")]
    TransactionAborted(TransactionId),

    #[error("invalid page id: page number {page_number} out of range (num_pages={num_pages})")]
    InvalidPageId { page_number: usize, num_pages: usize },

    #[error("error reading page from disk: {0}")]
    PageRead(#[source] std::io::Error),

    #[error("error writing page to disk: {0}")]
    PageWrite(#[source] std::io::Error),

    #[error("malformed page bytes: {0}")]
    Format(String),

    #[error("invalid aggregate operation: {0}")]
    InvalidAggregateOp(String),

    #[error("aggregate error: {0}")]
    Aggregate(String),

    #[error("no such element: iterator already exhausted")]
    NoSuchElement,

    #[error("TupleDesc must have at least one field")]
    EmptyTupleDesc,

    #[error("no table named {0:?}")]
    TableNotFound(String),

    #[error("no table with id {0}")]
    TableIdNotFound(usize),

    #[error("malformed schema file: {0}")]
    SchemaFile(String),
}
