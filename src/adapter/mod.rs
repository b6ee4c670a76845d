//! Database side of the writer.

pub mod memory;
pub mod sql;

pub use memory::MemoryAdapter;

use crate::{error::Result, types::Value};

/// Expression a lookup groups its references by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyExpr {
    Column(String),
    /// columns joined with `|`, in field order
    Concat(Vec<String>),
}

/// Batched lookup of identifiers by key values:
/// `SELECT key, identifier FROM table WHERE key IN (values) AND extra = ?`.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub key: KeyExpr,
    pub identifier: String,
    pub values: Vec<Value>,
    pub extra_conditions: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredicateValue {
    Null,
    One(Value),
    Many(Vec<Value>),
}

/// One `WHERE` item such as `col = ?`, `col IN(?)` or `col IS NULL`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub expr: String,
    pub value: PredicateValue,
}

impl Predicate {
    pub fn new(expr: &str, value: PredicateValue) -> Self {
        Self {
            expr: expr.to_owned(),
            value,
        }
    }
}

pub trait Adapter {
    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// SQL joining already quoted `parts` with `separator`.
    fn concat_sql(&self, parts: &[String], separator: &str) -> String {
        format!("CONCAT_WS('{}', {})", separator, parts.join(", "))
    }

    /// Runs a lookup, returning `(key, identifier)` pairs with the key in
    /// its textual form.
    fn fetch_pairs(&self, select: &Select) -> Result<Vec<(String, Value)>>;

    /// Multi row insert that replaces rows with an existing key.
    fn insert_batch(&mut self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<usize>;

    fn insert_single(&mut self, table: &str, row: &[(String, Value)]) -> Result<usize>;

    /// Identifier generated by the last single row insert into `table`.
    fn last_insert_id(&self, table: &str) -> Result<Value>;

    fn update(&mut self, table: &str, data: &[(String, Value)], condition: &[Predicate]) -> Result<usize>;

    fn delete(&mut self, table: &str, condition: &[Predicate]) -> Result<usize>;

    fn begin_transaction(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}
