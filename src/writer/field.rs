use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{reference::RefId, types::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Queue {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Value handed in by the caller for a column or a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Value(Value),
    Ref(RefId),
    /// only valid in conditions, where it becomes an `IN` list
    List(Vec<Field>),
    /// stored as JSON text
    Json(JsonValue),
    /// stored in PHP `serialize()` format
    Serialized(JsonValue),
}

pub type Row = BTreeMap<String, Field>;

impl Field {
    pub fn as_ref_id(&self) -> Option<RefId> {
        match self {
            Field::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<RefId> for Field {
    fn from(id: RefId) -> Self {
        Field::Ref(id)
    }
}

impl From<Vec<Field>> for Field {
    fn from(items: Vec<Field>) -> Self {
        Field::List(items)
    }
}

macro_rules! field_from_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Field {
                fn from(v: $t) -> Self {
                    Field::Value(v.into())
                }
            }
        )*
    };
}

field_from_value!(Value, i64, i32, f64, bool, &str, String, chrono::NaiveDateTime);

/// Stored cell of a scheduled row: a value or a reference still waiting
/// for one.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(Value),
    Ref(RefId),
}

impl Cell {
    /// Value to write, an unresolved reference writes `NULL`.
    pub fn to_value(&self) -> Value {
        match self {
            Cell::Value(v) => v.clone(),
            Cell::Ref(_) => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Null,
    One(Cell),
    Many(Vec<Cell>),
}

/// Condition with its column already turned into an expression,
/// e.g. `parent_id = ?`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionItem {
    pub expr: String,
    pub value: ConditionValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScheduledRow {
    Insert(Vec<(String, Cell)>),
    Update {
        data: Vec<(String, Cell)>,
        condition: Vec<ConditionItem>,
    },
    Delete(Vec<ConditionItem>),
}

/// Where a reference is used, so its value can be written back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Slot {
    Column(String),
    Condition { expr: String, index: Option<usize> },
}

impl ScheduledRow {
    pub(crate) fn fill(&mut self, slot: &Slot, value: &Value) {
        let cell = match (self, slot) {
            (ScheduledRow::Insert(data), Slot::Column(column))
            | (ScheduledRow::Update { data, .. }, Slot::Column(column)) => {
                data.iter_mut().find(|(c, _)| c == column).map(|(_, cell)| cell)
            }
            (ScheduledRow::Update { condition, .. }, Slot::Condition { expr, index })
            | (ScheduledRow::Delete(condition), Slot::Condition { expr, index }) => condition
                .iter_mut()
                .find(|item| &item.expr == expr)
                .and_then(|item| match (&mut item.value, index) {
                    (ConditionValue::One(cell), None) => Some(cell),
                    (ConditionValue::Many(cells), Some(i)) => cells.get_mut(*i),
                    _ => None,
                }),
            _ => None,
        };

        if let Some(cell) = cell {
            *cell = Cell::Value(value.clone());
        }
    }
}
