use chrono::NaiveDateTime;

use crate::{
    error::{Error, Result},
    types::Value,
};

/// Either a single item or several in field order.
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Lookup condition of a resolvable reference, sorted by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    items: Vec<(String, Value)>,
}

impl Condition {
    /// Builds a condition, a repeated field keeps its last value.
    pub fn new<I, K, V>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut sorted: Vec<(String, Value)> = vec![];
        for (field, value) in items {
            let field = field.into();
            let value = value.into();
            match sorted.binary_search_by(|(f, _)| f.as_str().cmp(&field)) {
                Ok(idx) => sorted[idx].1 = value,
                Err(idx) => sorted.insert(idx, (field, value)),
            }
        }

        if sorted.is_empty() {
            return Err(Error::Config("Condition cannot be empty".to_owned()));
        }
        Ok(Self { items: sorted })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.items.iter().map(|(f, v)| (f.as_str(), v))
    }

    pub fn field(&self) -> OneOrMany<&str> {
        match self.items.as_slice() {
            [(field, _)] => OneOrMany::One(field.as_str()),
            items => OneOrMany::Many(items.iter().map(|(f, _)| f.as_str()).collect()),
        }
    }

    pub fn value(&self) -> OneOrMany<&Value> {
        match self.items.as_slice() {
            [(_, value)] => OneOrMany::One(value),
            items => OneOrMany::Many(items.iter().map(|(_, v)| v).collect()),
        }
    }

    /// Values joined the way a concatenated lookup column renders them.
    pub fn item_key(&self) -> String {
        self.items
            .iter()
            .map(|(_, v)| v.to_key_string())
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn key(&self) -> ConditionKey {
        ConditionKey(
            self.items
                .iter()
                .map(|(f, v)| (f.clone(), KeyPart::from(v)))
                .collect(),
        )
    }
}

/// Hashable form of a condition, `1` and `"1"` stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionKey(Vec<(String, KeyPart)>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl From<&Value> for KeyPart {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => KeyPart::Null,
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::Int(n) => KeyPart::Int(*n),
            Value::Float(f) => KeyPart::Float(f.to_bits()),
            Value::String(s) => KeyPart::Text(s.clone()),
            Value::DateTime(dt) => KeyPart::DateTime(*dt),
        }
    }
}
