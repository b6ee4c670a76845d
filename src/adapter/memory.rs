use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use super::{Adapter, KeyExpr, Predicate, PredicateValue, Select};
use crate::{
    catalog::{PrimaryKey, Schema},
    error::{Error, Result},
    fmt_err,
    types::Value,
};

pub type MemoryRow = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    primary_key: Vec<String>,
    identity: Option<String>,
    rows: Vec<MemoryRow>,
    next_id: i64,
    last_id: Option<i64>,
}

impl MemoryTable {
    fn assign_identity(&mut self, row: &mut MemoryRow) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        match row.get(&identity) {
            Some(value) if !value.is_null() => {
                self.next_id = self.next_id.max(value.to_int() + 1);
            }
            _ => {
                let id = self.next_id;
                self.next_id += 1;
                self.last_id = Some(id);
                row.insert(identity, Value::Int(id));
            }
        }
    }

    fn position_by_key(&self, row: &MemoryRow) -> Option<usize> {
        if self.primary_key.is_empty() {
            return None;
        }
        let key: Option<Vec<String>> = self
            .primary_key
            .iter()
            .map(|c| row.get(c).filter(|v| !v.is_null()).map(|v| v.to_key_string()))
            .collect();
        let key = key?;

        self.rows.iter().position(|existing| {
            self.primary_key
                .iter()
                .zip(&key)
                .all(|(c, k)| existing.get(c).is_some_and(|v| &v.to_key_string() == k))
        })
    }

    fn upsert(&mut self, mut row: MemoryRow) {
        self.assign_identity(&mut row);
        match self.position_by_key(&row) {
            Some(idx) => self.rows[idx].extend(row),
            None => self.rows.push(row),
        }
    }
}

/// Database double keeping tables in memory.
///
/// Understands the predicates the writer generates (`col = ?`,
/// `col IN(?)`, `col IS NULL`), upserts by primary key and hands out
/// auto increment ids. Transactions snapshot the whole data set.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    tables: BTreeMap<String, MemoryTable>,
    snapshot: Option<BTreeMap<String, MemoryTable>>,
    failing: BTreeSet<String>,
    statements: Vec<String>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table for every table of the schema.
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        let mut adapter = Self::new();
        for name in schema.get_table_names()? {
            let table = schema.get_table_info(&name)?;
            let primary_key: Vec<&str> = match table.primary_key_column() {
                PrimaryKey::None => vec![],
                PrimaryKey::Single(column) => vec![column.name.as_str()],
                PrimaryKey::Composite(columns) => columns.iter().map(|c| c.name.as_str()).collect(),
            };
            let identity = table.columns().iter().find(|c| c.is_identity());
            adapter.create_table(&name, &primary_key, identity.map(|c| c.name.as_str()));
        }
        Ok(adapter)
    }

    pub fn create_table(&mut self, name: &str, primary_key: &[&str], identity: Option<&str>) -> &mut Self {
        self.tables.insert(
            name.to_owned(),
            MemoryTable {
                primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
                identity: identity.map(|c| c.to_owned()),
                rows: vec![],
                next_id: 1,
                last_id: None,
            },
        );
        self
    }

    /// Adds a row directly, bypassing the statement log.
    pub fn seed(&mut self, table: &str, row: &[(&str, Value)]) -> Result<&mut Self> {
        let row = row.iter().map(|(c, v)| (c.to_string(), v.clone())).collect();
        self.table_mut(table)?.upsert(row);
        Ok(self)
    }

    /// Makes every write into `table` fail.
    pub fn fail_writes_to(&mut self, table: &str) -> &mut Self {
        self.failing.insert(table.to_owned());
        self
    }

    pub fn rows(&self, table: &str) -> &[MemoryRow] {
        self.tables.get(table).map(|t| t.rows.as_slice()).unwrap_or_default()
    }

    /// Executed statements as `operation table count`.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::Adapter(fmt_err!("no such table: {}", name)))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::Adapter(fmt_err!("no such table: {}", name)))
    }

    fn writable(&mut self, operation: &str, table: &str, count: usize) -> Result<&mut MemoryTable> {
        if self.failing.contains(table) {
            return Err(Error::Adapter(fmt_err!("{} into {} failed", operation, table)));
        }
        self.statements.push(format!("{} {} {}", operation, table, count));
        self.table_mut(table)
    }
}

fn key_of(row: &MemoryRow, key: &KeyExpr) -> Option<String> {
    match key {
        KeyExpr::Column(column) => row.get(column).filter(|v| !v.is_null()).map(|v| v.to_key_string()),
        KeyExpr::Concat(columns) => Some(
            columns
                .iter()
                .map(|c| row.get(c).map(|v| v.to_key_string()).unwrap_or_default())
                .collect::<Vec<_>>()
                .join("|"),
        ),
    }
}

fn same(a: &Value, b: &Value) -> bool {
    !a.is_null() && !b.is_null() && a.to_key_string() == b.to_key_string()
}

fn matches(row: &MemoryRow, predicates: &[Predicate]) -> Result<bool> {
    for predicate in predicates {
        let expr = predicate.expr.trim();
        let null = Value::Null;

        let ok = if let Some(column) = expr.strip_suffix("IS NULL") {
            row.get(column.trim()).unwrap_or(&null).is_null()
        } else if let Some(column) = expr.strip_suffix("IN(?)") {
            let cell = row.get(column.trim()).unwrap_or(&null);
            match &predicate.value {
                PredicateValue::Many(values) => values.iter().any(|v| same(cell, v)),
                PredicateValue::One(value) => same(cell, value),
                PredicateValue::Null => false,
            }
        } else if let Some(column) = expr.strip_suffix("= ?") {
            let cell = row.get(column.trim()).unwrap_or(&null);
            match &predicate.value {
                PredicateValue::One(value) => same(cell, value),
                PredicateValue::Many(values) => values.first().is_some_and(|v| same(cell, v)),
                PredicateValue::Null => false,
            }
        } else {
            return Err(Error::Adapter(fmt_err!("unsupported predicate: {}", expr)));
        };

        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

impl Adapter for MemoryAdapter {
    fn fetch_pairs(&self, select: &Select) -> Result<Vec<(String, Value)>> {
        let table = self.table(&select.table)?;
        let wanted: BTreeSet<String> = select.values.iter().map(|v| v.to_key_string()).collect();

        let pairs = table
            .rows
            .iter()
            .filter(|row| {
                select
                    .extra_conditions
                    .iter()
                    .all(|(c, v)| row.get(c).is_some_and(|cell| same(cell, v)))
            })
            .filter_map(|row| {
                let key = key_of(row, &select.key)?;
                let identifier = row.get(&select.identifier)?.clone();
                wanted.contains(&key).then_some((key, identifier))
            })
            .collect::<Vec<_>>();
        debug!("lookup in {} matched {} rows", select.table, pairs.len());
        Ok(pairs)
    }

    fn insert_batch(&mut self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<usize> {
        let target = self.writable("insert_batch", table, rows.len())?;
        for values in rows {
            let row = columns.iter().cloned().zip(values.iter().cloned()).collect();
            target.upsert(row);
        }
        Ok(rows.len())
    }

    fn insert_single(&mut self, table: &str, row: &[(String, Value)]) -> Result<usize> {
        let target = self.writable("insert_single", table, 1)?;
        target.upsert(row.iter().cloned().collect());
        Ok(1)
    }

    fn last_insert_id(&self, table: &str) -> Result<Value> {
        Ok(self.table(table)?.last_id.map_or(Value::Null, Value::Int))
    }

    fn update(&mut self, table: &str, data: &[(String, Value)], condition: &[Predicate]) -> Result<usize> {
        let target = self.table(table)?;
        let mut hits = vec![];
        for (idx, row) in target.rows.iter().enumerate() {
            if matches(row, condition)? {
                hits.push(idx);
            }
        }

        let target = self.writable("update", table, hits.len())?;
        for idx in &hits {
            target.rows[*idx].extend(data.iter().cloned());
        }
        Ok(hits.len())
    }

    fn delete(&mut self, table: &str, condition: &[Predicate]) -> Result<usize> {
        let target = self.table(table)?;
        let mut keep = Vec::with_capacity(target.rows.len());
        for row in &target.rows {
            keep.push(!matches(row, condition)?);
        }
        let deleted = keep.iter().filter(|k| !**k).count();

        let target = self.writable("delete", table, deleted)?;
        let mut flags = keep.into_iter();
        target.rows.retain(|_| flags.next().unwrap_or(true));
        Ok(deleted)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(Error::Adapter("transaction already started".to_owned()));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::Adapter("no active transaction".to_owned()))
    }

    fn rollback(&mut self) -> Result<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| Error::Adapter("no active transaction".to_owned()))?;
        self.tables = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> MemoryAdapter {
        let mut adapter = MemoryAdapter::new();
        adapter.create_table("parent", &["id"], Some("id"));
        adapter
    }

    #[test]
    fn test_insert_and_identity() {
        let mut adapter = adapter();
        adapter
            .insert_single("parent", &[("name".to_owned(), "x".into())])
            .unwrap();
        assert_eq!(adapter.last_insert_id("parent").unwrap(), Value::Int(1));

        adapter
            .insert_batch(
                "parent",
                &["id".to_owned(), "name".to_owned()],
                &[vec![Value::Int(1), "renamed".into()], vec![Value::Int(7), "y".into()]],
            )
            .unwrap();
        let rows = adapter.rows("parent");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], Value::from("renamed"));

        adapter
            .insert_single("parent", &[("name".to_owned(), "z".into())])
            .unwrap();
        assert_eq!(adapter.last_insert_id("parent").unwrap(), Value::Int(8));
        assert_eq!(
            adapter.statements(),
            ["insert_single parent 1", "insert_batch parent 2", "insert_single parent 1"]
        );
    }

    #[test]
    fn test_fetch_pairs() {
        let mut adapter = adapter();
        adapter
            .seed("parent", &[("name", "x".into()), ("code", "a".into())])
            .unwrap()
            .seed("parent", &[("name", "y".into()), ("code", "b".into())])
            .unwrap();

        let mut select = Select {
            table: "parent".to_owned(),
            key: KeyExpr::Column("name".to_owned()),
            identifier: "id".to_owned(),
            values: vec!["x".into(), "missing".into()],
            extra_conditions: vec![],
        };
        assert_eq!(
            adapter.fetch_pairs(&select).unwrap(),
            vec![("x".to_owned(), Value::Int(1))]
        );

        select.key = KeyExpr::Concat(vec!["code".to_owned(), "name".to_owned()]);
        select.values = vec!["b|y".into()];
        assert_eq!(
            adapter.fetch_pairs(&select).unwrap(),
            vec![("b|y".to_owned(), Value::Int(2))]
        );

        select.extra_conditions = vec![("code".to_owned(), "a".into())];
        assert!(adapter.fetch_pairs(&select).unwrap().is_empty());
    }

    #[test]
    fn test_update_and_delete() {
        let mut adapter = adapter();
        for name in ["x", "y", "z"] {
            adapter.seed("parent", &[("name", name.into())]).unwrap();
        }

        let updated = adapter
            .update(
                "parent",
                &[("name".to_owned(), "w".into())],
                &[Predicate::new("id IN(?)", PredicateValue::Many(vec![1.into(), 2.into()]))],
            )
            .unwrap();
        assert_eq!(updated, 2);

        let deleted = adapter
            .delete("parent", &[Predicate::new("name = ?", PredicateValue::One("w".into()))])
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(adapter.rows("parent").len(), 1);

        assert!(adapter
            .delete("parent", &[Predicate::new("name LIKE ?", PredicateValue::One("%".into()))])
            .is_err());
    }

    #[test]
    fn test_rollback() {
        let mut adapter = adapter();
        adapter.begin_transaction().unwrap();
        adapter
            .insert_single("parent", &[("name".to_owned(), "x".into())])
            .unwrap();
        assert!(adapter.begin_transaction().is_err());
        adapter.rollback().unwrap();
        assert!(adapter.rows("parent").is_empty());
        assert!(adapter.commit().is_err());

        adapter.fail_writes_to("parent");
        assert!(adapter.insert_single("parent", &[]).is_err());
    }
}
