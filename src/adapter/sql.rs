//! SQL text for adapters backed by a real database. Values are never
//! inlined, every `?` placeholder has a bind value in the returned list.

use super::{Adapter, KeyExpr, Predicate, PredicateValue, Select};
use crate::types::Value;

pub fn key_sql<A: Adapter + ?Sized>(adapter: &A, key: &KeyExpr) -> String {
    match key {
        KeyExpr::Column(column) => adapter.quote_identifier(column),
        KeyExpr::Concat(columns) => {
            let parts: Vec<String> = columns.iter().map(|c| adapter.quote_identifier(c)).collect();
            adapter.concat_sql(&parts, "|")
        }
    }
}

impl Select {
    pub fn to_sql<A: Adapter + ?Sized>(&self, adapter: &A) -> (String, Vec<Value>) {
        let key = key_sql(adapter, &self.key);
        let mut sql = format!(
            "SELECT {}, {} FROM {} WHERE {} IN ({})",
            key,
            adapter.quote_identifier(&self.identifier),
            adapter.quote_identifier(&self.table),
            key,
            placeholders(self.values.len()),
        );
        let mut binds = self.values.clone();
        for (column, value) in &self.extra_conditions {
            sql.push_str(&format!(" AND {} = ?", adapter.quote_identifier(column)));
            binds.push(value.clone());
        }
        (sql, binds)
    }
}

impl Predicate {
    /// Expression with its placeholder expanded to the number of values.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        match &self.value {
            PredicateValue::Null if self.expr.contains('?') => (self.expr.clone(), vec![Value::Null]),
            PredicateValue::Null => (self.expr.clone(), vec![]),
            PredicateValue::One(value) => (self.expr.clone(), vec![value.clone()]),
            PredicateValue::Many(values) => (
                self.expr.replacen('?', &placeholders(values.len()), 1),
                values.clone(),
            ),
        }
    }
}

// an empty list renders NULL, which matches nothing
fn placeholders(count: usize) -> String {
    if count == 0 {
        return "NULL".to_owned();
    }
    vec!["?"; count].join(", ")
}

pub fn where_sql(predicates: &[Predicate]) -> (String, Vec<Value>) {
    if predicates.is_empty() {
        return (String::new(), vec![]);
    }

    let mut parts = Vec::with_capacity(predicates.len());
    let mut binds = vec![];
    for predicate in predicates {
        let (sql, values) = predicate.to_sql();
        parts.push(format!("({})", sql));
        binds.extend(values);
    }
    (format!(" WHERE {}", parts.join(" AND ")), binds)
}

/// `{verb} INTO table (columns) VALUES (...), (...)`, e.g. with
/// `INSERT OR REPLACE` or `REPLACE` as verb.
pub fn insert_sql<A: Adapter + ?Sized>(
    adapter: &A,
    verb: &str,
    table: &str,
    columns: &[String],
    row_count: usize,
) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| adapter.quote_identifier(c)).collect();
    let row = format!("({})", placeholders(columns.len()));
    format!(
        "{} INTO {} ({}) VALUES {}",
        verb,
        adapter.quote_identifier(table),
        quoted.join(", "),
        vec![row; row_count].join(", ")
    )
}

pub fn update_sql<A: Adapter + ?Sized>(
    adapter: &A,
    table: &str,
    data: &[(String, Value)],
    condition: &[Predicate],
) -> (String, Vec<Value>) {
    let sets: Vec<String> = data
        .iter()
        .map(|(column, _)| format!("{} = ?", adapter.quote_identifier(column)))
        .collect();
    let mut binds: Vec<Value> = data.iter().map(|(_, v)| v.clone()).collect();
    let (where_clause, where_binds) = where_sql(condition);
    binds.extend(where_binds);
    (
        format!(
            "UPDATE {} SET {}{}",
            adapter.quote_identifier(table),
            sets.join(", "),
            where_clause
        ),
        binds,
    )
}

pub fn delete_sql<A: Adapter + ?Sized>(adapter: &A, table: &str, condition: &[Predicate]) -> (String, Vec<Value>) {
    let (where_clause, binds) = where_sql(condition);
    (
        format!("DELETE FROM {}{}", adapter.quote_identifier(table), where_clause),
        binds,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;

    #[test]
    fn test_select_sql() {
        let adapter = MemoryAdapter::new();
        let select = Select {
            table: "store".to_owned(),
            key: KeyExpr::Concat(vec!["code".to_owned(), "website_id".to_owned()]),
            identifier: "store_id".to_owned(),
            values: vec!["default|1".into(), "admin|0".into()],
            extra_conditions: vec![("is_active".to_owned(), Value::Int(1))],
        };
        let (sql, binds) = select.to_sql(&adapter);
        assert_eq!(
            sql,
            "SELECT CONCAT_WS('|', `code`, `website_id`), `store_id` FROM `store` \
             WHERE CONCAT_WS('|', `code`, `website_id`) IN (?, ?) AND `is_active` = ?"
        );
        assert_eq!(binds.len(), 3);
    }

    #[test]
    fn test_predicate_sql() {
        let many = Predicate::new("id IN(?)", PredicateValue::Many(vec![1.into(), 2.into()]));
        assert_eq!(many.to_sql().0, "id IN(?, ?)");
        let empty = Predicate::new("id IN(?)", PredicateValue::Many(vec![]));
        assert_eq!(empty.to_sql(), ("id IN(NULL)".to_owned(), vec![]));
        let null = Predicate::new("parent_id IS NULL", PredicateValue::Null);
        assert_eq!(null.to_sql(), ("parent_id IS NULL".to_owned(), vec![]));

        let (sql, binds) = where_sql(&[many, null]);
        assert_eq!(sql, " WHERE (id IN(?, ?)) AND (parent_id IS NULL)");
        assert_eq!(binds, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_write_sql() {
        let adapter = MemoryAdapter::new();
        let columns = vec!["id".to_owned(), "name".to_owned()];
        assert_eq!(
            insert_sql(&adapter, "REPLACE", "parent", &columns, 2),
            "REPLACE INTO `parent` (`id`, `name`) VALUES (?, ?), (?, ?)"
        );

        let (sql, binds) = update_sql(
            &adapter,
            "parent",
            &[("name".to_owned(), "y".into())],
            &[Predicate::new("id = ?", PredicateValue::One(5.into()))],
        );
        assert_eq!(sql, "UPDATE `parent` SET `name` = ? WHERE (id = ?)");
        assert_eq!(binds, vec![Value::from("y"), Value::Int(5)]);

        assert_eq!(
            delete_sql(&adapter, "parent", &[]).0,
            "DELETE FROM `parent`"
        );
    }
}
