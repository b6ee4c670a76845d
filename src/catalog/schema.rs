use std::{
    cell::OnceCell,
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
};

use log::debug;

use super::{provider::InformationProvider, table::Table};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationType {
    /// neither references nor is referenced
    Root,
    /// only referenced by other tables
    Parent,
    /// only references other tables
    Child,
    Both,
}

#[derive(Debug, Clone, Default)]
struct TableRelations {
    ancestors: Vec<String>,
    descendants: Vec<String>,
}

/// Table graph of one database, fetched lazily from an [`InformationProvider`].
///
/// Table descriptions, the transitive relations and the write order are
/// computed on first use and dropped together by [`Schema::reset`].
pub struct Schema {
    provider: Box<dyn InformationProvider>,
    tables: OnceCell<BTreeMap<String, Table>>,
    relations: OnceCell<HashMap<String, TableRelations>>,
    by_type: OnceCell<HashMap<RelationType, Vec<String>>>,
    sorted: OnceCell<Vec<String>>,
}

impl Schema {
    pub fn new(provider: Box<dyn InformationProvider>) -> Self {
        Self {
            provider,
            tables: OnceCell::new(),
            relations: OnceCell::new(),
            by_type: OnceCell::new(),
            sorted: OnceCell::new(),
        }
    }

    pub fn get_table_info(&self, name: &str) -> Result<&Table> {
        self.fetch()?
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_owned()))
    }

    /// All table names, alphabetically.
    pub fn get_table_names(&self) -> Result<Vec<String>> {
        Ok(self.fetch()?.keys().cloned().collect())
    }

    pub fn get_table_ancestors(&self, name: &str) -> Result<Vec<&Table>> {
        let relations = self.fetch_relations()?;
        let table = self.get_table_info(name)?;
        relations
            .get(&table.name)
            .map(|r| r.ancestors.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|n| self.get_table_info(n))
            .collect()
    }

    pub fn get_table_descendants(&self, name: &str) -> Result<Vec<&Table>> {
        let relations = self.fetch_relations()?;
        let table = self.get_table_info(name)?;
        relations
            .get(&table.name)
            .map(|r| r.descendants.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|n| self.get_table_info(n))
            .collect()
    }

    pub fn get_tables_by_relation_type(&self, relation_type: RelationType) -> Result<&[String]> {
        self.fetch_relations()?;
        Ok(self
            .by_type
            .get()
            .and_then(|m| m.get(&relation_type))
            .map(|v| v.as_slice())
            .unwrap_or_default())
    }

    /// Table names in an order that is safe for inserting rows:
    /// roots, parents, tables with both relations, then children.
    pub fn get_table_names_sorted_by_relation(&self) -> Result<&[String]> {
        if let Some(sorted) = self.sorted.get() {
            return Ok(sorted);
        }

        let relations = self.fetch_relations()?;
        let group = |t: RelationType| -> Vec<String> {
            self.by_type
                .get()
                .and_then(|m| m.get(&t))
                .cloned()
                .unwrap_or_default()
        };

        let both = group(RelationType::Both);
        let members: HashSet<&str> = both.iter().map(|s| s.as_str()).collect();
        // moved tables leave a tombstone so positions of the others stay stable
        let mut list: Vec<Option<String>> = both.iter().cloned().map(Some).collect();
        let position = |list: &[Option<String>], name: &str| {
            list.iter().position(|t| t.as_deref() == Some(name))
        };

        for name in &both {
            let Some(mut current) = position(&list, name) else {
                continue;
            };
            let Some(rel) = relations.get(name) else {
                continue;
            };

            let mut after = current;
            for parent in rel.ancestors.iter().filter(|p| members.contains(p.as_str())) {
                if let Some(p) = position(&list, parent) {
                    after = after.max(p);
                }
            }
            if current < after {
                list.insert(after + 1, Some(name.clone()));
                list[current] = None;
                current = after + 1;
            }

            for child in rel.descendants.iter().filter(|c| members.contains(c.as_str())) {
                let Some(before) = position(&list, child) else {
                    continue;
                };
                if current > before {
                    list.insert(current + 1, Some(child.clone()));
                    list[before] = None;
                }
            }
        }

        let mut sorted = group(RelationType::Root);
        sorted.extend(group(RelationType::Parent));
        sorted.extend(list.into_iter().flatten());
        sorted.extend(group(RelationType::Child));
        debug!("write order: {:?}", sorted);

        Ok(self.sorted.get_or_init(|| sorted))
    }

    pub fn reset(&mut self) {
        self.tables = OnceCell::new();
        self.relations = OnceCell::new();
        self.by_type = OnceCell::new();
        self.sorted = OnceCell::new();
        self.provider.reset();
    }

    fn fetch(&self) -> Result<&BTreeMap<String, Table>> {
        if let Some(tables) = self.tables.get() {
            return Ok(tables);
        }

        let names = self.provider.list_table_names()?;
        let known: HashSet<&str> = names.iter().map(|n| n.as_str()).collect();
        let mut tables = BTreeMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();

        for name in &names {
            let mut table = Table::from_descriptors(
                name,
                &self.provider.columns(name)?,
                &self.provider.indexes(name)?,
                &self.provider.foreign_keys(name)?,
            );

            let mut parents: Vec<String> = vec![];
            for fk in table.foreign_keys() {
                if !known.contains(fk.reference_table.as_str()) {
                    continue;
                }
                children
                    .entry(fk.reference_table.clone())
                    .or_default()
                    .push(name.clone());
                if !parents.contains(&fk.reference_table) {
                    parents.push(fk.reference_table.clone());
                }
            }
            table.parent_tables = parents;
            tables.insert(name.clone(), table);
        }

        for (name, child_tables) in children {
            if let Some(table) = tables.get_mut(&name) {
                table.child_tables = child_tables;
            }
        }

        debug!("fetched {} tables", tables.len());
        Ok(self.tables.get_or_init(|| tables))
    }

    fn fetch_relations(&self) -> Result<&HashMap<String, TableRelations>> {
        if let Some(relations) = self.relations.get() {
            return Ok(relations);
        }

        let tables = self.fetch()?;
        let mut relations = HashMap::new();
        let mut by_type: HashMap<RelationType, Vec<String>> = HashMap::new();

        for (name, table) in tables {
            let ancestors = collect_related(tables, table, |t| t.parent_tables());
            let descendants = collect_related(tables, table, |t| t.child_tables());

            let relation_type = match (!descendants.is_empty(), !ancestors.is_empty()) {
                (false, false) => RelationType::Root,
                (true, false) => RelationType::Parent,
                (false, true) => RelationType::Child,
                (true, true) => RelationType::Both,
            };
            by_type.entry(relation_type).or_default().push(name.clone());
            relations.insert(
                name.clone(),
                TableRelations {
                    ancestors,
                    descendants,
                },
            );
        }

        let _ = self.by_type.set(by_type);
        Ok(self.relations.get_or_init(|| relations))
    }
}

// breadth first walk, the start table itself never ends up in the result
fn collect_related<'a, F>(tables: &'a BTreeMap<String, Table>, start: &'a Table, next: F) -> Vec<String>
where
    F: Fn(&'a Table) -> &'a [String],
{
    let mut result = vec![];
    let mut visited: HashSet<&str> = HashSet::from([start.name.as_str()]);
    let mut queue: VecDeque<&str> = next(start).iter().map(|s| s.as_str()).collect();

    while let Some(name) = queue.pop_front() {
        if !visited.insert(name) {
            continue;
        }
        let Some(table) = tables.get(name) else {
            continue;
        };
        result.push(name.to_owned());
        queue.extend(next(table).iter().map(|s| s.as_str()));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{column::ColumnOptions, provider::StaticProvider};

    fn pk() -> ColumnOptions {
        ColumnOptions::PRIMARY | ColumnOptions::IDENTITY
    }

    fn schema() -> Schema {
        let mut provider = StaticProvider::new();
        provider
            .column("store", "store_id", "smallint", pk())
            .column("website", "website_id", "smallint", pk())
            .column("customer", "entity_id", "int", pk())
            .column("customer", "website_id", "smallint", ColumnOptions::NULLABLE)
            .foreign_key("customer", "website_id", "website", "website_id")
            .column("order", "entity_id", "int", pk())
            .column("order", "customer_id", "int", ColumnOptions::NULLABLE)
            .column("order", "store_id", "smallint", ColumnOptions::empty())
            .foreign_key("order", "customer_id", "customer", "entity_id")
            .foreign_key("order", "store_id", "store", "store_id")
            .column("order_item", "item_id", "int", pk())
            .column("order_item", "order_id", "int", ColumnOptions::empty())
            .foreign_key("order_item", "order_id", "order", "entity_id")
            .column("log", "message", "text", ColumnOptions::empty())
            .foreign_key("log", "message", "not_existing", "id");
        Schema::new(Box::new(provider))
    }

    fn names(tables: Vec<&Table>) -> Vec<&str> {
        tables.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_table_info() {
        let schema = schema();
        let table = schema.get_table_info("order").unwrap();
        assert_eq!(table.parent_tables(), ["customer", "store"]);
        assert_eq!(
            schema.get_table_info("customer").unwrap().child_tables(),
            ["order"]
        );
        assert_eq!(
            schema.get_table_info("unknown").unwrap_err(),
            Error::TableNotFound("unknown".to_owned())
        );
        // foreign keys to unknown tables create no relation
        assert!(schema.get_table_info("log").unwrap().parent_tables().is_empty());
    }

    #[test]
    fn test_table_names() {
        let schema = schema();
        assert_eq!(
            schema.get_table_names().unwrap(),
            vec!["customer", "log", "order", "order_item", "store", "website"]
        );
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let schema = schema();
        assert_eq!(
            names(schema.get_table_ancestors("order_item").unwrap()),
            vec!["order", "customer", "store", "website"]
        );
        assert_eq!(
            names(schema.get_table_descendants("website").unwrap()),
            vec!["customer", "order", "order_item"]
        );
        assert!(schema.get_table_ancestors("website").unwrap().is_empty());
        assert!(schema.get_table_ancestors("unknown").is_err());
    }

    #[test]
    fn test_relation_types() {
        let schema = schema();
        assert_eq!(
            schema.get_tables_by_relation_type(RelationType::Root).unwrap(),
            ["log"]
        );
        assert_eq!(
            schema.get_tables_by_relation_type(RelationType::Parent).unwrap(),
            ["store", "website"]
        );
        assert_eq!(
            schema.get_tables_by_relation_type(RelationType::Both).unwrap(),
            ["customer", "order"]
        );
        assert_eq!(
            schema.get_tables_by_relation_type(RelationType::Child).unwrap(),
            ["order_item"]
        );
    }

    #[test]
    fn test_sorted_by_relation() {
        let schema = schema();
        assert_eq!(
            schema.get_table_names_sorted_by_relation().unwrap(),
            ["log", "store", "website", "customer", "order", "order_item"]
        );
    }

    #[test]
    fn test_sorted_moves_table_after_its_parent() {
        // a -> b -> c and d -> a, alphabetical order puts a before its parent b
        let mut provider = StaticProvider::new();
        provider
            .column("c", "id", "int", pk())
            .column("b", "id", "int", pk())
            .column("b", "c_id", "int", ColumnOptions::empty())
            .foreign_key("b", "c_id", "c", "id")
            .column("a", "id", "int", pk())
            .column("a", "b_id", "int", ColumnOptions::empty())
            .foreign_key("a", "b_id", "b", "id")
            .column("d", "id", "int", pk())
            .column("d", "a_id", "int", ColumnOptions::empty())
            .foreign_key("d", "a_id", "a", "id");
        let schema = Schema::new(Box::new(provider));
        assert_eq!(
            schema.get_tables_by_relation_type(RelationType::Both).unwrap(),
            ["a", "b"]
        );
        assert_eq!(
            schema.get_table_names_sorted_by_relation().unwrap(),
            ["c", "b", "a", "d"]
        );
    }

    #[test]
    fn test_cycle_does_not_loop() {
        let mut provider = StaticProvider::new();
        provider
            .column("a", "id", "int", pk())
            .column("a", "b_id", "int", ColumnOptions::NULLABLE)
            .foreign_key("a", "b_id", "b", "id")
            .column("b", "id", "int", pk())
            .column("b", "a_id", "int", ColumnOptions::NULLABLE)
            .foreign_key("b", "a_id", "a", "id");
        let schema = Schema::new(Box::new(provider));
        assert_eq!(names(schema.get_table_ancestors("a").unwrap()), vec!["b"]);
        let sorted = schema.get_table_names_sorted_by_relation().unwrap();
        assert_eq!(sorted.len(), 2);
    }

    #[test]
    fn test_reset() {
        let mut schema = schema();
        assert_eq!(schema.get_table_names().unwrap().len(), 6);
        schema.reset();
        assert_eq!(schema.get_table_names_sorted_by_relation().unwrap().len(), 6);
    }
}
