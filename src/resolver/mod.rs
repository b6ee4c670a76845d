//! Turning lookup references into values.
//!
//! [`ResolverContainer`] hands out one reference per distinct lookup,
//! [`Resolver`] resolves all pending lookups of a table with one query per
//! key shape.

pub mod container;
pub mod rules;

use std::collections::BTreeMap;

use log::{debug, warn};

pub use container::ResolverContainer;
pub use rules::{MappingRules, RowRuleField};

use crate::{
    adapter::{Adapter, KeyExpr, Select},
    catalog::{PrimaryKey, Schema},
    error::Result,
    reference::RefId,
    types::Value,
};

/// Column to read identifiers from, plus equality conditions every looked
/// up row must match.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LookupTarget {
    pub identifier_column: String,
    pub extra_conditions: Vec<(String, Value)>,
}

impl LookupTarget {
    pub fn new(identifier_column: &str) -> Self {
        Self {
            identifier_column: identifier_column.to_owned(),
            extra_conditions: vec![],
        }
    }

    pub fn with_condition(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.extra_conditions.push((column.to_owned(), value.into()));
        self
    }
}

/// Picks the identifier column for tables without a single column
/// primary key.
pub trait ResolveTableHook {
    fn resolve_table(&self, resolve_table: &str, lookup_table: &str) -> Option<LookupTarget>;
}

impl<F> ResolveTableHook for F
where
    F: Fn(&str, &str) -> Option<LookupTarget>,
{
    fn resolve_table(&self, resolve_table: &str, lookup_table: &str) -> Option<LookupTarget> {
        self(resolve_table, lookup_table)
    }
}

// references waiting for the same key value
type Bucket = BTreeMap<String, (Value, Vec<RefId>)>;

pub struct Resolver {
    container: ResolverContainer,
    hooks: Vec<Box<dyn ResolveTableHook>>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(MappingRules::default())
    }
}

impl Resolver {
    pub fn new(rules: MappingRules) -> Self {
        Self {
            container: ResolverContainer::new(rules),
            hooks: vec![],
        }
    }

    /// Registers a hook, the first hook returning a target wins.
    pub fn add_hook(&mut self, hook: Box<dyn ResolveTableHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    pub fn container(&self) -> &ResolverContainer {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut ResolverContainer {
        &mut self.container
    }

    /// Looks up every unresolved reference of `table`.
    ///
    /// References are grouped by the fields of their condition. Each group
    /// becomes one `SELECT key, identifier ... WHERE key IN (...)`, with
    /// multi field conditions matched against the `|` joined columns.
    /// References without a matching row stay unresolved.
    pub fn resolve(&mut self, schema: &Schema, adapter: &dyn Adapter, table: &str) -> Result<&mut Self> {
        let ids = self.container.unresolved(Some(table));
        if ids.is_empty() {
            return Ok(self);
        }

        let table = self.container.rules().resolve_alias(table);
        let info = schema.get_table_info(&table)?;
        let target = match info.primary_key_column() {
            PrimaryKey::Single(column) => Some(LookupTarget::new(&column.name)),
            _ => self
                .hooks
                .iter()
                .find_map(|hook| hook.resolve_table(&table, &info.name)),
        };
        let target = match target {
            Some(target) if !target.identifier_column.is_empty() => target,
            _ => {
                warn!(
                    "no identifier column for \"{}\", {} references left unresolved",
                    table,
                    ids.len()
                );
                return Ok(self);
            }
        };

        let mut groups: BTreeMap<KeyExpr, Bucket> = BTreeMap::new();
        let arena = self.container.arena();
        for id in ids {
            let Some(condition) = arena.get(id).and_then(|r| r.condition()) else {
                continue;
            };

            let mut items = condition.iter();
            let (key, value) = match (items.next(), items.next()) {
                (Some((field, value)), None) => (KeyExpr::Column(field.to_owned()), value.clone()),
                _ => (
                    KeyExpr::Concat(condition.iter().map(|(field, _)| field.to_owned()).collect()),
                    Value::String(condition.item_key()),
                ),
            };
            groups
                .entry(key)
                .or_default()
                .entry(condition.item_key())
                .or_insert_with(|| (value, vec![]))
                .1
                .push(id);
        }

        for (key, bucket) in groups {
            let select = Select {
                table: info.name.clone(),
                key,
                identifier: target.identifier_column.clone(),
                values: bucket.values().map(|(value, _)| value.clone()).collect(),
                extra_conditions: target.extra_conditions.clone(),
            };
            debug!(
                "lookup {} values in {} by {:?}",
                select.values.len(),
                select.table,
                select.key
            );

            for (key, identifier) in adapter.fetch_pairs(&select)? {
                let Some((_, ids)) = bucket.get(&key) else {
                    continue;
                };
                for id in ids {
                    self.container.arena_mut().set_value(*id, identifier.clone())?;
                }
            }
        }

        Ok(self)
    }

    pub fn reset(&mut self) {
        self.container.reset();
    }
}
