use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashMap},
    rc::Rc,
};

use super::rules::{MappingRules, RowRuleField};
use crate::{
    error::{Error, Result},
    fmt_err,
    reference::{Condition, ConditionKey, RefArena, RefEvent, RefId, RefObserver, Subscription},
    types::Value,
};

// ids of mapped references that have no value yet
#[derive(Default)]
struct UnresolvedIndex {
    ids: RefCell<BTreeSet<RefId>>,
}

impl RefObserver for UnresolvedIndex {
    fn notify(&self, id: RefId, event: RefEvent) -> Subscription {
        match event {
            RefEvent::Resolved(true) => {
                self.ids.borrow_mut().remove(&id);
            }
            RefEvent::Resolved(false) => {
                self.ids.borrow_mut().insert(id);
            }
            RefEvent::Reset => {}
        }
        Subscription::Keep
    }
}

/// Deduplicates resolvable references of one run.
///
/// Mapping the same table and condition twice hands out the same
/// [`RefId`], so one lookup resolves every row that uses it.
pub struct ResolverContainer {
    rules: MappingRules,
    arena: RefArena,
    memo: HashMap<(String, ConditionKey), RefId>,
    by_table: BTreeMap<String, Vec<RefId>>,
    unresolved: Rc<UnresolvedIndex>,
}

impl Default for ResolverContainer {
    fn default() -> Self {
        Self::new(MappingRules::default())
    }
}

impl ResolverContainer {
    pub fn new(rules: MappingRules) -> Self {
        Self {
            rules,
            arena: RefArena::new(),
            memo: HashMap::new(),
            by_table: BTreeMap::new(),
            unresolved: Rc::new(UnresolvedIndex::default()),
        }
    }

    pub fn rules(&self) -> &MappingRules {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut MappingRules {
        &mut self.rules
    }

    pub fn arena(&self) -> &RefArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut RefArena {
        &mut self.arena
    }

    pub fn alias(&mut self, name: &str, table: &str) -> &mut Self {
        self.rules.alias(name, table);
        self
    }

    pub fn map(&mut self, table_or_alias: &str, condition: Condition) -> Result<RefId> {
        let table = self.rules.resolve_alias(table_or_alias);
        let key = (table.clone(), condition.key());
        if let Some(id) = self.memo.get(&key) {
            return Ok(*id);
        }

        let id = self.arena.create_resolvable(&table, condition);
        let observer: Rc<dyn RefObserver> = self.unresolved.clone();
        self.arena.add_observer(id, observer)?;
        self.unresolved.ids.borrow_mut().insert(id);
        self.by_table.entry(table).or_default().push(id);
        self.memo.insert(key, id);
        Ok(id)
    }

    /// Maps a bare value through the default condition field of the table.
    pub fn map_value(&mut self, table_or_alias: &str, value: impl Into<Value>) -> Result<RefId> {
        let table = self.rules.resolve_alias(table_or_alias);
        let field = self.rules.default_field(&table).ok_or_else(|| {
            Error::Unmappable(fmt_err!(
                "There is no default condition field for \"{}\"",
                table
            ))
        })?;
        let condition = Condition::new([(field.to_owned(), value.into())])?;
        self.map(&table, condition)
    }

    pub fn map_row(&mut self, table_or_alias: &str, row: &BTreeMap<String, Value>) -> Result<RefId> {
        let table = self.rules.resolve_alias(table_or_alias);
        if !self.can_map_row(&table) {
            return Err(Error::Unmappable(fmt_err!(
                "There is no mapping data or default condition field is missing for \"{}\"",
                table
            )));
        }

        let fields = match self.rules.row_rule(&table) {
            Some(rule) if !rule.is_empty() => rule.to_vec(),
            _ => match self.rules.default_field(&table) {
                Some(field) => vec![RowRuleField::required(field)],
                None => vec![],
            },
        };

        let mut condition = Vec::with_capacity(fields.len());
        for rule in fields {
            match (row.get(&rule.field), rule.default) {
                (Some(value), _) if !value.is_null() => condition.push((rule.field, value.clone())),
                (_, Some(default)) if !default.is_null() => condition.push((rule.field, default)),
                _ => {
                    return Err(Error::MissingValue(fmt_err!(
                        "Value for \"{}\" in \"{}\" is missing and no default value provided",
                        rule.field,
                        table
                    )))
                }
            }
        }

        self.map(&table, Condition::new(condition)?)
    }

    pub fn can_map_row(&self, table_or_alias: &str) -> bool {
        self.rules.can_map_row(&self.rules.resolve_alias(table_or_alias))
    }

    pub fn static_value(&mut self, table: &str, value: impl Into<Value>) -> RefId {
        self.arena.create_static(table, value.into())
    }

    pub fn composite(&mut self, table: &str, children: Vec<RefId>, separator: &str) -> Result<RefId> {
        self.arena.create_composite(table, children, separator)
    }

    /// Mapped references without a value, optionally limited to one table.
    pub fn unresolved(&self, table: Option<&str>) -> Vec<RefId> {
        let unresolved = self.unresolved.ids.borrow();
        self.all(table)
            .into_iter()
            .filter(|id| unresolved.contains(id))
            .collect()
    }

    pub fn all(&self, table: Option<&str>) -> Vec<RefId> {
        match table {
            Some(table) => self
                .by_table
                .get(&self.rules.resolve_alias(table))
                .cloned()
                .unwrap_or_default(),
            None => self.by_table.values().flatten().copied().collect(),
        }
    }

    /// Drops every reference of the run, mapping rules are kept.
    pub fn reset(&mut self) {
        self.memo.clear();
        self.by_table.clear();
        self.unresolved.ids.borrow_mut().clear();
        self.arena.clear();
    }
}
