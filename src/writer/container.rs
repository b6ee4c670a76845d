use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, HashMap},
    rc::Rc,
};

use log::debug;

use super::{
    error::WriteError,
    field::{Cell, ConditionItem, ConditionValue, Field, Operation, Queue, Row, ScheduledRow, Slot},
};
use crate::{
    catalog::{Column, PrimaryKey, Schema, Table},
    error::{Error, Result},
    fmt_err,
    reference::{RefArena, RefEvent, RefId, RefKind, RefObserver, Subscription},
    resolver::ResolverContainer,
    types::{
        encode::{encode_json, encode_serialized},
        Value,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleKey {
    pub queue: Queue,
    pub operation: Operation,
    pub table: String,
}

impl ScheduleKey {
    pub fn new(queue: Queue, operation: Operation, table: &str) -> Self {
        Self {
            queue,
            operation,
            table: table.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub key: ScheduleKey,
    pub row: usize,
    pub slot: Slot,
}

// collects references that got a value since the last resolve
#[derive(Default)]
struct Inbox {
    resolved: RefCell<BTreeSet<RefId>>,
}

impl RefObserver for Inbox {
    fn notify(&self, id: RefId, event: RefEvent) -> Subscription {
        match event {
            RefEvent::Resolved(true) => {
                self.resolved.borrow_mut().insert(id);
                Subscription::Keep
            }
            RefEvent::Resolved(false) => Subscription::Keep,
            RefEvent::Reset => Subscription::Detach,
        }
    }
}

#[derive(Debug, Default)]
struct TableSchedule {
    rows: BTreeMap<usize, ScheduledRow>,
    next_index: usize,
    ready: BTreeSet<usize>,
    // row => slots still holding an unresolved reference
    pending: BTreeMap<usize, BTreeMap<Slot, RefId>>,
    // insert rows whose own identity is represented by a reference
    awaiting_identity: BTreeMap<RefId, usize>,
}

impl TableSchedule {
    fn check_ready(&mut self, row: usize) {
        if !self.rows.contains_key(&row) {
            return;
        }
        if self.pending.get(&row).map_or(true, |slots| slots.is_empty()) {
            self.pending.remove(&row);
            self.ready.insert(row);
        }
    }
}

struct Registration {
    slot: Slot,
    id: RefId,
    identity: bool,
}

/// Pending inserts, updates and deletes together with the references they
/// wait for.
///
/// Every unresolved reference of a row is indexed by its location, when
/// the reference gets a value the value is copied into each location and
/// the affected rows are checked for readiness without rescanning the
/// schedule.
pub struct WriteContainer {
    schedules: BTreeMap<ScheduleKey, TableSchedule>,
    known: BTreeSet<RefId>,
    usages: HashMap<RefId, Vec<Location>>,
    inbox: Rc<Inbox>,
}

impl Default for WriteContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteContainer {
    pub fn new() -> Self {
        Self {
            schedules: BTreeMap::new(),
            known: BTreeSet::new(),
            usages: HashMap::new(),
            inbox: Rc::new(Inbox::default()),
        }
    }

    /// Schedules a row insert and returns its row index.
    ///
    /// Every column of the table gets a value, missing ones are filled by
    /// the column's recommended value. When the table has a single column
    /// primary key and rows of the table can be mapped, the key becomes a
    /// reference other rows can point to before the row is written.
    pub fn schedule_insert(
        &mut self,
        schema: &Schema,
        resolver: &mut ResolverContainer,
        table: &str,
        mut data: Row,
        queue: Queue,
    ) -> Result<usize> {
        let info = schema.get_table_info(table)?;
        let mut explicit_key = None;

        if let PrimaryKey::Single(pk) = info.primary_key_column() {
            let current = data.get(&pk.name).cloned();
            if !matches!(current, Some(Field::Ref(_))) && resolver.can_map_row(&info.name) {
                let row = scalar_values(&data, resolver.arena());
                let id = resolver.map_row(&info.name, &row)?;
                if let Some(Field::Value(value)) = current {
                    if !value.is_null() {
                        explicit_key = Some((id, value));
                    }
                }
                data.insert(pk.name.clone(), Field::Ref(id));
            }
        }

        let mut cells = Vec::with_capacity(info.columns().len());
        let mut refs = vec![];
        for column in info.columns() {
            let field = data.remove(&column.name);
            let cell = if column.is_primary() {
                match field {
                    None | Some(Field::Value(Value::Null)) if !column.is_identity() => {
                        return Err(Error::MissingValue(fmt_err!(
                            "The primary key \"{}\" for \"{}\" is required, since it is not autoincrement based.",
                            column.name,
                            info.name
                        )));
                    }
                    None => Cell::Value(Value::Null),
                    Some(Field::Ref(id)) => Cell::Ref(id),
                    Some(Field::Value(value)) => Cell::Value(value),
                    Some(other) => prepare_value(info, column, other)?,
                }
            } else {
                prepare_value(info, column, field.unwrap_or(Field::Value(Value::Null)))?
            };

            if let Cell::Ref(id) = cell {
                refs.push(Registration {
                    slot: Slot::Column(column.name.clone()),
                    id,
                    identity: column.is_primary() && column.is_identity(),
                });
            }
            cells.push((column.name.clone(), cell));
        }

        // the shared key reference only gets its value once the row is valid
        if let Some((id, value)) = explicit_key {
            resolver.arena_mut().set_value(id, value)?;
        }

        self.commit(
            resolver.arena_mut(),
            ScheduleKey::new(queue, Operation::Insert, &info.name),
            ScheduledRow::Insert(cells),
            refs,
        )
    }

    /// Schedules an update of the non-null columns present in `data`. Condition keys
    /// naming a column become `col = ?`, `col IN(?)` or `col IS NULL`,
    /// other keys are used as expressions verbatim.
    pub fn schedule_update(
        &mut self,
        schema: &Schema,
        arena: &mut RefArena,
        table: &str,
        data: Row,
        condition: Vec<(String, Field)>,
        queue: Queue,
    ) -> Result<usize> {
        let info = schema.get_table_info(table)?;

        let mut cells = vec![];
        let mut refs = vec![];
        for column in info.columns() {
            let field = match data.get(&column.name) {
                None | Some(Field::Value(Value::Null)) => continue,
                Some(field) => field.clone(),
            };
            let cell = prepare_value(info, column, field)?;
            if let Cell::Ref(id) = cell {
                refs.push(Registration {
                    slot: Slot::Column(column.name.clone()),
                    id,
                    identity: false,
                });
            }
            cells.push((column.name.clone(), cell));
        }
        let condition = build_condition(info, condition, &mut refs)?;

        self.commit(
            arena,
            ScheduleKey::new(queue, Operation::Update, &info.name),
            ScheduledRow::Update {
                data: cells,
                condition,
            },
            refs,
        )
    }

    pub fn schedule_delete(
        &mut self,
        schema: &Schema,
        arena: &mut RefArena,
        table: &str,
        condition: Vec<(String, Field)>,
        queue: Queue,
    ) -> Result<usize> {
        let info = schema.get_table_info(table)?;
        let mut refs = vec![];
        let condition = build_condition(info, condition, &mut refs)?;

        self.commit(
            arena,
            ScheduleKey::new(queue, Operation::Delete, &info.name),
            ScheduledRow::Delete(condition),
            refs,
        )
    }

    // nothing is registered until the row is complete, a failing row leaves no trace
    fn commit(
        &mut self,
        arena: &mut RefArena,
        key: ScheduleKey,
        mut row: ScheduledRow,
        refs: Vec<Registration>,
    ) -> Result<usize> {
        let mut waiting = vec![];
        for registration in refs {
            let reference = arena
                .get(registration.id)
                .ok_or_else(|| Error::Internal(fmt_err!("stale reference handle {}", registration.id)))?;
            match reference.value() {
                Some(value) => row.fill(&registration.slot, value),
                None => waiting.push(registration),
            }
        }
        for registration in &waiting {
            if self.known.insert(registration.id) {
                let observer: Rc<dyn RefObserver> = self.inbox.clone();
                arena.add_observer(registration.id, observer)?;
            }
        }

        let schedule = self.schedules.entry(key.clone()).or_default();
        let index = schedule.next_index;
        schedule.next_index += 1;
        schedule.rows.insert(index, row);

        for Registration { slot, id, identity } in waiting {
            self.usages.entry(id).or_default().push(Location {
                key: key.clone(),
                row: index,
                slot: slot.clone(),
            });
            if identity {
                schedule.awaiting_identity.insert(id, index);
            } else {
                schedule.pending.entry(index).or_default().insert(slot, id);
            }
        }
        schedule.check_ready(index);

        debug!(
            "scheduled {} {} row {} ({} pending)",
            key.operation,
            key.table,
            index,
            schedule.pending.get(&index).map_or(0, |p| p.len())
        );
        Ok(index)
    }

    /// Copies values of references resolved since the last call into the
    /// rows using them.
    pub fn resolve(&mut self, arena: &RefArena) -> &mut Self {
        let resolved = std::mem::take(&mut *self.inbox.resolved.borrow_mut());

        for id in resolved {
            let Some(value) = arena.value(id) else {
                continue;
            };
            let Some(locations) = self.usages.remove(&id) else {
                continue;
            };

            for location in locations {
                let Some(schedule) = self.schedules.get_mut(&location.key) else {
                    continue;
                };
                if let Some(row) = schedule.rows.get_mut(&location.row) {
                    row.fill(&location.slot, value);
                }
                if let Some(slots) = schedule.pending.get_mut(&location.row) {
                    if slots.get(&location.slot) == Some(&id) {
                        slots.remove(&location.slot);
                    }
                }
                schedule.awaiting_identity.remove(&id);
                schedule.check_ready(location.row);
            }
        }
        self
    }

    /// Removes and returns the rows that are ready to be written.
    pub fn get_schedule(&mut self, queue: Queue, table: &str, operation: Operation) -> Vec<(usize, ScheduledRow)> {
        let Some(schedule) = self.schedules.get_mut(&ScheduleKey::new(queue, operation, table)) else {
            return vec![];
        };

        std::mem::take(&mut schedule.ready)
            .into_iter()
            .filter_map(|index| schedule.rows.remove(&index).map(|row| (index, row)))
            .collect()
    }

    /// Whether the ready inserts can go out as one batch, i.e. no ready
    /// row waits for its generated identifier.
    pub fn is_insert_schedule_multiple(&self, queue: Queue, table: &str) -> bool {
        let Some(schedule) = self.schedules.get(&ScheduleKey::new(queue, Operation::Insert, table)) else {
            return false;
        };
        !schedule.ready.is_empty()
            && !schedule
                .awaiting_identity
                .values()
                .any(|row| schedule.ready.contains(row))
    }

    /// Reference standing for the identifier the insert row will get.
    pub fn get_insert_schedule_primary_key_map(&self, queue: Queue, table: &str, row: usize) -> Option<RefId> {
        self.schedules
            .get(&ScheduleKey::new(queue, Operation::Insert, table))?
            .awaiting_identity
            .iter()
            .find(|(_, r)| **r == row)
            .map(|(id, _)| *id)
    }

    pub fn has_schedule(&self, queue: Queue, table: &str, operation: Operation) -> bool {
        self.schedules
            .get(&ScheduleKey::new(queue, operation, table))
            .is_some_and(|s| !s.rows.is_empty())
    }

    /// Scheduled tables in write order.
    pub fn get_schedule_tables(&self, schema: &Schema, queue: Queue, operation: Operation) -> Result<Vec<String>> {
        Ok(schema
            .get_table_names_sorted_by_relation()?
            .iter()
            .filter(|t| self.has_schedule(queue, t, operation))
            .cloned()
            .collect())
    }

    /// One error per slot still waiting for a reference.
    pub fn get_schedule_resolve_errors(&self, queue: Queue, table: &str, operation: Operation) -> Vec<WriteError> {
        let Some(schedule) = self.schedules.get(&ScheduleKey::new(queue, operation, table)) else {
            return vec![];
        };

        schedule
            .pending
            .iter()
            .filter(|(row, _)| schedule.rows.contains_key(row))
            .flat_map(|(row, slots)| {
                slots
                    .iter()
                    .map(|(slot, id)| WriteError::unresolved(operation, table, queue, *row, slot, *id))
            })
            .collect()
    }

    /// Tables whose lookups would unblock rows of this schedule.
    pub fn pending_lookup_tables(&self, queue: Queue, table: &str, operation: Operation, arena: &RefArena) -> Vec<String> {
        let Some(schedule) = self.schedules.get(&ScheduleKey::new(queue, operation, table)) else {
            return vec![];
        };

        let mut stack: Vec<RefId> = schedule
            .pending
            .values()
            .flat_map(|slots| slots.values().copied())
            .chain(schedule.awaiting_identity.keys().copied())
            .collect();
        let mut seen = BTreeSet::new();
        let mut tables = BTreeSet::new();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(reference) = arena.get(id) else {
                continue;
            };
            match reference.kind() {
                RefKind::Resolvable(_) => {
                    tables.insert(reference.table().to_owned());
                }
                RefKind::Composite { children, .. } => stack.extend(children.iter().copied()),
                RefKind::Static => {}
            }
        }
        tables.into_iter().collect()
    }

    /// Drops the whole schedule, known references are reset first so
    /// other observers can let go of them.
    pub fn reset(&mut self, arena: &mut RefArena) {
        for id in std::mem::take(&mut self.known) {
            arena.reset(id);
        }
        self.schedules.clear();
        self.usages.clear();
        self.inbox.resolved.borrow_mut().clear();
    }
}

fn scalar_values(data: &Row, arena: &RefArena) -> BTreeMap<String, Value> {
    data.iter()
        .filter_map(|(name, field)| {
            let value = match field {
                Field::Value(value) => value.clone(),
                Field::Ref(id) => arena.value(*id)?.clone(),
                Field::Json(json) => Value::String(encode_json(json)),
                Field::Serialized(json) => Value::String(encode_serialized(json)),
                Field::List(_) => return None,
            };
            Some((name.clone(), value))
        })
        .collect()
}

fn prepare_value(table: &Table, column: &Column, field: Field) -> Result<Cell> {
    match field {
        Field::Ref(id) => Ok(Cell::Ref(id)),
        Field::Value(value) => Ok(Cell::Value(column.recommended_value(value))),
        Field::Json(json) => Ok(Cell::Value(Value::String(encode_json(&json)))),
        Field::Serialized(json) => Ok(Cell::Value(Value::String(encode_serialized(&json)))),
        Field::List(items) => Err(Error::InvalidValue(fmt_err!(
            "Invalid value supplied for \"{}\" in \"{}\". Supplied value is \"{:?}\"",
            column.name,
            table.name,
            items
        ))),
    }
}

fn condition_cell(field: Field) -> Result<Cell> {
    match field {
        Field::Ref(id) => Ok(Cell::Ref(id)),
        Field::Value(value) => Ok(Cell::Value(value)),
        Field::Json(json) => Ok(Cell::Value(Value::String(encode_json(&json)))),
        Field::Serialized(json) => Ok(Cell::Value(Value::String(encode_serialized(&json)))),
        Field::List(items) => Err(Error::InvalidValue(fmt_err!(
            "Nested lists are not supported in conditions: {:?}",
            items
        ))),
    }
}

fn build_condition(
    table: &Table,
    condition: Vec<(String, Field)>,
    refs: &mut Vec<Registration>,
) -> Result<Vec<ConditionItem>> {
    let mut items = Vec::with_capacity(condition.len());
    for (key, field) in condition {
        let is_column = table.has_column(&key);
        let expr = |suffix: &str| {
            if is_column {
                format!("{} {}", key, suffix)
            } else {
                key.clone()
            }
        };

        let item = match field {
            Field::List(values) => {
                let expr = expr("IN(?)");
                let cells = values
                    .into_iter()
                    .map(condition_cell)
                    .collect::<Result<Vec<_>>>()?;
                for (index, cell) in cells.iter().enumerate() {
                    if let Cell::Ref(id) = cell {
                        refs.push(Registration {
                            slot: Slot::Condition {
                                expr: expr.clone(),
                                index: Some(index),
                            },
                            id: *id,
                            identity: false,
                        });
                    }
                }
                ConditionItem {
                    expr,
                    value: ConditionValue::Many(cells),
                }
            }
            Field::Value(Value::Null) => ConditionItem {
                expr: expr("IS NULL"),
                value: ConditionValue::Null,
            },
            other => {
                let expr = expr("= ?");
                let cell = condition_cell(other)?;
                if let Cell::Ref(id) = cell {
                    refs.push(Registration {
                        slot: Slot::Condition {
                            expr: expr.clone(),
                            index: None,
                        },
                        id,
                        identity: false,
                    });
                }
                ConditionItem {
                    expr,
                    value: ConditionValue::One(cell),
                }
            }
        };
        items.push(item);
    }
    Ok(items)
}
