//! Scheduling fixture rows and writing them in dependency order.
//!
//! Rows are scheduled per queue, operation and table. A flush walks the
//! tables in write order and, per table, alternates between resolving
//! references and writing the rows that became ready until nothing is left
//! or no row can make progress. Rows that stay blocked are reported as
//! [`WriteError`]s instead of failing the flush.

pub mod container;
pub mod error;
pub mod field;

use std::collections::BTreeMap;

use log::{debug, error, info, warn};
use serde_derive::Serialize;

pub use container::WriteContainer;
pub use error::WriteError;
pub use field::{Cell, ConditionItem, ConditionValue, Field, Operation, Queue, Row, ScheduledRow, Slot};

use crate::{
    adapter::{Adapter, Predicate, PredicateValue},
    catalog::Schema,
    config::WriterConfig,
    error::{Error, Result},
    fmt_err,
    reference::{Condition, RefId},
    resolver::{MappingRules, Resolver},
    types::Value,
};

/// Rows affected during the last flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub deleted: usize,
    pub inserted: usize,
    pub updated: usize,
}

pub struct Writer<A: Adapter> {
    adapter: A,
    schema: Schema,
    resolver: Resolver,
    container: WriteContainer,
    config: WriterConfig,
    errors: Vec<WriteError>,
    stats: WriteStats,
}

impl<A: Adapter> Writer<A> {
    pub fn new(adapter: A, schema: Schema, rules: MappingRules, config: WriterConfig) -> Self {
        Self {
            adapter,
            schema,
            resolver: Resolver::new(rules),
            container: WriteContainer::new(),
            config,
            errors: vec![],
            stats: WriteStats::default(),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    pub fn container(&self) -> &WriteContainer {
        &self.container
    }

    pub fn map(&mut self, table: &str, condition: Condition) -> Result<RefId> {
        self.resolver.container_mut().map(table, condition)
    }

    pub fn map_value(&mut self, table: &str, value: impl Into<Value>) -> Result<RefId> {
        self.resolver.container_mut().map_value(table, value)
    }

    pub fn map_row(&mut self, table: &str, row: &BTreeMap<String, Value>) -> Result<RefId> {
        self.resolver.container_mut().map_row(table, row)
    }

    pub fn static_value(&mut self, table: &str, value: impl Into<Value>) -> RefId {
        self.resolver.container_mut().static_value(table, value)
    }

    pub fn composite(&mut self, table: &str, children: Vec<RefId>, separator: &str) -> Result<RefId> {
        self.resolver.container_mut().composite(table, children, separator)
    }

    pub fn value(&self, id: RefId) -> Option<&Value> {
        self.resolver.container().arena().value(id)
    }

    pub fn schedule_insert(&mut self, table: &str, data: Row, queue: Queue) -> Result<usize> {
        self.container
            .schedule_insert(&self.schema, self.resolver.container_mut(), table, data, queue)
    }

    pub fn schedule_update(
        &mut self,
        table: &str,
        data: Row,
        condition: Vec<(String, Field)>,
        queue: Queue,
    ) -> Result<usize> {
        self.container.schedule_update(
            &self.schema,
            self.resolver.container_mut().arena_mut(),
            table,
            data,
            condition,
            queue,
        )
    }

    pub fn schedule_delete(&mut self, table: &str, condition: Vec<(String, Field)>, queue: Queue) -> Result<usize> {
        self.container.schedule_delete(
            &self.schema,
            self.resolver.container_mut().arena_mut(),
            table,
            condition,
            queue,
        )
    }

    /// Writes every queue inside one transaction, deletes first, then
    /// inserts, then updates. Any statement failure rolls the whole flush
    /// back and is returned.
    pub fn flush(&mut self) -> Result<()> {
        self.errors.clear();
        self.stats = WriteStats::default();

        self.adapter.begin_transaction()?;
        match self.flush_queues() {
            Ok(()) => {
                self.adapter.commit()?;
                info!(
                    "flush done: {} inserted, {} updated, {} deleted, {} unresolved",
                    self.stats.inserted,
                    self.stats.updated,
                    self.stats.deleted,
                    self.errors.len()
                );
                Ok(())
            }
            Err(err) => {
                error!("flush failed, rolling back: {}", err);
                if let Err(rollback) = self.adapter.rollback() {
                    error!("rollback failed: {}", rollback);
                }
                Err(err)
            }
        }
    }

    fn flush_queues(&mut self) -> Result<()> {
        for queue in self.config.queues.clone() {
            self.flush_delete(queue)?;
            self.flush_insert(queue)?;
            self.flush_update(queue)?;
        }
        Ok(())
    }

    pub fn flush_insert(&mut self, queue: Queue) -> Result<()> {
        self.flush_operation(queue, Operation::Insert)
    }

    pub fn flush_update(&mut self, queue: Queue) -> Result<()> {
        self.flush_operation(queue, Operation::Update)
    }

    pub fn flush_delete(&mut self, queue: Queue) -> Result<()> {
        self.flush_operation(queue, Operation::Delete)
    }

    fn flush_operation(&mut self, queue: Queue, operation: Operation) -> Result<()> {
        for table in self.container.get_schedule_tables(&self.schema, queue, operation)? {
            self.flush_table(queue, operation, &table)?;
        }
        Ok(())
    }

    fn flush_table(&mut self, queue: Queue, operation: Operation, table: &str) -> Result<()> {
        while self.container.has_schedule(queue, table, operation) {
            self.resolve_lookups(queue, operation, table)?;

            let multiple = operation == Operation::Insert && self.container.is_insert_schedule_multiple(queue, table);
            let rows = self.container.get_schedule(queue, table, operation);
            if rows.is_empty() {
                let errors = self.container.get_schedule_resolve_errors(queue, table, operation);
                for err in &errors {
                    warn!("{}", err);
                }
                self.errors.extend(errors);
                break;
            }

            match operation {
                Operation::Insert if multiple => self.insert_batch(table, rows)?,
                Operation::Insert => self.insert_rows(queue, table, rows)?,
                Operation::Update => self.update_rows(table, rows)?,
                Operation::Delete => self.delete_rows(table, rows)?,
            }
        }
        Ok(())
    }

    // the table itself is always looked up, its own rows may already exist
    fn resolve_lookups(&mut self, queue: Queue, operation: Operation, table: &str) -> Result<()> {
        let mut tables =
            self.container
                .pending_lookup_tables(queue, table, operation, self.resolver.container().arena());
        if !tables.iter().any(|t| t == table) {
            tables.push(table.to_owned());
        }

        for lookup in tables {
            self.resolver.resolve(&self.schema, &self.adapter, &lookup)?;
        }
        self.container.resolve(self.resolver.container().arena());
        Ok(())
    }

    fn insert_batch(&mut self, table: &str, rows: Vec<(usize, ScheduledRow)>) -> Result<()> {
        let mut columns = vec![];
        let mut values = Vec::with_capacity(rows.len());
        for (_, row) in rows {
            let cells = insert_cells(table, row)?;
            if columns.is_empty() {
                columns = cells.iter().map(|(column, _)| column.clone()).collect();
            }
            values.push(cells.iter().map(|(_, cell)| cell.to_value()).collect::<Vec<_>>());
        }

        for chunk in values.chunks(self.config.batch_size.max(1)) {
            debug!("insert batch of {} rows into {}", chunk.len(), table);
            self.stats.inserted += self.adapter.insert_batch(table, &columns, chunk)?;
        }
        Ok(())
    }

    // rows waiting for their own id are written one by one and the id read back
    fn insert_rows(&mut self, queue: Queue, table: &str, rows: Vec<(usize, ScheduledRow)>) -> Result<()> {
        for (index, row) in rows {
            let identity = self.container.get_insert_schedule_primary_key_map(queue, table, index);
            let data: Vec<(String, Value)> = insert_cells(table, row)?
                .into_iter()
                .map(|(column, cell)| (column, cell.to_value()))
                .collect();

            self.stats.inserted += self.adapter.insert_single(table, &data)?;
            if let Some(id) = identity {
                let value = self.adapter.last_insert_id(table)?;
                debug!("captured id {} for {} row {}", value, table, index);
                self.resolver.container_mut().arena_mut().set_value(id, value)?;
            }
        }
        Ok(())
    }

    fn update_rows(&mut self, table: &str, rows: Vec<(usize, ScheduledRow)>) -> Result<()> {
        for (index, row) in rows {
            let ScheduledRow::Update { data, condition } = row else {
                return Err(Error::Internal(fmt_err!("row {} of {} is not an update", index, table)));
            };
            if data.is_empty() {
                debug!("nothing to update in {} row {}", table, index);
                continue;
            }

            let data: Vec<(String, Value)> = data
                .into_iter()
                .map(|(column, cell)| (column, cell.to_value()))
                .collect();
            self.stats.updated += self.adapter.update(table, &data, &predicates(&condition))?;
        }
        Ok(())
    }

    fn delete_rows(&mut self, table: &str, rows: Vec<(usize, ScheduledRow)>) -> Result<()> {
        for (index, row) in rows {
            let ScheduledRow::Delete(condition) = row else {
                return Err(Error::Internal(fmt_err!("row {} of {} is not a delete", index, table)));
            };
            self.stats.deleted += self.adapter.delete(table, &predicates(&condition))?;
        }
        Ok(())
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[WriteError] {
        &self.errors
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Forgets every scheduled row and reference, mapping rules stay.
    pub fn reset(&mut self) {
        self.container.reset(self.resolver.container_mut().arena_mut());
        self.resolver.reset();
        self.errors.clear();
        self.stats = WriteStats::default();
    }
}

fn insert_cells(table: &str, row: ScheduledRow) -> Result<Vec<(String, Cell)>> {
    match row {
        ScheduledRow::Insert(cells) => Ok(cells),
        _ => Err(Error::Internal(fmt_err!("scheduled row of {} is not an insert", table))),
    }
}

fn predicates(condition: &[ConditionItem]) -> Vec<Predicate> {
    condition
        .iter()
        .map(|item| {
            let value = match &item.value {
                ConditionValue::Null => PredicateValue::Null,
                ConditionValue::One(cell) => PredicateValue::One(cell.to_value()),
                ConditionValue::Many(cells) => PredicateValue::Many(cells.iter().map(Cell::to_value).collect()),
            };
            Predicate::new(&item.expr, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::{
        adapter::MemoryAdapter,
        catalog::{ColumnOptions, StaticProvider},
        resolver::RowRuleField,
    };

    static LOG_INIT: std::sync::Once = std::sync::Once::new();

    fn init() {
        LOG_INIT.call_once(|| {
            env_logger::Builder::new()
                .format(|buf, record| {
                    writeln!(
                        buf,
                        "{} {} {}:{} {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                        record.level(),
                        record.file().unwrap(),
                        record.line().unwrap(),
                        record.args()
                    )
                })
                .filter(None, log::LevelFilter::Debug)
                .init();
        });
    }

    fn schema() -> Schema {
        let pk = ColumnOptions::PRIMARY | ColumnOptions::IDENTITY;
        let mut provider = StaticProvider::new();
        provider
            .column("parent", "id", "int", pk)
            .column("parent", "name", "varchar", ColumnOptions::empty())
            .column("child", "id", "int", pk)
            .column("child", "parent_id", "int", ColumnOptions::NULLABLE)
            .foreign_key("child", "parent_id", "parent", "id")
            .column("tag", "code", "varchar", ColumnOptions::PRIMARY)
            .column("tag", "label", "varchar", ColumnOptions::empty());
        Schema::new(Box::new(provider))
    }

    fn writer(config: WriterConfig) -> Writer<MemoryAdapter> {
        init();
        let schema = schema();
        let adapter = MemoryAdapter::from_schema(&schema).unwrap();
        let mut rules = MappingRules::new();
        rules
            .set_row_rule("parent", vec![RowRuleField::required("name")])
            .set_default_field("parent", "name");
        Writer::new(adapter, schema, rules, config)
    }

    fn row(items: Vec<(&str, Field)>) -> Row {
        items.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }

    #[test]
    fn test_flush_parent_before_child() {
        let mut writer = writer(WriterConfig::default());
        let parent = writer.map_value("parent", "x").unwrap();
        writer
            .schedule_insert("child", row(vec![("parent_id", parent.into())]), Queue::Primary)
            .unwrap();
        writer
            .schedule_insert("parent", row(vec![("name", "x".into())]), Queue::Primary)
            .unwrap();

        writer.flush().unwrap();
        assert!(!writer.has_errors());
        assert_eq!(writer.value(parent), Some(&Value::Int(1)));
        assert_eq!(
            writer.stats(),
            WriteStats {
                deleted: 0,
                inserted: 2,
                updated: 0
            }
        );

        let adapter = writer.adapter();
        assert_eq!(adapter.statements(), ["insert_single parent 1", "insert_batch child 1"]);
        assert_eq!(adapter.rows("parent")[0].get("name"), Some(&Value::from("x")));
        assert_eq!(adapter.rows("child").len(), 1);
        assert_eq!(adapter.rows("child")[0].get("parent_id"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_flush_existing_parent() {
        let mut writer = writer(WriterConfig::default());
        writer
            .adapter_mut()
            .seed("parent", &[("id", 7.into()), ("name", "x".into())])
            .unwrap();
        let parent = writer.map_value("parent", "x").unwrap();
        writer
            .schedule_insert("child", row(vec![("parent_id", parent.into())]), Queue::Primary)
            .unwrap();

        writer.flush().unwrap();
        assert_eq!(writer.adapter().statements(), ["insert_batch child 1"]);
        assert_eq!(
            writer.adapter().rows("child")[0].get("parent_id"),
            Some(&Value::Int(7))
        );
    }

    #[test]
    fn test_unresolved_reference_is_reported() {
        let mut writer = writer(WriterConfig::default());
        let parent = writer.map_value("parent", "missing").unwrap();
        writer
            .schedule_insert("child", row(vec![("parent_id", parent.into())]), Queue::Primary)
            .unwrap();

        writer.flush_insert(Queue::Primary).unwrap();
        assert!(writer.adapter().rows("child").is_empty());
        assert_eq!(writer.stats().inserted, 0);
        assert!(writer.has_errors());

        let errors = writer.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].table, "child");
        assert_eq!(errors[0].row, 0);
        assert_eq!(errors[0].operation, Operation::Insert);
        assert_eq!(errors[0].slot, Slot::Column("parent_id".to_owned()));
        assert_eq!(errors[0].reference, parent);
    }

    #[test]
    fn test_failed_statement_rolls_back() {
        let mut writer = writer(WriterConfig::default());
        writer.adapter_mut().fail_writes_to("child");
        let parent = writer.map_value("parent", "x").unwrap();
        writer
            .schedule_insert("parent", row(vec![("name", "x".into())]), Queue::Primary)
            .unwrap();
        writer
            .schedule_insert("child", row(vec![("parent_id", parent.into())]), Queue::Primary)
            .unwrap();

        let err = writer.flush().unwrap_err();
        assert!(matches!(err, Error::Adapter(_)));
        assert!(writer.adapter().rows("parent").is_empty());
        assert!(writer.adapter().rows("child").is_empty());
    }

    #[test]
    fn test_batch_size() {
        let mut writer = writer(WriterConfig {
            batch_size: 2,
            ..WriterConfig::default()
        });
        for id in 1..=5 {
            writer
                .schedule_insert(
                    "parent",
                    row(vec![("id", id.into()), ("name", format!("p{}", id).into())]),
                    Queue::Primary,
                )
                .unwrap();
        }

        writer.flush().unwrap();
        assert_eq!(
            writer.adapter().statements(),
            [
                "insert_batch parent 2",
                "insert_batch parent 2",
                "insert_batch parent 1"
            ]
        );
        assert_eq!(writer.adapter().rows("parent").len(), 5);
    }

    #[test]
    fn test_update_and_delete() {
        let mut writer = writer(WriterConfig::default());
        writer
            .adapter_mut()
            .seed("parent", &[("name", "x".into())])
            .unwrap()
            .seed("parent", &[("name", "y".into())])
            .unwrap()
            .seed("child", &[("parent_id", Value::Null)])
            .unwrap()
            .seed("child", &[("parent_id", Value::Null)])
            .unwrap()
            .seed("child", &[("parent_id", 1.into())])
            .unwrap();

        let y = writer.map_value("parent", "y").unwrap();
        let x = writer.map_value("parent", "x").unwrap();
        writer
            .schedule_update(
                "child",
                row(vec![("parent_id", y.into())]),
                vec![("parent_id".to_owned(), Field::Value(Value::Null))],
                Queue::Secondary,
            )
            .unwrap();
        writer
            .schedule_delete("child", vec![("parent_id".to_owned(), Field::List(vec![x.into()]))], Queue::Primary)
            .unwrap();

        writer.flush().unwrap();
        assert_eq!(
            writer.stats(),
            WriteStats {
                deleted: 1,
                inserted: 0,
                updated: 2
            }
        );
        let children = writer.adapter().rows("child");
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.get("parent_id") == Some(&Value::Int(2))));
    }

    #[test]
    fn test_composite_column() {
        let mut writer = writer(WriterConfig::default());
        writer.adapter_mut().seed("parent", &[("name", "x".into())]).unwrap();
        let parent = writer.map_value("parent", "x").unwrap();
        let suffix = writer.static_value("tag", "v");
        let label = writer.composite("tag", vec![parent, suffix], "-").unwrap();
        writer
            .schedule_insert(
                "tag",
                row(vec![("code", "t1".into()), ("label", label.into())]),
                Queue::Primary,
            )
            .unwrap();

        writer.flush().unwrap();
        assert_eq!(writer.value(label), Some(&Value::from("1-v")));
        assert_eq!(
            writer.adapter().rows("tag")[0].get("label"),
            Some(&Value::from("1-v"))
        );
    }

    #[test]
    fn test_reset() {
        let mut writer = writer(WriterConfig::default());
        let parent = writer.map_value("parent", "missing").unwrap();
        writer
            .schedule_insert("child", row(vec![("parent_id", parent.into())]), Queue::Primary)
            .unwrap();
        writer.flush().unwrap();
        assert!(writer.has_errors());

        writer.reset();
        assert!(!writer.has_errors());
        assert!(writer.value(parent).is_none());
        assert!(!writer
            .container()
            .has_schedule(Queue::Primary, "child", Operation::Insert));
        // rules survive
        assert!(writer.resolver().container().can_map_row("parent"));
    }
}
