use std::collections::HashMap;

use super::{
    column::Column,
    key::{ForeignKey, Key, KeyType},
    provider::{ColumnDescriptor, ForeignKeyDescriptor, KeyDescriptor},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimaryKey<'a> {
    None,
    Single(&'a Column),
    Composite(&'a [Column]),
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    columns: Vec<Column>,
    // column_name => idx(columns)
    column_idx: HashMap<String, usize>,
    keys: Vec<Key>,
    foreign_keys: Vec<ForeignKey>,
    // parent and child tables are filled in by the schema
    pub(crate) parent_tables: Vec<String>,
    pub(crate) child_tables: Vec<String>,
    // primary columns copied out once, in column order
    primary_columns: Vec<Column>,
}

impl Table {
    pub fn new(name: &str, columns: Vec<Column>, keys: Vec<Key>, foreign_keys: Vec<ForeignKey>) -> Self {
        let column_idx = columns
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.name.clone(), idx))
            .collect();
        let primary_columns = columns.iter().filter(|c| c.is_primary()).cloned().collect();

        Self {
            name: name.to_owned(),
            columns,
            column_idx,
            keys,
            foreign_keys,
            parent_tables: vec![],
            child_tables: vec![],
            primary_columns,
        }
    }

    pub fn from_descriptors(
        name: &str,
        columns: &[ColumnDescriptor],
        keys: &[KeyDescriptor],
        foreign_keys: &[ForeignKeyDescriptor],
    ) -> Self {
        Self::new(
            name,
            columns.iter().map(Column::from).collect(),
            keys.iter().map(Key::from).collect(),
            foreign_keys.iter().map(ForeignKey::from).collect(),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_idx.get(name).map(|idx| &self.columns[*idx])
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_idx.contains_key(name)
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    pub fn parent_tables(&self) -> &[String] {
        &self.parent_tables
    }

    pub fn child_tables(&self) -> &[String] {
        &self.child_tables
    }

    pub fn primary_key(&self) -> Option<&Key> {
        self.keys.iter().find(|k| k.key_type == KeyType::Primary)
    }

    pub fn primary_key_column(&self) -> PrimaryKey<'_> {
        match self.primary_columns.len() {
            0 => PrimaryKey::None,
            1 => PrimaryKey::Single(&self.primary_columns[0]),
            _ => PrimaryKey::Composite(&self.primary_columns),
        }
    }
}
