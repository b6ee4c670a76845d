use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use super::column::ColumnOptions;
use crate::{
    error::{Error, Result},
    fmt_err,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ColumnDescriptor {
    pub column_name: String,
    pub data_type: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub scale: Option<usize>,
    #[serde(default)]
    pub precision: Option<usize>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unsigned: bool,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub identity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct KeyDescriptor {
    pub key_name: String,
    pub index_type: String,
    pub columns_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ForeignKeyDescriptor {
    pub fk_name: String,
    /// comma separated for multi column keys
    pub column_name: String,
    pub ref_table_name: String,
    pub ref_column_name: String,
    #[serde(default)]
    pub on_update: Option<String>,
    #[serde(default)]
    pub on_delete: Option<String>,
}

/// Source of raw table descriptions, usually backed by `information_schema`.
pub trait InformationProvider {
    fn list_table_names(&self) -> Result<Vec<String>>;
    fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;
    fn indexes(&self, table: &str) -> Result<Vec<KeyDescriptor>>;
    fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>>;
    fn reset(&mut self);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub indexes: Vec<KeyDescriptor>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

/// Provider holding descriptions in memory, e.g. read from a JSON schema dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticProvider {
    tables: BTreeMap<String, TableDescriptor>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(fmt_err!("invalid schema dump: {e}")))
    }

    pub fn table(&mut self, name: &str) -> &mut TableDescriptor {
        self.tables.entry(name.to_owned()).or_default()
    }

    pub fn column(
        &mut self,
        table: &str,
        name: &str,
        data_type: &str,
        options: ColumnOptions,
    ) -> &mut Self {
        self.table(table).columns.push(ColumnDescriptor {
            column_name: name.to_owned(),
            data_type: data_type.to_owned(),
            default: None,
            length: None,
            scale: None,
            precision: None,
            nullable: options.contains(ColumnOptions::NULLABLE),
            unsigned: options.contains(ColumnOptions::UNSIGNED),
            primary: options.contains(ColumnOptions::PRIMARY),
            identity: options.contains(ColumnOptions::IDENTITY),
        });
        if options.contains(ColumnOptions::PRIMARY) {
            let indexes = &mut self.table(table).indexes;
            match indexes.iter_mut().find(|k| k.key_name == "PRIMARY") {
                Some(key) => key.columns_list.push(name.to_owned()),
                None => indexes.push(KeyDescriptor {
                    key_name: "PRIMARY".to_owned(),
                    index_type: "primary".to_owned(),
                    columns_list: vec![name.to_owned()],
                }),
            }
        }
        self
    }

    pub fn foreign_key(
        &mut self,
        table: &str,
        column: &str,
        ref_table: &str,
        ref_column: &str,
    ) -> &mut Self {
        let name = format!("FK_{}_{}_{}_{}", table, column, ref_table, ref_column).to_uppercase();
        self.table(table).foreign_keys.push(ForeignKeyDescriptor {
            fk_name: name,
            column_name: column.to_owned(),
            ref_table_name: ref_table.to_owned(),
            ref_column_name: ref_column.to_owned(),
            on_update: None,
            on_delete: None,
        });
        self
    }

    fn get(&self, table: &str) -> Result<&TableDescriptor> {
        self.tables
            .get(table)
            .ok_or_else(|| Error::TableNotFound(table.to_owned()))
    }
}

impl InformationProvider for StaticProvider {
    fn list_table_names(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.get(table)?.columns.clone())
    }

    fn indexes(&self, table: &str) -> Result<Vec<KeyDescriptor>> {
        Ok(self.get(table)?.indexes.clone())
    }

    fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyDescriptor>> {
        Ok(self.get(table)?.foreign_keys.clone())
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let provider = StaticProvider::from_json_str(
            r#"{
                "order": {
                    "columns": [
                        {"COLUMN_NAME": "id", "DATA_TYPE": "int", "PRIMARY": true, "IDENTITY": true},
                        {"COLUMN_NAME": "code", "DATA_TYPE": "varchar", "LENGTH": 32}
                    ],
                    "indexes": [
                        {"KEY_NAME": "PRIMARY", "INDEX_TYPE": "primary", "COLUMNS_LIST": ["id"]}
                    ]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(provider.list_table_names().unwrap(), vec!["order"]);
        let columns = provider.columns("order").unwrap();
        assert_eq!(columns.len(), 2);
        assert!(columns[0].identity);
        assert_eq!(columns[1].length, Some(32));
        assert!(provider.foreign_keys("order").unwrap().is_empty());
        assert!(matches!(
            provider.columns("missing"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_builder_registers_primary_key() {
        let mut provider = StaticProvider::new();
        provider
            .column(
                "order",
                "id",
                "int",
                ColumnOptions::PRIMARY | ColumnOptions::IDENTITY,
            )
            .column("order", "code", "varchar", ColumnOptions::empty());
        let indexes = provider.indexes("order").unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].columns_list, vec!["id"]);
    }
}
