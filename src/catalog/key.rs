use serde_derive::{Deserialize, Serialize};

use super::provider::{ForeignKeyDescriptor, KeyDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Index,
    Unique,
    Primary,
    Fulltext,
}

impl KeyType {
    pub fn parse(index_type: &str) -> Self {
        match index_type.to_ascii_lowercase().as_str() {
            "primary" => KeyType::Primary,
            "unique" => KeyType::Unique,
            "fulltext" => KeyType::Fulltext,
            _ => KeyType::Index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub name: String,
    pub columns: Vec<String>,
    pub key_type: KeyType,
}

impl Key {
    pub fn new(name: &str, columns: &[&str], key_type: KeyType) -> Self {
        Self {
            name: name.to_owned(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            key_type,
        }
    }
}

impl From<&KeyDescriptor> for Key {
    fn from(desc: &KeyDescriptor) -> Self {
        Self {
            name: desc.key_name.clone(),
            columns: desc.columns_list.clone(),
            key_type: KeyType::parse(&desc.index_type),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    Cascade,
    NoAction,
    SetNull,
    SetDefault,
    Restrict,
}

impl ForeignKeyAction {
    pub fn parse(action: &str) -> Self {
        match action.trim().to_ascii_uppercase().as_str() {
            "CASCADE" => ForeignKeyAction::Cascade,
            "SET NULL" => ForeignKeyAction::SetNull,
            "SET DEFAULT" => ForeignKeyAction::SetDefault,
            "RESTRICT" => ForeignKeyAction::Restrict,
            _ => ForeignKeyAction::NoAction,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub reference_table: String,
    pub reference_columns: Vec<String>,
    pub on_update: ForeignKeyAction,
    pub on_delete: ForeignKeyAction,
}

impl ForeignKey {
    pub fn new(name: &str, columns: &[&str], reference_table: &str, reference_columns: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            reference_table: reference_table.to_owned(),
            reference_columns: reference_columns.iter().map(|c| c.to_string()).collect(),
            on_update: ForeignKeyAction::Cascade,
            on_delete: ForeignKeyAction::Cascade,
        }
    }
}

fn split_columns(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_owned())
        .collect()
}

impl From<&ForeignKeyDescriptor> for ForeignKey {
    fn from(desc: &ForeignKeyDescriptor) -> Self {
        let action = |a: &Option<String>| match a {
            Some(a) if !a.is_empty() => ForeignKeyAction::parse(a),
            _ => ForeignKeyAction::NoAction,
        };

        Self {
            name: desc.fk_name.clone(),
            columns: split_columns(&desc.column_name),
            reference_table: desc.ref_table_name.clone(),
            reference_columns: split_columns(&desc.ref_column_name),
            on_update: action(&desc.on_update),
            on_delete: action(&desc.on_delete),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_key_from_descriptor() {
        let fk = ForeignKey::from(&ForeignKeyDescriptor {
            fk_name: "FK_ITEM_ORDER".to_owned(),
            column_name: "order_id,store_id".to_owned(),
            ref_table_name: "order".to_owned(),
            ref_column_name: "entity_id,store_id".to_owned(),
            on_update: None,
            on_delete: Some("cascade".to_owned()),
        });
        assert_eq!(fk.columns, vec!["order_id", "store_id"]);
        assert_eq!(fk.reference_columns, vec!["entity_id", "store_id"]);
        assert_eq!(fk.on_update, ForeignKeyAction::NoAction);
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
    }

    #[test]
    fn test_key_type() {
        assert_eq!(KeyType::parse("PRIMARY"), KeyType::Primary);
        assert_eq!(KeyType::parse("unique"), KeyType::Unique);
        assert_eq!(KeyType::parse("btree"), KeyType::Index);
    }
}
