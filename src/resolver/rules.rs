use std::collections::{HashMap, HashSet};

use serde_derive::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    fmt_err,
    types::Value,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRuleField {
    pub field: String,
    /// used when the row has no value for the field
    #[serde(default)]
    pub default: Option<Value>,
}

impl RowRuleField {
    pub fn required(field: &str) -> Self {
        Self {
            field: field.to_owned(),
            default: None,
        }
    }

    pub fn with_default(field: &str, default: impl Into<Value>) -> Self {
        Self {
            field: field.to_owned(),
            default: Some(default.into()),
        }
    }
}

/// How fixture rows and values are turned into lookup conditions.
///
/// Outlives the per run reference cache, resetting a resolver keeps it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingRules {
    aliases: HashMap<String, String>,
    default_fields: HashMap<String, String>,
    row_rules: HashMap<String, Vec<RowRuleField>>,
}

impl MappingRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(fmt_err!("invalid mapping rules: {e}")))
    }

    pub fn alias(&mut self, name: &str, table: &str) -> &mut Self {
        self.aliases.insert(name.to_owned(), table.to_owned());
        self
    }

    /// Follows alias chains to the table name.
    pub fn resolve_alias(&self, name: &str) -> String {
        let mut seen = HashSet::new();
        let mut current = name;
        while let Some(next) = self.aliases.get(current) {
            if next == current || !seen.insert(current) {
                break;
            }
            current = next;
        }
        current.to_owned()
    }

    pub fn set_default_field(&mut self, table: &str, field: &str) -> &mut Self {
        self.default_fields.insert(table.to_owned(), field.to_owned());
        self
    }

    pub fn default_field(&self, table: &str) -> Option<&str> {
        self.default_fields.get(table).map(|f| f.as_str())
    }

    /// Registers the fields used to map a whole row of `table`. An empty
    /// list falls back to the default field of the table.
    pub fn set_row_rule(&mut self, table: &str, fields: Vec<RowRuleField>) -> &mut Self {
        self.row_rules.insert(table.to_owned(), fields);
        self
    }

    pub fn row_rule(&self, table: &str) -> Option<&[RowRuleField]> {
        self.row_rules.get(table).map(|r| r.as_slice())
    }

    pub fn can_map_row(&self, table: &str) -> bool {
        match self.row_rules.get(table) {
            Some(rule) => !rule.is_empty() || self.default_fields.contains_key(table),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_chain() {
        let mut rules = MappingRules::new();
        rules.alias("product", "catalog_product_entity").alias("sku", "product");
        assert_eq!(rules.resolve_alias("sku"), "catalog_product_entity");
        assert_eq!(rules.resolve_alias("order"), "order");

        // cycles stop instead of looping
        rules.alias("a", "b").alias("b", "a");
        let resolved = rules.resolve_alias("a");
        assert!(resolved == "a" || resolved == "b");
    }

    #[test]
    fn test_can_map_row() {
        let mut rules = MappingRules::new();
        assert!(!rules.can_map_row("order"));

        rules.set_row_rule("order", vec![]);
        assert!(!rules.can_map_row("order"));

        rules.set_default_field("order", "increment_id");
        assert!(rules.can_map_row("order"));

        rules.set_row_rule("store", vec![RowRuleField::required("code")]);
        assert!(rules.can_map_row("store"));
    }

    #[test]
    fn test_from_json() {
        let rules = MappingRules::from_json_str(
            r#"{
                "aliases": {"product": "catalog_product_entity"},
                "default_fields": {"catalog_product_entity": "sku"},
                "row_rules": {
                    "store": [{"field": "code"}, {"field": "website_id", "default": 1}]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(rules.resolve_alias("product"), "catalog_product_entity");
        assert_eq!(rules.default_field("catalog_product_entity"), Some("sku"));
        assert_eq!(
            rules.row_rule("store").unwrap(),
            [
                RowRuleField::required("code"),
                RowRuleField::with_default("website_id", 1)
            ]
        );
        assert!(MappingRules::from_json_str("[").is_err());
    }
}
