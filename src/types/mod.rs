pub mod encode;
pub mod value;

use serde_derive::{Deserialize, Serialize};

pub use value::Value;

/// Column data type as reported by the information schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    TinyInt,
    SmallInt,
    MediumInt,
    Integer,
    BigInt,
    Decimal,
    Numeric,
    Float,
    Double,
    Real,
    Date,
    Time,
    DateTime,
    Timestamp,
    Char,
    VarChar,
    Text,
    TinyText,
    MediumText,
    LongText,
    Blob,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Binary,
    VarBinary,
    Other(String),
}

impl ColumnType {
    pub fn parse(data_type: &str) -> Self {
        match data_type.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => ColumnType::Boolean,
            "tinyint" => ColumnType::TinyInt,
            "smallint" => ColumnType::SmallInt,
            "mediumint" => ColumnType::MediumInt,
            "int" | "integer" => ColumnType::Integer,
            "bigint" => ColumnType::BigInt,
            "decimal" => ColumnType::Decimal,
            "numeric" => ColumnType::Numeric,
            "float" => ColumnType::Float,
            "double" => ColumnType::Double,
            "real" => ColumnType::Real,
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "datetime" => ColumnType::DateTime,
            "timestamp" => ColumnType::Timestamp,
            "char" => ColumnType::Char,
            "varchar" => ColumnType::VarChar,
            "text" => ColumnType::Text,
            "tinytext" => ColumnType::TinyText,
            "mediumtext" => ColumnType::MediumText,
            "longtext" => ColumnType::LongText,
            "blob" => ColumnType::Blob,
            "tinyblob" => ColumnType::TinyBlob,
            "mediumblob" => ColumnType::MediumBlob,
            "longblob" => ColumnType::LongBlob,
            "binary" => ColumnType::Binary,
            "varbinary" => ColumnType::VarBinary,
            other => ColumnType::Other(other.to_owned()),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::TinyInt
                | ColumnType::SmallInt
                | ColumnType::MediumInt
                | ColumnType::Integer
                | ColumnType::BigInt
        )
    }

    pub fn is_decimal(&self) -> bool {
        matches!(
            self,
            ColumnType::Decimal
                | ColumnType::Numeric
                | ColumnType::Float
                | ColumnType::Double
                | ColumnType::Real
        )
    }

    pub fn is_date_based(&self) -> bool {
        matches!(
            self,
            ColumnType::Date | ColumnType::Time | ColumnType::DateTime | ColumnType::Timestamp
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self,
            ColumnType::Char
                | ColumnType::VarChar
                | ColumnType::Text
                | ColumnType::TinyText
                | ColumnType::MediumText
                | ColumnType::LongText
        )
    }

    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            ColumnType::Blob
                | ColumnType::TinyBlob
                | ColumnType::MediumBlob
                | ColumnType::LongBlob
                | ColumnType::Binary
                | ColumnType::VarBinary
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type() {
        assert_eq!(ColumnType::parse("INT"), ColumnType::Integer);
        assert_eq!(ColumnType::parse("varchar"), ColumnType::VarChar);
        assert_eq!(
            ColumnType::parse("enum"),
            ColumnType::Other("enum".to_owned())
        );
    }

    #[test]
    fn test_type_family() {
        assert!(ColumnType::SmallInt.is_integer());
        assert!(!ColumnType::Boolean.is_integer());
        assert!(ColumnType::Real.is_decimal());
        assert!(ColumnType::Timestamp.is_date_based());
        assert!(ColumnType::LongText.is_string());
        assert!(!ColumnType::Blob.is_string());
        assert!(ColumnType::VarBinary.is_binary());
    }
}
