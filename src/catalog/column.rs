use bitflags::bitflags;

use super::provider::ColumnDescriptor;
use crate::types::{
    value::{DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT},
    ColumnType, Value,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColumnOptions: u32 {
        const NULLABLE = 0x01;
        const UNSIGNED = 0x02;
        const PRIMARY = 0x04;
        // autoincrement
        const IDENTITY = 0x08;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub default: Option<String>,
    pub length: Option<usize>,
    pub scale: Option<usize>,
    pub options: ColumnOptions,
}

impl Column {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_owned(),
            column_type,
            default: None,
            length: None,
            scale: None,
            options: ColumnOptions::empty(),
        }
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_owned());
        self
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_scale(mut self, scale: usize) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_options(mut self, options: ColumnOptions) -> Self {
        self.options |= options;
        self
    }

    pub fn is_nullable(&self) -> bool {
        self.options.contains(ColumnOptions::NULLABLE)
    }

    pub fn is_unsigned(&self) -> bool {
        self.options.contains(ColumnOptions::UNSIGNED)
    }

    pub fn is_primary(&self) -> bool {
        self.options.contains(ColumnOptions::PRIMARY)
    }

    pub fn is_identity(&self) -> bool {
        self.options.contains(ColumnOptions::IDENTITY)
    }

    /// Coerces a fixture value into what the database expects for this column.
    pub fn recommended_value(&self, value: Value) -> Value {
        let t = &self.column_type;
        if t.is_integer() {
            self.recommended_integer(value)
        } else if t.is_decimal() {
            self.recommended_decimal(value)
        } else if t.is_date_based() {
            self.recommended_date(value)
        } else if t.is_string() {
            self.recommended_string(value)
        } else {
            value
        }
    }

    fn recommended_integer(&self, value: Value) -> Value {
        if value.is_empty() {
            if self.is_nullable() {
                return Value::Null;
            }
            return match &self.default {
                Some(default) => match default.trim().parse::<i64>() {
                    Ok(n) => Value::Int(n),
                    Err(_) => Value::String(default.clone()),
                },
                None => Value::Int(0),
            };
        }

        Value::Int(value.to_int())
    }

    fn recommended_decimal(&self, value: Value) -> Value {
        let value = if value.is_empty() {
            if self.is_nullable() {
                return Value::Null;
            }
            match &self.default {
                Some(default) => Value::String(default.clone()),
                None => Value::Int(0),
            }
        } else {
            value
        };

        match value {
            Value::String(_) => value,
            v => {
                // half away from zero
                let scale = self.scale.unwrap_or(0);
                let factor = 10f64.powi(scale as i32);
                let rounded = (v.to_float() * factor).round() / factor;
                Value::String(format!("{:.*}", scale, rounded))
            }
        }
    }

    fn recommended_date(&self, value: Value) -> Value {
        if value.is_empty() {
            if self.is_nullable() {
                return Value::Null;
            }
            let zero = match self.column_type {
                ColumnType::Date => "0000-00-00",
                ColumnType::Time => "00:00:00",
                _ => "0000-00-00 00:00:00",
            };
            return Value::String(zero.to_owned());
        }

        match value {
            Value::DateTime(dt) => {
                let format = match self.column_type {
                    ColumnType::Date => DATE_FORMAT,
                    ColumnType::Time => TIME_FORMAT,
                    _ => DATETIME_FORMAT,
                };
                Value::String(dt.format(format).to_string())
            }
            v => v,
        }
    }

    fn recommended_string(&self, value: Value) -> Value {
        match value {
            Value::Null => {
                if self.is_nullable() {
                    Value::Null
                } else {
                    Value::String(self.default.clone().unwrap_or_default())
                }
            }
            Value::String(s) => match self.length {
                // truncate on character boundaries
                Some(length) if length > 0 && s.chars().count() > length => {
                    Value::String(s.chars().take(length).collect())
                }
                _ => Value::String(s),
            },
            v => v,
        }
    }
}

impl From<&ColumnDescriptor> for Column {
    fn from(desc: &ColumnDescriptor) -> Self {
        let mut options = ColumnOptions::empty();
        options.set(ColumnOptions::NULLABLE, desc.nullable);
        options.set(ColumnOptions::UNSIGNED, desc.unsigned);
        options.set(ColumnOptions::PRIMARY, desc.primary);
        options.set(ColumnOptions::IDENTITY, desc.identity);

        Self {
            name: desc.column_name.clone(),
            column_type: ColumnType::parse(&desc.data_type),
            default: desc.default.clone(),
            length: desc.precision.or(desc.length),
            scale: desc.scale,
            options,
        }
    }
}
