use core::fmt::Display;

use serde_derive::{Deserialize, Serialize};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// requested table is not part of the schema
    TableNotFound(String),
    Config(String),
    /// a row can't be turned into a lookup condition
    Unmappable(String),
    MissingValue(String),
    InvalidValue(String),
    Adapter(String),
    Internal(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TableNotFound(table) => {
                write!(f, "Requested table \"{}\" does not exist", table)
            }
            Self::Config(err)
            | Self::Unmappable(err)
            | Self::MissingValue(err)
            | Self::InvalidValue(err)
            | Self::Adapter(err)
            | Self::Internal(err) => {
                write!(f, "{}", err)
            }
        }
    }
}

impl std::error::Error for Error {}

#[macro_export]
macro_rules! fmt_err {
    ($($arg:tt)*) => {
        format!($($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::TableNotFound("order".to_owned()).to_string(),
            "Requested table \"order\" does not exist"
        );
        assert_eq!(
            Error::InvalidValue(fmt_err!("bad {}", 1)).to_string(),
            "bad 1"
        );
    }
}
