pub mod column;
pub mod key;
pub mod provider;
pub mod schema;
pub mod table;

pub use column::{Column, ColumnOptions};
pub use key::{ForeignKey, ForeignKeyAction, Key, KeyType};
pub use provider::{InformationProvider, StaticProvider};
pub use schema::{RelationType, Schema};
pub use table::{PrimaryKey, Table};
