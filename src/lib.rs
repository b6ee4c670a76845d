//! Fixture writing with deferred references.
//!
//! Fixture rows can point at rows that do not exist yet or whose ids are
//! only known after a lookup. Such values are [`reference`]s; the
//! [`writer`] schedules rows holding them and writes each row once all of
//! its references have values, in the order the [`catalog`] derives from
//! the foreign keys.

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod error;
pub mod reference;
pub mod resolver;
pub mod types;
pub mod writer;

pub use error::{Error, Result};
