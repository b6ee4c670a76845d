use serde_derive::Serialize;

use super::field::{Operation, Queue, Slot};
use crate::reference::RefId;

/// A scheduled row whose reference could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteError {
    pub message: String,
    pub operation: Operation,
    pub table: String,
    pub queue: Queue,
    pub row: usize,
    pub slot: Slot,
    pub reference: RefId,
}

impl WriteError {
    pub fn unresolved(operation: Operation, table: &str, queue: Queue, row: usize, slot: &Slot, reference: RefId) -> Self {
        let message = match slot {
            Slot::Column(column) => format!("Column \"{}\" has unresolved map to external entity", column),
            Slot::Condition { expr, index: None } => {
                format!("Condition \"{}\" has unresolved map to external entity", expr)
            }
            Slot::Condition {
                expr,
                index: Some(index),
            } => format!(
                "Condition \"{}\" has unresolved map to external entity at \"{}\" index",
                expr, index
            ),
        };

        Self {
            message,
            operation,
            table: table.to_owned(),
            queue,
            row,
            slot: slot.clone(),
            reference,
        }
    }
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} {} row {} in {:?} queue)",
            self.message, self.operation, self.table, self.row, self.queue
        )
    }
}
