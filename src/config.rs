use serde_derive::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    fmt_err,
    writer::Queue,
};

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// rows per multi row insert
    pub batch_size: usize,
    /// queues in the order `flush` writes them
    pub queues: Vec<Queue>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            queues: vec![Queue::Primary, Queue::Secondary],
        }
    }
}

impl WriterConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(fmt_err!("invalid writer config: {e}")))?;
        if config.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".to_owned()));
        }
        Ok(config)
    }
}
