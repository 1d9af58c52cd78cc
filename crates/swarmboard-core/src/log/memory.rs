//! In-memory checkpoint log for tests and ephemeral nodes.

use super::{BoxFuture, CheckpointLog, LogError, LogResult};
use crate::checkpoint::CheckpointRecord;
use std::sync::RwLock;

/// In-memory append-only log.
#[derive(Default)]
pub struct MemoryLog {
    records: RwLock<Vec<CheckpointRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointLog for MemoryLog {
    fn append(&self, record: &CheckpointRecord) -> BoxFuture<'_, LogResult<u64>> {
        let record = record.clone();
        Box::pin(async move {
            let mut records = self
                .records
                .write()
                .map_err(|_| LogError::Other("log lock poisoned".to_string()))?;
            records.push(record);
            Ok(records.len() as u64 - 1)
        })
    }

    fn get(&self, index: u64) -> BoxFuture<'_, LogResult<CheckpointRecord>> {
        Box::pin(async move {
            let records = self
                .records
                .read()
                .map_err(|_| LogError::Other("log lock poisoned".to_string()))?;
            records
                .get(index as usize)
                .cloned()
                .ok_or(LogError::NotFound(index))
        })
    }

    fn len(&self) -> BoxFuture<'_, LogResult<u64>> {
        Box::pin(async move {
            let records = self
                .records
                .read()
                .map_err(|_| LogError::Other("log lock poisoned".to_string()))?;
            Ok(records.len() as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::test_util::block_on;
    use uuid::Uuid;

    #[test]
    fn test_memory_log_append_get() {
        let log = MemoryLog::new();
        let record = CheckpointRecord::from_document(&Document::new(), Uuid::new_v4(), "main");

        assert_eq!(block_on(log.append(&record)).unwrap(), 0);
        assert_eq!(block_on(log.append(&record)).unwrap(), 1);
        assert_eq!(block_on(log.len()).unwrap(), 2);

        let loaded = block_on(log.get(1)).unwrap();
        assert_eq!(loaded.room, "main");
    }

    #[test]
    fn test_memory_log_get_out_of_range() {
        let log = MemoryLog::new();
        assert!(matches!(block_on(log.get(0)), Err(LogError::NotFound(0))));
    }
}
