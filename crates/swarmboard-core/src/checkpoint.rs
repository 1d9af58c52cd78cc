//! Periodic checkpointing of the document to an append-only log.
//!
//! Checkpoints are a durability supplement to the live operation
//! stream. Restoring replays records additively through the document
//! store, so a restore can only fill gaps, never regress live state.

use crate::document::Document;
use crate::log::{BoxFuture, CheckpointLog, LogResult};
use crate::objects::{DrawableObject, ObjectId, PeerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// One durable snapshot of the document, tagged with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub version: u64,
    pub order: Vec<ObjectId>,
    pub objects: HashMap<ObjectId, DrawableObject>,
    /// Milliseconds since the Unix epoch.
    pub saved_at: u64,
    pub saved_by: PeerId,
    pub room: String,
}

impl CheckpointRecord {
    /// Snapshot the given document state.
    pub fn from_document(doc: &Document, saved_by: PeerId, room: &str) -> Self {
        Self {
            version: doc.version,
            order: doc.order.clone(),
            objects: doc.objects.clone(),
            saved_at: epoch_millis(),
            saved_by,
            room: room.to_string(),
        }
    }

    /// The recorded state as a document, for merging.
    pub fn to_document(&self) -> Document {
        Document {
            objects: self.objects.clone(),
            order: self.order.clone(),
            version: self.version,
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Writes and reads checkpoints for one room against a log backend.
///
/// The log itself may hold records from other rooms (a shared backend);
/// reads filter on the room tag.
pub struct CheckpointCoordinator {
    room: String,
    log: Box<dyn CheckpointLog>,
}

impl CheckpointCoordinator {
    pub fn new(room: impl Into<String>, log: Box<dyn CheckpointLog>) -> Self {
        Self {
            room: room.into(),
            log,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// Append a checkpoint of the given document state.
    pub fn checkpoint(
        &self,
        doc: &Document,
        saved_by: PeerId,
    ) -> BoxFuture<'_, LogResult<u64>> {
        let record = CheckpointRecord::from_document(doc, saved_by, &self.room);
        Box::pin(async move {
            let index = self.log.append(&record).await?;
            log::info!(
                "checkpointed room {} at version {} (record {})",
                self.room,
                record.version,
                index
            );
            Ok(index)
        })
    }

    /// The most recent checkpoint for this room, if any.
    pub fn latest(&self) -> BoxFuture<'_, LogResult<Option<CheckpointRecord>>> {
        Box::pin(async move {
            let len = self.log.len().await?;
            for index in (0..len).rev() {
                let record = self.log.get(index).await?;
                if record.room == self.room {
                    return Ok(Some(record));
                }
            }
            Ok(None)
        })
    }

    /// Every checkpoint for this room, oldest first.
    pub fn history(&self) -> BoxFuture<'_, LogResult<Vec<CheckpointRecord>>> {
        Box::pin(async move {
            let len = self.log.len().await?;
            let mut records = Vec::new();
            for index in 0..len {
                let record = self.log.get(index).await?;
                if record.room == self.room {
                    records.push(record);
                }
            }
            Ok(records)
        })
    }
}
