//! File-backed checkpoint log.

use super::{BoxFuture, CheckpointLog, LogError, LogResult};
use crate::checkpoint::CheckpointRecord;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Append-only log stored as one JSON record per line.
///
/// Each room gets its own file; appends go through `O_APPEND` so a crash
/// mid-write can at worst lose the last line, never corrupt earlier
/// records. Reads that hit a torn trailing line skip it.
pub struct FileLog {
    path: PathBuf,
    // Serializes appends from concurrent checkpoint tasks.
    write_lock: Mutex<()>,
}

impl FileLog {
    /// Open (or create) the log for a room inside the given directory.
    pub fn new(base_path: PathBuf, room: &str) -> LogResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path)
                .map_err(|e| LogError::Io(format!("Failed to create log directory: {}", e)))?;
        }
        let safe_room: String = room
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Ok(Self {
            path: base_path.join(format!("{}.log", safe_room)),
            write_lock: Mutex::new(()),
        })
    }

    /// Open the log for a room in the default location.
    ///
    /// On Unix: `~/.local/share/swarmboard/checkpoints/`
    pub fn default_location(room: &str) -> LogResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| LogError::Io("Could not determine home directory".to_string()))?;
        Self::new(base.join("swarmboard").join("checkpoints"), room)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_lines(&self) -> LogResult<Vec<CheckpointRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| LogError::Io(format!("Failed to read {}: {}", self.path.display(), e)))?;
        let mut records = Vec::new();
        for line in contents.lines() {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::warn!("skipping unreadable checkpoint line: {}", e);
                }
            }
        }
        Ok(records)
    }
}

impl CheckpointLog for FileLog {
    fn append(&self, record: &CheckpointRecord) -> BoxFuture<'_, LogResult<u64>> {
        let line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                return Box::pin(async move { Err(LogError::Serialization(e.to_string())) });
            }
        };

        Box::pin(async move {
            let _guard = self
                .write_lock
                .lock()
                .map_err(|_| LogError::Other("log lock poisoned".to_string()))?;
            let index = self.read_lines()?.len() as u64;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| {
                    LogError::Io(format!("Failed to open {}: {}", self.path.display(), e))
                })?;
            writeln!(file, "{}", line).map_err(|e| {
                LogError::Io(format!("Failed to append to {}: {}", self.path.display(), e))
            })?;
            Ok(index)
        })
    }

    fn get(&self, index: u64) -> BoxFuture<'_, LogResult<CheckpointRecord>> {
        Box::pin(async move {
            self.read_lines()?
                .into_iter()
                .nth(index as usize)
                .ok_or(LogError::NotFound(index))
        })
    }

    fn len(&self) -> BoxFuture<'_, LogResult<u64>> {
        Box::pin(async move { Ok(self.read_lines()?.len() as u64) })
    }
}
