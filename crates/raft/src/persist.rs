//! Durable `(current_term, voted_for, log)` storage. One MessagePack
//! document per replica, written to a temp file and renamed over the
//! previous snapshot so a crash mid-write never corrupts the live file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RaftError, Result};
use crate::log::Log;
use crate::types::{LogEntry, Metadata};

#[derive(Serialize, Deserialize)]
struct PersistedRecord {
    meta: Metadata,
    log: Vec<LogEntry>,
}

pub struct PersistentStore {
    path: PathBuf,
}

impl PersistentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PersistentStore { path: path.into() }
    }

    /// Loads the triple from disk, or a fresh empty record if this replica
    /// has never persisted anything before.
    pub fn load(&self) -> Result<(Metadata, Log)> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                let record: PersistedRecord = rmp_serde::from_slice(&bytes)
                    .map_err(|e| RaftError::ProtocolViolation(format!("corrupt persistent record: {e}")))?;
                Ok((record.meta, Log::from_entries(record.log)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((Metadata::default(), Log::new())),
            Err(e) => Err(RaftError::Persistence(e)),
        }
    }

    /// Atomically overwrites the persisted record. Called before replying
    /// to any RPC that mutated `current_term`, `voted_for` or the log.
    pub fn save(&self, meta: &Metadata, log: &Log) -> Result<()> {
        let record = PersistedRecord { meta: meta.clone(), log: log.as_slice().to_vec() };
        let bytes = rmp_serde::to_vec(&record)
            .map_err(|e| RaftError::ProtocolViolation(format!("failed to encode persistent record: {e}")))?;

        let tmp_path = tmp_path_for(&self.path);
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            use std::io::Write;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogEntryData;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStore::new(dir.path().join("raft.state"));

        let (meta, log) = store.load().unwrap();
        assert_eq!(meta.current_term, 0);
        assert_eq!(log.last_index(), 0);

        let mut meta = meta;
        meta.current_term = 4;
        meta.voted_for = Some(2);
        let mut log = log;
        log.append(LogEntry { index: 1, term: 4, data: LogEntryData::Noop });

        store.save(&meta, &log).unwrap();

        let (reloaded_meta, reloaded_log) = store.load().unwrap();
        assert_eq!(reloaded_meta, meta);
        assert_eq!(reloaded_log.last_index(), 1);
    }
}
