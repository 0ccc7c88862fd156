use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::models::file::FileRecord;

const WAL_FILE: &str = "current.wal";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum WalEntry {
    RecordInserted { record: FileRecord },
    /// Replay keeps the live `views`/`last_accessed_at`; those only move through `ViewRecorded`.
    RecordUpdated { record: FileRecord },
    ViewRecorded { id: Uuid, at: DateTime<Utc> },
    RecordDeleted { id: Uuid },
}

/// Length-prefixed bincode log, one `(seq, entry)` frame per metadata
/// mutation. Sequence numbers keep increasing across truncates.
pub struct WalWriter {
    dir: PathBuf,
    file: std::fs::File,
    entry_count: u64,
    next_seq: u64,
}

impl WalWriter {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(WAL_FILE))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            file,
            entry_count: 0,
            next_seq: 1,
        })
    }

    /// Continue numbering after `seq`, the last sequence already on disk
    /// or folded into a snapshot.
    pub fn resume_after(&mut self, seq: u64) {
        self.next_seq = self.next_seq.max(seq + 1);
    }

    /// Sequence of the most recent append, 0 if nothing was ever written.
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn append(&mut self, entry: &WalEntry) -> anyhow::Result<()> {
        let data = bincode::serialize(&(self.next_seq, entry))?;
        let len = data.len() as u32;
        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(&data)?;
        self.file.flush()?;
        self.entry_count += 1;
        self.next_seq += 1;
        Ok(())
    }

    pub fn truncate(&mut self) -> anyhow::Result<()> {
        self.file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.dir.join(WAL_FILE))?;
        self.entry_count = 0;
        Ok(())
    }

    /// Entries appended since open or the last truncate.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn read_entries(dir: &Path) -> anyhow::Result<Vec<(u64, WalEntry)>> {
        let wal_path = dir.join(WAL_FILE);
        if !wal_path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read(&wal_path)?;
        let mut entries = Vec::new();
        let mut cursor = 0;
        while cursor + 4 <= data.len() {
            let len_bytes: [u8; 4] = data[cursor..cursor + 4].try_into()?;
            let len = u32::from_le_bytes(len_bytes) as usize;
            cursor += 4;
            if cursor + len > data.len() {
                tracing::warn!("WAL truncated at entry boundary, stopping replay");
                break;
            }
            match bincode::deserialize::<(u64, WalEntry)>(&data[cursor..cursor + len]) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "WAL entry corrupt, stopping replay");
                    break;
                }
            }
            cursor += len;
        }
        Ok(entries)
    }
}
