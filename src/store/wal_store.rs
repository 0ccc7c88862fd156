use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::MetadataStore;
use crate::error::AppError;
use crate::models::file::{FileRecord, NewFileRecord};
use crate::models::snapshot::{MetadataSnapshot, SNAPSHOT_VERSION};
use crate::persistence::snapshot::{load_snapshot, save_snapshot};
use crate::persistence::wal::{WalEntry, WalWriter};

/// In-memory record set made durable by a write-ahead log and periodic
/// snapshots.
///
/// Every mutation appends to the WAL and applies to memory while holding the
/// WAL lock, so mutations are totally ordered and a snapshot taken under the
/// same lock never misses an entry. Reads go straight to the maps.
pub struct WalMetadataStore {
    records: DashMap<Uuid, FileRecord>,
    by_key: DashMap<String, Uuid>,
    by_path: DashMap<String, Uuid>,
    wal: Mutex<Option<WalWriter>>,
    snapshot_path: Option<PathBuf>,
}

impl WalMetadataStore {
    /// Open the store rooted at `metadata_dir`: load the snapshot, then
    /// replay the WAL on top of it.
    pub fn open(metadata_dir: &Path) -> anyhow::Result<Self> {
        let snapshot_path = metadata_dir.join("snapshot.bin");
        let wal_dir = metadata_dir.join("wal");

        let mut writer = WalWriter::open(&wal_dir)?;
        let snapshot = load_snapshot(&snapshot_path)?;
        let folded = snapshot.as_ref().map_or(0, |s| s.wal_seq);
        let entries = WalWriter::read_entries(&wal_dir)?;
        let last_seq = entries.last().map_or(0, |(seq, _)| *seq).max(folded);
        writer.resume_after(last_seq);

        let store = Self::with_wal(writer, snapshot_path);

        if let Some(snapshot) = snapshot {
            tracing::info!(
                records = snapshot.records.len(),
                taken_at = %snapshot.timestamp,
                wal_seq = snapshot.wal_seq,
                "Loaded metadata snapshot"
            );
            for (_, record) in snapshot.records {
                store.apply_insert(record);
            }
        }

        let total = entries.len();
        let pending: Vec<WalEntry> = entries
            .into_iter()
            .filter(|(seq, _)| *seq > folded)
            .map(|(_, entry)| entry)
            .collect();
        if pending.len() < total {
            tracing::warn!(
                skipped = total - pending.len(),
                "WAL holds entries already in the snapshot, skipping them"
            );
        }
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "Replaying WAL entries");
            store.replay(pending);
        }

        Ok(store)
    }

    /// A store that lives only in memory.
    pub fn ephemeral() -> Self {
        Self {
            records: DashMap::new(),
            by_key: DashMap::new(),
            by_path: DashMap::new(),
            wal: Mutex::new(None),
            snapshot_path: None,
        }
    }

    fn with_wal(wal: WalWriter, snapshot_path: PathBuf) -> Self {
        Self {
            wal: Mutex::new(Some(wal)),
            snapshot_path: Some(snapshot_path),
            ..Self::ephemeral()
        }
    }

    fn replay(&self, entries: Vec<WalEntry>) {
        for entry in entries {
            match entry {
                WalEntry::RecordInserted { record } => self.apply_insert(record),
                WalEntry::RecordUpdated { record } => {
                    self.apply_update(record);
                }
                WalEntry::ViewRecorded { id, at } => {
                    self.apply_view(id, at);
                }
                WalEntry::RecordDeleted { id } => {
                    self.apply_delete(id);
                }
            }
        }
    }

    fn apply_insert(&self, record: FileRecord) {
        self.by_key.insert(record.lookup_key.clone(), record.id);
        self.by_path.insert(record.path.clone(), record.id);
        self.records.insert(record.id, record);
    }

    /// Merge the mutable fields of `incoming` into the stored record.
    fn apply_update(&self, incoming: FileRecord) -> Option<FileRecord> {
        let current = self.records.get(&incoming.id).map(|r| r.clone())?;

        let merged = FileRecord {
            original_name: incoming.original_name,
            path: incoming.path,
            description: incoming.description,
            private: incoming.private,
            updated_at: incoming.updated_at,
            ..current.clone()
        };

        if merged.path != current.path {
            self.by_path
                .remove_if(&current.path, |_, owner| *owner == current.id);
            self.by_path.insert(merged.path.clone(), merged.id);
        }
        self.records.insert(merged.id, merged.clone());
        Some(merged)
    }

    fn apply_view(&self, id: Uuid, at: DateTime<Utc>) -> Option<FileRecord> {
        let mut record = self.records.get_mut(&id)?;
        record.views += 1;
        if at > record.last_accessed_at {
            record.last_accessed_at = at;
        }
        Some(record.clone())
    }

    fn apply_delete(&self, id: Uuid) -> Option<FileRecord> {
        let (_, record) = self.records.remove(&id)?;
        self.by_key.remove_if(&record.lookup_key, |_, owner| *owner == id);
        self.by_path.remove_if(&record.path, |_, owner| *owner == id);
        Some(record)
    }

    fn lookup(&self, id: Option<Uuid>) -> Option<FileRecord> {
        id.and_then(|id| self.records.get(&id).map(|r| r.clone()))
    }
}

fn append(wal: &mut Option<WalWriter>, entry: &WalEntry) -> Result<(), AppError> {
    match wal {
        Some(writer) => writer
            .append(entry)
            .map_err(|e| AppError::Internal(format!("WAL write failed: {}", e))),
        None => Ok(()),
    }
}

#[async_trait]
impl MetadataStore for WalMetadataStore {
    async fn insert(&self, new: NewFileRecord) -> Result<FileRecord, AppError> {
        let mut wal = self.wal.lock().await;

        if self.by_key.contains_key(&new.lookup_key) {
            return Err(AppError::Conflict("Lookup key already in use".into()));
        }
        if self.by_path.contains_key(&new.path) {
            return Err(AppError::Conflict(format!(
                "Path already owned by a record: {}",
                new.path
            )));
        }

        let id = loop {
            let candidate = Uuid::new_v4();
            if !self.records.contains_key(&candidate) {
                break candidate;
            }
        };
        let record = FileRecord::from_new(id, new, Utc::now());

        append(
            &mut wal,
            &WalEntry::RecordInserted {
                record: record.clone(),
            },
        )?;
        self.apply_insert(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        Ok(self.lookup(Some(id)))
    }

    async fn find_by_key(&self, lookup_key: &str) -> Result<Option<FileRecord>, AppError> {
        let id = self.by_key.get(lookup_key).map(|id| *id);
        Ok(self.lookup(id))
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<FileRecord>, AppError> {
        let id = self.by_path.get(path).map(|id| *id);
        Ok(self.lookup(id))
    }

    async fn update(&self, record: &FileRecord) -> Result<FileRecord, AppError> {
        let mut wal = self.wal.lock().await;

        if !self.records.contains_key(&record.id) {
            return Err(AppError::NotFound(format!("Record {} not found", record.id)));
        }
        if let Some(owner) = self.by_path.get(&record.path).map(|id| *id) {
            if owner != record.id {
                return Err(AppError::Conflict(format!(
                    "Path already owned by a record: {}",
                    record.path
                )));
            }
        }

        let mut next = record.clone();
        next.updated_at = Utc::now();

        append(
            &mut wal,
            &WalEntry::RecordUpdated {
                record: next.clone(),
            },
        )?;
        self.apply_update(next)
            .ok_or_else(|| AppError::NotFound(format!("Record {} not found", record.id)))
    }

    async fn record_view(&self, id: Uuid, at: DateTime<Utc>) -> Result<FileRecord, AppError> {
        let mut wal = self.wal.lock().await;

        if !self.records.contains_key(&id) {
            return Err(AppError::NotFound(format!("Record {} not found", id)));
        }
        append(&mut wal, &WalEntry::ViewRecorded { id, at })?;
        self.apply_view(id, at)
            .ok_or_else(|| AppError::NotFound(format!("Record {} not found", id)))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let mut wal = self.wal.lock().await;

        if !self.records.contains_key(&id) {
            return Ok(None);
        }
        append(&mut wal, &WalEntry::RecordDeleted { id })?;
        Ok(self.apply_delete(id))
    }

    async fn list_all(&self) -> Result<Vec<FileRecord>, AppError> {
        let mut records: Vec<FileRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn compact(&self) -> Result<(), AppError> {
        let mut wal = self.wal.lock().await;
        let (Some(writer), Some(path)) = (wal.as_mut(), self.snapshot_path.clone()) else {
            return Ok(());
        };

        let records: HashMap<Uuid, FileRecord> = self
            .records
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        let count = records.len();
        let wal_seq = writer.last_seq();
        let snapshot = MetadataSnapshot {
            version: SNAPSHOT_VERSION,
            timestamp: Utc::now(),
            wal_seq,
            records,
        };

        tokio::task::spawn_blocking(move || save_snapshot(&path, &snapshot))
            .await
            .map_err(|e| AppError::Internal(format!("Snapshot task failed: {}", e)))??;

        let folded = writer.entry_count();
        writer
            .truncate()
            .map_err(|e| AppError::Internal(format!("WAL truncate failed: {}", e)))?;
        tracing::info!(records = count, wal_entries = folded, "Metadata snapshot written");
        Ok(())
    }
}
