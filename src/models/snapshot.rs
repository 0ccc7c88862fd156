use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::file::FileRecord;

pub const SNAPSHOT_VERSION: u32 = 3;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub version: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Last WAL sequence folded into `records`; replay skips everything up to it.
    pub wal_seq: u64,
    pub records: HashMap<Uuid, FileRecord>,
}
