use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub original_name: String,
    pub storage_name: String,
    pub path: String,
    pub size: u64,
    pub mime_type: String,
    pub extension: String,
    pub description: String,
    pub private: bool,
    pub lookup_key: String,
    pub url: String,
    pub views: u64,
    pub last_accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record before the metadata store has assigned it an identity.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub original_name: String,
    pub storage_name: String,
    pub path: String,
    pub size: u64,
    pub mime_type: String,
    pub extension: String,
    pub description: String,
    pub private: bool,
    pub lookup_key: String,
    pub url: String,
}

impl FileRecord {
    pub fn from_new(id: Uuid, new: NewFileRecord, now: DateTime<Utc>) -> Self {
        Self {
            id,
            original_name: new.original_name,
            storage_name: new.storage_name,
            path: new.path,
            size: new.size,
            mime_type: new.mime_type,
            extension: new.extension,
            description: new.description,
            private: new.private,
            lookup_key: new.lookup_key,
            url: new.url,
            views: 0,
            last_accessed_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fields a copy inherits from this record; identity, key and location are fresh.
    pub fn clone_for_copy(&self, path: String, lookup_key: String, url: String) -> NewFileRecord {
        NewFileRecord {
            original_name: self.original_name.clone(),
            storage_name: self.storage_name.clone(),
            path,
            size: self.size,
            mime_type: self.mime_type.clone(),
            extension: self.extension.clone(),
            description: self.description.clone(),
            private: self.private,
            lookup_key,
            url,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateFileRequest {
    pub original_name: Option<String>,
    pub description: Option<String>,
    pub private: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MoveFileRequest {
    pub from_path: String,
    pub to_path: String,
}

#[derive(Debug, Deserialize)]
pub struct CopyFileRequest {
    pub from_path: String,
    pub to_path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    /// Records whose `path` has no object on the storage medium.
    pub missing_objects: Vec<FileRecord>,
    /// Stored objects no record points at.
    pub orphaned_objects: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.missing_objects.is_empty() && self.orphaned_objects.is_empty()
    }
}
