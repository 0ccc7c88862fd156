//! Metadata persistence for file records.

pub mod wal_store;

pub use wal_store::WalMetadataStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::file::{FileRecord, NewFileRecord};

/// Durable store of [`FileRecord`]s.
///
/// Lookups return `Ok(None)` for absent records; callers decide whether that
/// is an error. Writes are last-writer-wins; callers serialize mutations of a
/// single record themselves.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Assign an id and timestamps and store the record.
    ///
    /// # Errors
    ///
    /// `Conflict` if the lookup key or the path already belongs to a live record.
    async fn insert(&self, new: NewFileRecord) -> Result<FileRecord, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, AppError>;

    async fn find_by_key(&self, lookup_key: &str) -> Result<Option<FileRecord>, AppError>;

    async fn find_by_path(&self, path: &str) -> Result<Option<FileRecord>, AppError>;

    /// Persist the mutable fields of `record` and refresh `updated_at`.
    /// The stored `views` and `last_accessed_at` are kept.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record is gone, `Conflict` if the new path belongs
    /// to another record.
    async fn update(&self, record: &FileRecord) -> Result<FileRecord, AppError>;

    /// Atomically bump `views` and set `last_accessed_at`.
    async fn record_view(&self, id: Uuid, at: DateTime<Utc>) -> Result<FileRecord, AppError>;

    /// Remove a record, returning it if it existed.
    async fn delete(&self, id: Uuid) -> Result<Option<FileRecord>, AppError>;

    /// All records, oldest first.
    async fn list_all(&self) -> Result<Vec<FileRecord>, AppError>;

    /// Fold the durable log into a snapshot. A no-op for stores without one.
    async fn compact(&self) -> Result<(), AppError> {
        Ok(())
    }
}
