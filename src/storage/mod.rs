//! Byte-storage backends.
//!
//! Every path handed to a backend is relative to the backend's root and has
//! already been through `sandbox::path_validator`. Backends still re-check,
//! since they are the last line before the disk.

pub mod local;

pub use local::LocalStorage;

use async_trait::async_trait;
use std::io;
use tokio::io::AsyncRead;

/// Streaming handle over an object's bytes.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Backend trait for the storage medium.
///
/// Errors are plain `io::Error`s so callers can tell `NotFound` and
/// `AlreadyExists` apart from real I/O failures.
#[async_trait]
pub trait StorageMedium: Send + Sync + 'static {
    /// Create a new object. Fails with `AlreadyExists` rather than overwrite.
    async fn write(&self, path: &str, data: &[u8]) -> io::Result<()>;

    /// Move an object. Fails with `AlreadyExists` if `to` is taken.
    async fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Duplicate an object. Fails with `AlreadyExists` if `to` is taken;
    /// a partially written copy is removed before returning the error.
    async fn copy(&self, from: &str, to: &str) -> io::Result<()>;

    /// Remove an object. `NotFound` if it is already gone.
    async fn delete(&self, path: &str) -> io::Result<()>;

    async fn exists(&self, path: &str) -> io::Result<bool>;

    /// Create the parent directories of `path` if they are missing.
    async fn ensure_parent(&self, path: &str) -> io::Result<()>;

    async fn open(&self, path: &str) -> io::Result<ObjectReader>;

    /// Every object under the root, sorted.
    async fn list(&self) -> io::Result<Vec<String>>;
}
