use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::{ObjectReader, StorageMedium};
use crate::error::AppError;
use crate::sandbox::path_validator;

/// Objects stored as plain files below a root directory.
///
/// Creating a destination (parent dirs + the object) holds `dirs` shared;
/// pruning empty directories holds it exclusively, so a prune never removes
/// a directory another object is being placed into.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    dirs: Arc<RwLock<()>>,
}

impl LocalStorage {
    /// Create the root if needed and pin it to its canonical form.
    pub async fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        tokio::fs::create_dir_all(root.as_ref()).await?;
        let root = tokio::fs::canonicalize(root.as_ref()).await?;
        Ok(Self {
            root,
            dirs: Arc::new(RwLock::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, rel_path: &str) -> io::Result<PathBuf> {
        let clean = path_validator::validate_destination(rel_path).map_err(denied)?;
        Ok(self.root.join(clean))
    }

    /// Resolve `rel_path` for writing: create its parent and make sure the
    /// parent did not land outside the root through a symlink.
    async fn prepare_destination(&self, rel_path: &str) -> io::Result<PathBuf> {
        let target = self.resolve(rel_path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
            path_validator::ensure_within_root(&self.root, parent).map_err(denied)?;
        }
        Ok(target)
    }

    /// Remove directories left empty by a delete or move, stopping at the root.
    async fn prune_empty_dirs(&self, file_path: &Path) {
        let _prune = self.dirs.write().await;
        cleanup_empty_dirs(&self.root, file_path).await;
    }
}

fn denied(err: AppError) -> io::Error {
    match err {
        AppError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::PermissionDenied, other.to_string()),
    }
}

async fn cleanup_empty_dirs(root: &Path, file_path: &Path) {
    let mut dir = file_path.parent();
    while let Some(d) = dir {
        if d == root || !d.starts_with(root) {
            break;
        }
        match tokio::fs::read_dir(d).await {
            Ok(mut entries) => {
                if entries.next_entry().await.ok().flatten().is_none() {
                    let _ = tokio::fs::remove_dir(d).await;
                } else {
                    break;
                }
            }
            Err(_) => break,
        }
        dir = d.parent();
    }
}

#[async_trait]
impl StorageMedium for LocalStorage {
    async fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let _placing = self.dirs.read().await;
        let target = self.prepare_destination(path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await?;

        let written = async {
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&target).await;
            return Err(e);
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let src = self.resolve(from)?;
        {
            let _placing = self.dirs.read().await;
            let dst = self.prepare_destination(to).await?;

            // link + unlink instead of rename(2): the link fails on an occupied
            // destination where rename would silently replace it.
            tokio::fs::hard_link(&src, &dst).await?;
            if let Err(e) = tokio::fs::remove_file(&src).await {
                let _ = tokio::fs::remove_file(&dst).await;
                return Err(e);
            }
        }

        self.prune_empty_dirs(&src).await;
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> io::Result<()> {
        let src = self.resolve(from)?;
        let mut reader = tokio::fs::File::open(&src).await?;

        let _placing = self.dirs.read().await;
        let dst = self.prepare_destination(to).await?;
        let mut writer = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&dst)
            .await?;

        let copied = async {
            tokio::io::copy(&mut reader, &mut writer).await?;
            writer.flush().await?;
            writer.sync_all().await
        }
        .await;

        if let Err(e) = copied {
            drop(writer);
            let _ = tokio::fs::remove_file(&dst).await;
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        tokio::fs::remove_file(&target).await?;
        self.prune_empty_dirs(&target).await;
        Ok(())
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        let target = self.resolve(path)?;
        tokio::fs::try_exists(&target).await
    }

    async fn ensure_parent(&self, path: &str) -> io::Result<()> {
        let _placing = self.dirs.read().await;
        self.prepare_destination(path).await.map(|_| ())
    }

    async fn open(&self, path: &str) -> io::Result<ObjectReader> {
        let target = self.resolve(path)?;
        let file = tokio::fs::File::open(&target).await?;
        Ok(Box::new(file))
    }

    async fn list(&self) -> io::Result<Vec<String>> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    if let Ok(rel) = path.strip_prefix(&self.root) {
                        objects.push(rel.to_string_lossy().replace('\\', "/"));
                    }
                }
            }
        }

        objects.sort();
        Ok(objects)
    }
}
