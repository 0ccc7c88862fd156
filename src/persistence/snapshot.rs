use crate::models::snapshot::{MetadataSnapshot, SNAPSHOT_VERSION};
use std::path::Path;

pub fn save_snapshot(path: &Path, snapshot: &MetadataSnapshot) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("bin.tmp");
    let data = bincode::serialize(snapshot)?;
    std::fs::write(&tmp_path, &data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load the last snapshot. A missing, foreign-version or undecodable file
/// yields `None` so the store starts from the WAL alone.
pub fn load_snapshot(path: &Path) -> anyhow::Result<Option<MetadataSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    match bincode::deserialize::<MetadataSnapshot>(&data) {
        Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => Ok(Some(snapshot)),
        Ok(snapshot) => {
            tracing::warn!(
                expected = SNAPSHOT_VERSION,
                found = snapshot.version,
                "Snapshot version mismatch, ignoring snapshot"
            );
            Ok(None)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to deserialize snapshot");
            Ok(None)
        }
    }
}
