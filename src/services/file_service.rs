use bytes::Bytes;
use chrono::Utc;
use std::collections::HashSet;
use uuid::Uuid;

use crate::access::AccessContext;
use crate::error::AppError;
use crate::models::file::{AuditReport, FileRecord, NewFileRecord, UpdateFileRequest};
use crate::naming;
use crate::sandbox::path_validator;
use crate::services::locks::KeyedGuard;
use crate::state::AppState;
use crate::storage::ObjectReader;

/// An object already received by the transport, ready to be stored.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub original_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// Opens tried by a view before a moving object is reported missing.
const VIEW_OPEN_ATTEMPTS: usize = 3;

fn record_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("File {} not found", id))
}

fn path_not_found(path: &str) -> AppError {
    AppError::NotFound(format!("File not found: {}", path))
}

pub async fn list_files(state: &AppState) -> Result<Vec<FileRecord>, AppError> {
    state.store.list_all().await
}

pub async fn get_file(state: &AppState, id: Uuid) -> Result<FileRecord, AppError> {
    state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| record_not_found(id))
}

pub async fn upload_file(state: &AppState, upload: UploadRequest) -> Result<FileRecord, AppError> {
    let original_name = upload.original_name.trim().to_string();
    if naming::sanitize(&original_name).is_empty() {
        return Err(AppError::BadRequest("File name is required".into()));
    }

    let size = upload.data.len() as u64;
    if size > state.config.max_upload_size {
        return Err(AppError::PayloadTooLarge(format!(
            "File size {} exceeds max upload size {}",
            size, state.config.max_upload_size
        )));
    }

    let extension = naming::extension_of(&original_name);
    let (storage_name, path, _path_guard) = claim_storage_path(state, None, &original_name).await?;

    state
        .storage
        .write(&path, &upload.data)
        .await
        .map_err(|e| AppError::from_storage("upload", &path, e))?;

    let inserted = insert_with_fresh_key(state, |lookup_key, url| NewFileRecord {
        original_name: original_name.clone(),
        storage_name: storage_name.clone(),
        path: path.clone(),
        size,
        mime_type: upload.mime_type.clone(),
        extension: extension.clone(),
        description: String::new(),
        private: false,
        lookup_key,
        url,
    })
    .await;

    match inserted {
        Ok(record) => {
            tracing::info!(id = %record.id, path = %record.path, size, "File uploaded");
            Ok(record)
        }
        Err(err) => Err(discard_orphan(state, &path, "upload", err).await),
    }
}

/// Look a record up by its public key, check access, and open its bytes.
///
/// The view counter is bumped only once the content is known to be
/// readable; a failure to bump it is logged and does not fail the view.
/// Views take no record lock, so an object that vanished because the record
/// was moved or renamed meanwhile is looked up again at its new path.
pub async fn view_file(
    state: &AppState,
    lookup_key: &str,
    ctx: &AccessContext,
) -> Result<(FileRecord, ObjectReader), AppError> {
    let mut record = state
        .store
        .find_by_key(lookup_key)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".into()))?;

    let mut attempt = 1;
    let reader = loop {
        if record.private && !state.access.allows(&record, ctx) {
            tracing::warn!(id = %record.id, "Private file view refused");
            return Err(AppError::Forbidden("File is private".into()));
        }

        let err = match state.storage.open(&record.path).await {
            Ok(reader) => break reader,
            Err(e) => e,
        };
        if err.kind() != std::io::ErrorKind::NotFound || attempt >= VIEW_OPEN_ATTEMPTS {
            return Err(AppError::from_storage("view", &record.path, err));
        }
        match state.store.find_by_id(record.id).await? {
            Some(current) if current.path != record.path => {
                tracing::debug!(
                    id = %record.id,
                    from = %record.path,
                    to = %current.path,
                    "Record moved during view, reopening"
                );
                record = current;
                attempt += 1;
            }
            _ => return Err(AppError::from_storage("view", &record.path, err)),
        }
    };

    let record = match state.store.record_view(record.id, Utc::now()).await {
        Ok(updated) => updated,
        Err(e) => {
            tracing::warn!(id = %record.id, error = %e, "Failed to record file view");
            record
        }
    };

    Ok((record, reader))
}

pub async fn update_file(
    state: &AppState,
    id: Uuid,
    req: UpdateFileRequest,
) -> Result<FileRecord, AppError> {
    let base_name = match req.original_name.as_deref().map(str::trim) {
        Some(name) if naming::sanitize(name).is_empty() => {
            return Err(AppError::BadRequest("original_name must not be empty".into()));
        }
        other => other.map(String::from),
    };

    let _record_guard = state.locks.records.lock(id).await;
    let current = get_file(state, id).await?;

    let mut next = current.clone();
    if let Some(description) = req.description {
        next.description = description;
    }
    if let Some(private) = req.private {
        next.private = private;
    }

    let new_name = base_name
        .map(|base| format!("{}{}", base, current.extension))
        .filter(|name| *name != current.original_name);

    let Some(new_name) = new_name else {
        let updated = state.store.update(&next).await?;
        tracing::info!(id = %id, "File metadata updated");
        return Ok(updated);
    };

    let dir = path_validator::parent_of(&current.path).map(String::from);
    let (_, new_path, _path_guard) = claim_storage_path(state, dir.as_deref(), &new_name).await?;

    state
        .storage
        .rename(&current.path, &new_path)
        .await
        .map_err(|e| AppError::from_storage("rename", &current.path, e))?;

    next.original_name = new_name;
    next.path = new_path.clone();

    match state.store.update(&next).await {
        Ok(updated) => {
            tracing::info!(
                id = %id,
                from = %current.path,
                to = %updated.path,
                "File renamed"
            );
            Ok(updated)
        }
        Err(err) => Err(roll_back_rename(state, &new_path, &current.path, "update", err).await),
    }
}

pub async fn move_file(
    state: &AppState,
    from_path: &str,
    to_path: &str,
) -> Result<FileRecord, AppError> {
    let (source, to) = check_transfer(state, from_path, to_path).await?;

    let _record_guard = state.locks.records.lock(source.id).await;
    // The record may have moved or gone while we waited for the lock.
    let record = state
        .store
        .find_by_id(source.id)
        .await?
        .filter(|r| r.path == source.path)
        .ok_or_else(|| path_not_found(from_path))?;

    let _path_guard = state.locks.paths.lock(to.clone()).await;
    ensure_destination_free(state, &to).await?;

    state
        .storage
        .ensure_parent(&to)
        .await
        .map_err(|e| AppError::from_storage("move", &to, e))?;
    state
        .storage
        .rename(&record.path, &to)
        .await
        .map_err(|e| AppError::from_storage("move", &to, e))?;

    let mut next = record.clone();
    next.path = to.clone();

    match state.store.update(&next).await {
        Ok(updated) => {
            tracing::info!(id = %updated.id, from = %record.path, to = %to, "File moved");
            Ok(updated)
        }
        Err(err) => Err(roll_back_rename(state, &to, &record.path, "move", err).await),
    }
}

pub async fn copy_file(
    state: &AppState,
    from_path: &str,
    to_path: &str,
) -> Result<FileRecord, AppError> {
    let (source, to) = check_transfer(state, from_path, to_path).await?;

    // Held so the source can't be moved or removed mid-copy; it is never written.
    let _record_guard = state.locks.records.lock(source.id).await;
    let source = state
        .store
        .find_by_id(source.id)
        .await?
        .filter(|r| r.path == source.path)
        .ok_or_else(|| path_not_found(from_path))?;

    let _path_guard = state.locks.paths.lock(to.clone()).await;
    ensure_destination_free(state, &to).await?;

    state
        .storage
        .ensure_parent(&to)
        .await
        .map_err(|e| AppError::from_storage("copy", &to, e))?;
    state
        .storage
        .copy(&source.path, &to)
        .await
        .map_err(|e| AppError::from_storage("copy", &to, e))?;

    let inserted = insert_with_fresh_key(state, |lookup_key, url| {
        source.clone_for_copy(to.clone(), lookup_key, url)
    })
    .await;

    match inserted {
        Ok(record) => {
            tracing::info!(
                source_id = %source.id,
                id = %record.id,
                from = %source.path,
                to = %to,
                "File copied"
            );
            Ok(record)
        }
        Err(err) => Err(discard_orphan(state, &to, "copy", err).await),
    }
}

/// Delete the object, then the record.
///
/// A missing or undeletable object does not block removal of the record:
/// the failure is logged and the record goes anyway. A failure to delete
/// the record is surfaced and the record stays.
pub async fn delete_file(state: &AppState, id: Uuid) -> Result<FileRecord, AppError> {
    let _record_guard = state.locks.records.lock(id).await;
    let record = get_file(state, id).await?;

    if let Err(e) = state.storage.delete(&record.path).await {
        tracing::warn!(
            id = %id,
            path = %record.path,
            error = %e,
            "Storage object could not be deleted, removing record anyway"
        );
    }

    let deleted = state
        .store
        .delete(id)
        .await?
        .ok_or_else(|| record_not_found(id))?;

    tracing::info!(id = %id, path = %deleted.path, "File deleted");
    Ok(deleted)
}

/// Proof a caller can present to view a private record, with the record it
/// was issued for.
pub async fn issue_access_token(
    state: &AppState,
    id: Uuid,
) -> Result<(FileRecord, String), AppError> {
    let record = get_file(state, id).await?;
    let token = state.access.issue(&record).ok_or_else(|| {
        AppError::BadRequest("The configured access policy does not issue tokens".into())
    })?;
    Ok((record, token))
}

/// Compare records against the storage medium. Reports only; nothing is
/// repaired.
pub async fn audit(state: &AppState) -> Result<AuditReport, AppError> {
    let records = state.store.list_all().await?;
    let objects: HashSet<String> = state
        .storage
        .list()
        .await
        .map_err(AppError::Io)?
        .into_iter()
        .collect();

    let owned: HashSet<&str> = records.iter().map(|r| r.path.as_str()).collect();
    let mut orphaned_objects: Vec<String> = objects
        .iter()
        .filter(|path| !owned.contains(path.as_str()))
        .cloned()
        .collect();
    orphaned_objects.sort();

    let missing_objects: Vec<FileRecord> = records
        .iter()
        .filter(|r| !objects.contains(&r.path))
        .cloned()
        .collect();

    Ok(AuditReport {
        missing_objects,
        orphaned_objects,
    })
}

/// Shared preconditions of move and copy: a well-formed destination that
/// differs from the source, and a record that owns the source.
async fn check_transfer(
    state: &AppState,
    from_path: &str,
    to_path: &str,
) -> Result<(FileRecord, String), AppError> {
    let to = path_validator::validate_destination(to_path)?;

    let same = from_path == to_path
        || path_validator::validate_destination(from_path).is_ok_and(|from| from == to);
    if same {
        return Err(AppError::Forbidden(
            "Destination is the same as the source".into(),
        ));
    }

    let source = state
        .store
        .find_by_path(from_path)
        .await?
        .ok_or_else(|| path_not_found(from_path))?;

    Ok((source, to))
}

async fn ensure_destination_free(state: &AppState, to: &str) -> Result<(), AppError> {
    let taken = state.store.find_by_path(to).await?.is_some()
        || state
            .storage
            .exists(to)
            .await
            .map_err(|e| AppError::from_storage("check destination", to, e))?;
    if taken {
        return Err(AppError::Forbidden(format!(
            "Destination already exists: {}",
            to
        )));
    }
    Ok(())
}

/// Generate a storage name for `original_name` under `dir` that neither a
/// record nor the storage medium knows, and lock its path.
async fn claim_storage_path<'a>(
    state: &'a AppState,
    dir: Option<&str>,
    original_name: &str,
) -> Result<(String, String, KeyedGuard<'a, String>), AppError> {
    for attempt in 1..=naming::MAX_NAME_ATTEMPTS {
        let name = naming::storage_name(original_name);
        let path = match dir {
            Some(dir) => format!("{}/{}", dir, name),
            None => name.clone(),
        };

        let guard = state.locks.paths.lock(path.clone()).await;
        let known = state.store.find_by_path(&path).await?.is_some()
            || state
                .storage
                .exists(&path)
                .await
                .map_err(|e| AppError::from_storage("claim name", &path, e))?;
        if !known {
            return Ok((name, path, guard));
        }
        tracing::warn!(path = %path, attempt, "Storage name collision, regenerating");
    }

    Err(AppError::Conflict(
        "Could not generate a unique storage name".into(),
    ))
}

/// Insert the record built by `build` under a lookup key no live record
/// uses, regenerating the key on collision.
async fn insert_with_fresh_key<F>(state: &AppState, build: F) -> Result<FileRecord, AppError>
where
    F: Fn(String, String) -> NewFileRecord + Send + Sync,
{
    for attempt in 1..=naming::MAX_NAME_ATTEMPTS {
        let lookup_key = naming::lookup_key();
        if state.store.find_by_key(&lookup_key).await?.is_some() {
            tracing::warn!(attempt, "Lookup key collision, regenerating");
            continue;
        }

        let url = state.config.view_url(&lookup_key);
        let new = build(lookup_key.clone(), url);
        match state.store.insert(new).await {
            Err(AppError::Conflict(msg)) => {
                // Only a key clash is worth another draw.
                if state.store.find_by_key(&lookup_key).await?.is_none() {
                    return Err(AppError::Conflict(msg));
                }
                tracing::warn!(attempt, "Lookup key collision on insert, regenerating");
            }
            other => return other,
        }
    }

    Err(AppError::Conflict(
        "Could not generate a unique lookup key".into(),
    ))
}

/// Compensation for a failed record insert: remove the object written for it.
async fn discard_orphan(state: &AppState, path: &str, op: &str, err: AppError) -> AppError {
    match state.storage.delete(path).await {
        Ok(()) => {
            tracing::warn!(path = %path, error = %err, "{} failed, removed orphaned object", op);
            err
        }
        Err(e) => {
            tracing::error!(
                path = %path,
                error = %err,
                cleanup_error = %e,
                "{} failed and the orphaned object could not be removed",
                op
            );
            AppError::Inconsistency(format!(
                "{}: metadata write failed ({}) and object {} has no record: {}",
                op, err, path, e
            ))
        }
    }
}

/// Compensation for a failed record update after a rename: put the object
/// back where the record still says it is.
async fn roll_back_rename(
    state: &AppState,
    moved_to: &str,
    original: &str,
    op: &str,
    err: AppError,
) -> AppError {
    match state.storage.rename(moved_to, original).await {
        Ok(()) => {
            tracing::warn!(
                from = %moved_to,
                to = %original,
                error = %err,
                "{} failed, rename rolled back",
                op
            );
            err
        }
        Err(e) => {
            tracing::error!(
                record_path = %original,
                object_path = %moved_to,
                error = %err,
                rollback_error = %e,
                "{} failed and the rename could not be rolled back",
                op
            );
            AppError::Inconsistency(format!(
                "{}: record points at {} but the object is at {}: metadata write failed ({}), rollback failed ({})",
                op, original, moved_to, err, e
            ))
        }
    }
}
