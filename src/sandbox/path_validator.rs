use crate::error::AppError;
use std::path::{Component, Path, PathBuf};

/// Validate a caller-supplied destination and return it as a clean,
/// root-relative path with forward slashes.
/// Rejects absolute paths, `..` segments, NUL bytes and directory-only paths.
pub fn validate_destination(candidate: &str) -> Result<String, AppError> {
    if candidate.trim().is_empty() {
        return Err(AppError::Forbidden("Empty path".into()));
    }
    if candidate.contains('\0') {
        return Err(AppError::Forbidden("Null bytes not allowed in path".into()));
    }
    if candidate.ends_with('/') || candidate.ends_with('\\') {
        return Err(AppError::Forbidden(format!(
            "Path must name a file: {candidate}"
        )));
    }

    let normalized = candidate.replace('\\', "/");
    let path = Path::new(&normalized);

    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(AppError::Forbidden("Path traversal not allowed".into()));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::Forbidden(format!(
                    "Path must be relative to the storage root: {candidate}"
                )));
            }
            Component::CurDir => {}
            Component::Normal(s) => clean.push(s),
        }
    }

    let result = clean.to_string_lossy().replace('\\', "/");
    if result.is_empty() {
        return Err(AppError::Forbidden("Path resolves to empty".into()));
    }
    Ok(result)
}

/// Root-relative parent directory of a validated path, `None` for the root.
pub fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

/// Validate that a resolved path is within the given root directory.
/// Both sides are canonicalized so symlinks cannot escape the root.
pub fn ensure_within_root(root: &Path, resolved: &Path) -> Result<(), AppError> {
    let canon_root = root.canonicalize()?;
    let canon_resolved = resolved.canonicalize()?;

    if !canon_resolved.starts_with(&canon_root) {
        return Err(AppError::Forbidden("Path escapes storage root".into()));
    }
    Ok(())
}
