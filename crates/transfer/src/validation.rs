use std::path::{Component, Path, PathBuf};

use crate::TransferError;

/// Validates a peer-declared file name and returns it unchanged.
///
/// Only a bare file name is accepted. Rejects:
/// - Empty names, `.` and `..`
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Any separator (`/` or `\`), drive colon, or NUL byte
pub fn sanitize_file_name(name: &str) -> Result<&str, TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }

    // Checked on the raw string so Windows-style names are rejected on Unix too.
    if name.contains(['/', '\\', ':', '\0']) {
        return Err(TransferError::InvalidPath(format!(
            "file name must not contain a path: {name:?}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidPath(format!(
            "parent directory traversal not allowed: {name:?}"
        ))),
        _ => Err(TransferError::InvalidPath(format!(
            "not a plain file name: {name:?}"
        ))),
    }
}

/// Joins a sanitized `name` onto `receive_dir`.
///
/// The result is guaranteed to be a direct child of `receive_dir`.
pub fn resolve_receive_path(receive_dir: &Path, name: &str) -> Result<PathBuf, TransferError> {
    let name = sanitize_file_name(name)?;
    let path = receive_dir.join(name);
    if path.parent() != Some(receive_dir) {
        return Err(TransferError::InvalidPath(format!(
            "{name:?} escapes the receive directory"
        )));
    }
    Ok(path)
}
