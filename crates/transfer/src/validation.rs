use crate::TransferError;

/// Builds the destination path for `name` under `root`.
///
/// The root must be absolute (or empty for the service root) and must not
/// contain `.` or `..` segments.
///
/// Rejects:
/// - Empty names and names that are `.` or `..`
/// - Names containing `/`, `\` or control characters
/// - Relative roots and roots with `.`/`..` segments
pub fn destination_path(root: &str, name: &str) -> Result<String, TransferError> {
    let root = normalize_root(root)?;
    let name = name.trim();

    if name.is_empty() {
        return Err(TransferError::InvalidPath("empty object name".into()));
    }
    if name == "." || name == ".." {
        return Err(TransferError::InvalidPath(format!(
            "reserved object name: {name}"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|&c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(TransferError::InvalidPath(format!(
            "object name contains {c:?}: {name:?}"
        )));
    }

    Ok(format!("{root}/{name}"))
}

/// Returns the root without a trailing slash (`""` for the service root).
fn normalize_root(root: &str) -> Result<&str, TransferError> {
    let root = root.trim();
    if root.is_empty() || root == "/" {
        return Ok("");
    }
    if !root.starts_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "destination root must be absolute: {root}"
        )));
    }

    let trimmed = root.trim_end_matches('/');
    for segment in trimmed.split('/').skip(1) {
        match segment {
            "" => {
                return Err(TransferError::InvalidPath(format!(
                    "empty segment in destination root: {root}"
                )));
            }
            "." | ".." => {
                return Err(TransferError::InvalidPath(format!(
                    "relative segment not allowed in destination root: {root}"
                )));
            }
            _ => {}
        }
    }
    Ok(trimmed)
}
