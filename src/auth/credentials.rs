// Credential loading from inline values or files

use std::path::Path;

use crate::error::{AuthError, Result};

/// Resolve a value supplied either inline or as a path to a file
///
/// The inline value wins when both are set. File contents are trimmed of
/// surrounding whitespace. Returns `None` when neither is set.
pub fn load_secret(inline: Option<&str>, path: Option<&Path>) -> Result<Option<String>> {
    if let Some(value) = inline.filter(|v| !v.is_empty()) {
        return Ok(Some(value.to_string()));
    }

    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(None);
    };

    tracing::debug!("Reading credential from file: {}", path.display());
    let contents = std::fs::read_to_string(path).map_err(|e| AuthError::io(path, e))?;

    Ok(Some(contents.trim().to_string()))
}

/// Read a credential file as raw bytes
pub fn load_secret_bytes(path: &Path) -> Result<Vec<u8>> {
    tracing::debug!("Reading credential from file: {}", path.display());
    std::fs::read(path).map_err(|e| AuthError::io(path, e))
}
